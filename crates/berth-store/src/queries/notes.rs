// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Note queries. Notes are append-only: there is deliberately no update
//! statement in this module; rows disappear only through the session
//! cascade.

use berth_core::BerthError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::NoteRow;

fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        note_type: row.get(2)?,
        content: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const SELECT_COLS: &str = "id, session_id, note_type, content, created_by, created_at";

/// Append a note. Returns the assigned id.
pub async fn insert(
    db: &Database,
    session_id: &str,
    note_type: &str,
    content: &str,
    created_by: &str,
    now: i64,
) -> Result<i64, BerthError> {
    let session_id = session_id.to_string();
    let note_type = note_type.to_string();
    let content = content.to_string();
    let created_by = created_by.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO notes (session_id, note_type, content, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, note_type, content, created_by, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Notes for one session in append order, optionally filtered by type.
pub async fn list_for_session(
    db: &Database,
    session_id: &str,
    note_type: Option<&str>,
    limit: i64,
) -> Result<Vec<NoteRow>, BerthError> {
    let session_id = session_id.to_string();
    let note_type = note_type.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut notes = Vec::new();
            match note_type {
                Some(note_type) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM notes
                         WHERE session_id = ?1 AND note_type = ?2
                         ORDER BY id ASC LIMIT ?3"
                    ))?;
                    let rows =
                        stmt.query_map(params![session_id, note_type, limit], row_to_note)?;
                    for row in rows {
                        notes.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM notes
                         WHERE session_id = ?1 ORDER BY id ASC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![session_id, limit], row_to_note)?;
                    for row in rows {
                        notes.push(row?);
                    }
                }
            }
            Ok(notes)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent notes across all sessions, newest first.
pub async fn list_recent(
    db: &Database,
    note_type: Option<&str>,
    limit: i64,
) -> Result<Vec<NoteRow>, BerthError> {
    let note_type = note_type.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut notes = Vec::new();
            match note_type {
                Some(note_type) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM notes WHERE note_type = ?1
                         ORDER BY id DESC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![note_type, limit], row_to_note)?;
                    for row in rows {
                        notes.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM notes ORDER BY id DESC LIMIT ?1"
                    ))?;
                    let rows = stmt.query_map(params![limit], row_to_note)?;
                    for row in rows {
                        notes.push(row?);
                    }
                }
            }
            Ok(notes)
        })
        .await
        .map_err(map_tr_err)
}

/// The last `n` notes of a session, returned oldest first. Used for
/// resurrection snapshots.
pub async fn last_n_for_session(
    db: &Database,
    session_id: &str,
    n: i64,
) -> Result<Vec<NoteRow>, BerthError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM (
                     SELECT {SELECT_COLS} FROM notes
                     WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![session_id, n], row_to_note)?;
            let mut notes = Vec::new();
            for row in rows {
                notes.push(row?);
            }
            Ok(notes)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionRow;
    use crate::queries::sessions;
    use tempfile::tempdir;

    async fn setup_db_with_session() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let session = SessionRow {
            id: "s1".to_string(),
            purpose: "work".to_string(),
            created_by: "alpha".to_string(),
            identity: None,
            status: "active".to_string(),
            created_at: 100,
            updated_at: 100,
        };
        sessions::insert(&db, &session).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn notes_append_in_order() {
        let (db, _dir) = setup_db_with_session().await;
        let a = insert(&db, "s1", "note", "first", "alpha", 110).await.unwrap();
        let b = insert(&db, "s1", "decision", "second", "alpha", 120).await.unwrap();
        assert!(a < b);

        let notes = list_for_session(&db, "s1", None, 100).await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].content, "first");
        assert_eq!(notes[1].content, "second");

        let decisions = list_for_session(&db, "s1", Some("decision"), 100).await.unwrap();
        assert_eq!(decisions.len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn session_delete_cascades_notes() {
        let (db, _dir) = setup_db_with_session().await;
        insert(&db, "s1", "note", "gone soon", "alpha", 110).await.unwrap();

        sessions::delete(&db, "s1").await.unwrap();
        let orphans = list_recent(&db, None, 100).await.unwrap();
        assert!(orphans.is_empty(), "cascade removed the note");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn last_n_returns_tail_oldest_first() {
        let (db, _dir) = setup_db_with_session().await;
        for i in 0..5 {
            insert(&db, "s1", "note", &format!("n{i}"), "alpha", 100 + i).await.unwrap();
        }
        let tail = last_n_for_session(&db, "s1", 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "n3");
        assert_eq!(tail[1].content, "n4");
        db.close().await.unwrap();
    }
}
