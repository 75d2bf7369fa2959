// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session envelope queries.

use berth_core::BerthError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::SessionRow;

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        purpose: row.get(1)?,
        created_by: row.get(2)?,
        identity: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const SELECT_COLS: &str = "id, purpose, created_by, identity, status, created_at, updated_at";

pub async fn insert(db: &Database, session: &SessionRow) -> Result<(), BerthError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, purpose, created_by, identity, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id,
                    session.purpose,
                    session.created_by,
                    session.identity,
                    session.status,
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<SessionRow>, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SELECT_COLS} FROM sessions WHERE id = ?1"))?;
            Ok(stmt.query_row(params![id], row_to_session).optional()?)
        })
        .await
        .map_err(map_tr_err)
}

/// List sessions, newest first, optionally filtered by status.
pub async fn list(
    db: &Database,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<SessionRow>, BerthError> {
    let status = status.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut sessions = Vec::new();
            match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM sessions WHERE status = ?1
                         ORDER BY created_at DESC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![status, limit], row_to_session)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM sessions ORDER BY created_at DESC LIMIT ?1"
                    ))?;
                    let rows = stmt.query_map(params![limit], row_to_session)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// The most recently created active session for a creator, if any.
pub async fn latest_active_for(
    db: &Database,
    created_by: &str,
) -> Result<Option<SessionRow>, BerthError> {
    let created_by = created_by.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM sessions
                 WHERE created_by = ?1 AND status = 'active'
                 ORDER BY created_at DESC LIMIT 1"
            ))?;
            Ok(stmt
                .query_row(params![created_by], row_to_session)
                .optional()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Active sessions created by the given agent.
pub async fn active_for_agent(
    db: &Database,
    agent_id: &str,
) -> Result<Vec<SessionRow>, BerthError> {
    let agent_id = agent_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM sessions
                 WHERE created_by = ?1 AND status = 'active'
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![agent_id], row_to_session)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Move an active session to a terminal status. Returns `false` when the
/// session was not active (terminal statuses never change again).
pub async fn finish(
    db: &Database,
    id: &str,
    status: &str,
    now: i64,
) -> Result<bool, BerthError> {
    let id = id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'active'",
                params![status, now, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn touch_updated(db: &Database, id: &str, now: i64) -> Result<(), BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a session. Notes and file claims cascade via foreign keys.
pub async fn delete(db: &Database, id: &str) -> Result<bool, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_session(id: &str, created_by: &str, now: i64) -> SessionRow {
        SessionRow {
            id: id.to_string(),
            purpose: "test work".to_string(),
            created_by: created_by.to_string(),
            identity: Some("myapp:api".to_string()),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_session("s1", "alpha", 100)).await.unwrap();

        assert!(finish(&db, "s1", "completed", 200).await.unwrap());
        // A second transition attempt is a no-op.
        assert!(!finish(&db, "s1", "abandoned", 300).await.unwrap());
        let row = get(&db, "s1").await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.updated_at, 200);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn latest_active_prefers_newest() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_session("s1", "alpha", 100)).await.unwrap();
        insert(&db, &make_session("s2", "alpha", 200)).await.unwrap();
        insert(&db, &make_session("s3", "beta", 300)).await.unwrap();
        finish(&db, "s2", "completed", 250).await.unwrap();

        let latest = latest_active_for(&db, "alpha").await.unwrap().unwrap();
        assert_eq!(latest.id, "s1", "s2 is terminal, s3 is beta's");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_and_limits() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            insert(&db, &make_session(&format!("s{i}"), "alpha", i)).await.unwrap();
        }
        finish(&db, "s0", "abandoned", 100).await.unwrap();

        assert_eq!(list(&db, Some("active"), 100).await.unwrap().len(), 4);
        assert_eq!(list(&db, Some("abandoned"), 100).await.unwrap().len(), 1);
        assert_eq!(list(&db, None, 2).await.unwrap().len(), 2);
        db.close().await.unwrap();
    }
}
