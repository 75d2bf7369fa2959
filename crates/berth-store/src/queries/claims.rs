// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory file claim queries.
//!
//! Claims never block anything at this layer; conflict detection joins
//! against *active* sessions only, so claims held by terminal sessions are
//! invisible to new claimers.

use berth_core::BerthError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{ClaimConflict, FileClaimRow};

/// Record a claim. Returns `false` when this session already claims the path.
pub async fn insert(
    db: &Database,
    session_id: &str,
    path: &str,
    now: i64,
) -> Result<bool, BerthError> {
    let session_id = session_id.to_string();
    let path = path.to_string();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO file_claims (session_id, path, claimed_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, path) DO NOTHING",
                params![session_id, path, now],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove claims on the given paths from one session. Returns the count removed.
pub async fn delete(
    db: &Database,
    session_id: &str,
    paths: Vec<String>,
) -> Result<u64, BerthError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0u64;
            {
                let mut stmt =
                    tx.prepare("DELETE FROM file_claims WHERE session_id = ?1 AND path = ?2")?;
                for path in &paths {
                    removed += stmt.execute(params![session_id, path])? as u64;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

/// All claims held by one session.
pub async fn list_for_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<FileClaimRow>, BerthError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, path, claimed_at FROM file_claims
                 WHERE session_id = ?1 ORDER BY path ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok(FileClaimRow {
                    session_id: row.get(0)?,
                    path: row.get(1)?,
                    claimed_at: row.get(2)?,
                })
            })?;
            let mut claims = Vec::new();
            for row in rows {
                claims.push(row?);
            }
            Ok(claims)
        })
        .await
        .map_err(map_tr_err)
}

/// For each of `paths`, any *other* active session already claiming it.
pub async fn conflicts(
    db: &Database,
    paths: Vec<String>,
    exclude_session: &str,
) -> Result<Vec<ClaimConflict>, BerthError> {
    let exclude_session = exclude_session.to_string();
    db.connection()
        .call(move |conn| {
            let mut out = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT fc.path, fc.session_id, s.created_by, s.identity
                 FROM file_claims fc
                 JOIN sessions s ON s.id = fc.session_id
                 WHERE fc.path = ?1 AND fc.session_id != ?2 AND s.status = 'active'",
            )?;
            for path in &paths {
                let rows = stmt.query_map(params![path, exclude_session], |row| {
                    Ok(ClaimConflict {
                        path: row.get(0)?,
                        session_id: row.get(1)?,
                        held_by: row.get(2)?,
                        identity: row.get(3)?,
                    })
                })?;
                for row in rows {
                    out.push(row?);
                }
            }
            Ok(out)
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

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn add_session(db: &Database, id: &str, status: &str) {
        let session = SessionRow {
            id: id.to_string(),
            purpose: "work".to_string(),
            created_by: format!("agent-{id}"),
            identity: Some("myapp:api".to_string()),
            status: status.to_string(),
            created_at: 100,
            updated_at: 100,
        };
        sessions::insert(db, &session).await.unwrap();
    }

    #[tokio::test]
    async fn conflict_only_against_other_active_sessions() {
        let (db, _dir) = setup_db().await;
        add_session(&db, "a", "active").await;
        add_session(&db, "b", "active").await;
        add_session(&db, "c", "completed").await;

        insert(&db, "a", "src/app.ts", 110).await.unwrap();
        insert(&db, "c", "src/old.ts", 110).await.unwrap();

        // b claiming a's path conflicts; c's path does not (terminal session).
        let found = conflicts(
            &db,
            vec!["src/app.ts".to_string(), "src/old.ts".to_string()],
            "b",
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "src/app.ts");
        assert_eq!(found[0].session_id, "a");
        assert_eq!(found[0].held_by, "agent-a");

        // A session never conflicts with itself.
        let own = conflicts(&db, vec!["src/app.ts".to_string()], "a").await.unwrap();
        assert!(own.is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_is_idempotent_per_session() {
        let (db, _dir) = setup_db().await;
        add_session(&db, "a", "active").await;
        assert!(insert(&db, "a", "x.rs", 110).await.unwrap());
        assert!(!insert(&db, "a", "x.rs", 120).await.unwrap());
        assert_eq!(list_for_session(&db, "a").await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_named_paths_only() {
        let (db, _dir) = setup_db().await;
        add_session(&db, "a", "active").await;
        insert(&db, "a", "x.rs", 110).await.unwrap();
        insert(&db, "a", "y.rs", 110).await.unwrap();

        let removed = delete(&db, "a", vec!["x.rs".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        let left = list_for_session(&db, "a").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, "y.rs");
        db.close().await.unwrap();
    }
}
