// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resurrection queue queries.

use berth_core::BerthError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::ResurrectionRow;

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResurrectionRow> {
    Ok(ResurrectionRow {
        id: row.get(0)?,
        dead_agent_id: row.get(1)?,
        identity: row.get(2)?,
        project: row.get(3)?,
        stack: row.get(4)?,
        sessions_snapshot: row.get(5)?,
        notes_snapshot: row.get(6)?,
        state: row.get(7)?,
        claimed_by: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const SELECT_COLS: &str = "id, dead_agent_id, identity, project, stack, sessions_snapshot, notes_snapshot, state, claimed_by, created_at";

/// Insert a fresh pending entry. Returns the assigned id.
pub async fn insert(db: &Database, entry: &ResurrectionRow) -> Result<i64, BerthError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO resurrection_entries
                 (dead_agent_id, identity, project, stack, sessions_snapshot, notes_snapshot, state, claimed_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.dead_agent_id,
                    entry.identity,
                    entry.project,
                    entry.stack,
                    entry.sessions_snapshot,
                    entry.notes_snapshot,
                    entry.state,
                    entry.claimed_by,
                    entry.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<ResurrectionRow>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM resurrection_entries WHERE id = ?1"
            ))?;
            Ok(stmt.query_row(params![id], row_to_entry).optional()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Entries filtered by state and identity prefix, newest first.
pub async fn list(
    db: &Database,
    state: Option<&str>,
    project: Option<&str>,
    stack: Option<&str>,
) -> Result<Vec<ResurrectionRow>, BerthError> {
    let state = state.map(String::from);
    let project = project.map(String::from);
    let stack = stack.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut sql = format!(
                "SELECT {SELECT_COLS} FROM resurrection_entries WHERE 1=1"
            );
            let mut args: Vec<String> = Vec::new();
            if let Some(state) = state {
                args.push(state);
                sql.push_str(&format!(" AND state = ?{}", args.len()));
            }
            if let Some(project) = project {
                args.push(project);
                sql.push_str(&format!(" AND project = ?{}", args.len()));
            }
            if let Some(stack) = stack {
                args.push(stack);
                sql.push_str(&format!(" AND stack = ?{}", args.len()));
            }
            sql.push_str(" ORDER BY id DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a state transition, guarded on the expected current state so
/// concurrent claimers cannot both win. Returns `false` when the guard failed.
pub async fn transition(
    db: &Database,
    id: i64,
    from: &str,
    to: &str,
    claimed_by: Option<&str>,
) -> Result<bool, BerthError> {
    let from = from.to_string();
    let to = to.to_string();
    let claimed_by = claimed_by.map(String::from);
    db.connection()
        .call(move |conn| {
            let changed = match claimed_by {
                Some(agent) => conn.execute(
                    "UPDATE resurrection_entries SET state = ?1, claimed_by = ?2
                     WHERE id = ?3 AND state = ?4",
                    params![to, agent, id, from],
                )?,
                None => conn.execute(
                    "UPDATE resurrection_entries SET state = ?1
                     WHERE id = ?2 AND state = ?3",
                    params![to, id, from],
                )?,
            };
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending-entry counts grouped by project. Projects with no pending
/// entries are absent.
pub async fn count_pending_by_project(
    db: &Database,
) -> Result<Vec<(String, i64)>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(project, ''), COUNT(*) FROM resurrection_entries
                 WHERE state = 'pending' GROUP BY project",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut counts = Vec::new();
            for row in rows {
                counts.push(row?);
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a pending entry already exists for this dead agent. Guards the
/// reaper against double-inserting across sweeps.
pub async fn has_pending_for_agent(db: &Database, agent_id: &str) -> Result<bool, BerthError> {
    let agent_id = agent_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM resurrection_entries
                 WHERE dead_agent_id = ?1 AND state = 'pending'",
                params![agent_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
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

    fn make_entry(agent: &str, project: &str) -> ResurrectionRow {
        ResurrectionRow {
            id: 0,
            dead_agent_id: agent.to_string(),
            identity: Some(format!("{project}:api")),
            project: Some(project.to_string()),
            stack: Some("api".to_string()),
            sessions_snapshot: r#"["s1"]"#.to_string(),
            notes_snapshot: "{}".to_string(),
            state: "pending".to_string(),
            claimed_by: None,
            created_at: 100,
        }
    }

    #[tokio::test]
    async fn claim_transition_is_guarded() {
        let (db, _dir) = setup_db().await;
        let id = insert(&db, &make_entry("alpha", "myapp")).await.unwrap();

        assert!(transition(&db, id, "pending", "claimed", Some("beta")).await.unwrap());
        // A second claimer loses the guard.
        assert!(!transition(&db, id, "pending", "claimed", Some("gamma")).await.unwrap());

        let row = get(&db, id).await.unwrap().unwrap();
        assert_eq!(row.state, "claimed");
        assert_eq!(row.claimed_by.as_deref(), Some("beta"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_project_and_state() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_entry("alpha", "myapp")).await.unwrap();
        insert(&db, &make_entry("beta", "other")).await.unwrap();

        let pending_myapp = list(&db, Some("pending"), Some("myapp"), None).await.unwrap();
        assert_eq!(pending_myapp.len(), 1);
        assert_eq!(pending_myapp[0].dead_agent_id, "alpha");

        let all = list(&db, None, None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_counts_group_by_project() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_entry("a1", "myapp")).await.unwrap();
        insert(&db, &make_entry("a2", "myapp")).await.unwrap();
        let id = insert(&db, &make_entry("a3", "other")).await.unwrap();
        transition(&db, id, "pending", "dismissed", None).await.unwrap();

        let counts = count_pending_by_project(&db).await.unwrap();
        assert_eq!(counts, vec![("myapp".to_string(), 2)]);

        assert!(has_pending_for_agent(&db, "a1").await.unwrap());
        assert!(!has_pending_for_agent(&db, "a3").await.unwrap());
        db.close().await.unwrap();
    }
}
