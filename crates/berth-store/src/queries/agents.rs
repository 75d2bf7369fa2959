// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent registry queries.

use berth_core::BerthError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::AgentRow;

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRow> {
    Ok(AgentRow {
        id: row.get(0)?,
        agent_type: row.get(1)?,
        purpose: row.get(2)?,
        project: row.get(3)?,
        stack: row.get(4)?,
        context: row.get(5)?,
        worktree_id: row.get(6)?,
        registered_at: row.get(7)?,
        last_heartbeat: row.get(8)?,
        state: row.get(9)?,
    })
}

const SELECT_COLS: &str = "id, agent_type, purpose, project, stack, context, worktree_id, registered_at, last_heartbeat, state";

/// Register or refresh an agent. First registration sets `registered_at`;
/// re-registration keeps it and refreshes everything else.
pub async fn upsert(db: &Database, agent: &AgentRow) -> Result<(), BerthError> {
    let agent = agent.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO agents (id, agent_type, purpose, project, stack, context, worktree_id, registered_at, last_heartbeat, state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     agent_type = excluded.agent_type,
                     purpose = excluded.purpose,
                     project = excluded.project,
                     stack = excluded.stack,
                     context = excluded.context,
                     worktree_id = excluded.worktree_id,
                     last_heartbeat = excluded.last_heartbeat,
                     state = excluded.state",
                params![
                    agent.id,
                    agent.agent_type,
                    agent.purpose,
                    agent.project,
                    agent.stack,
                    agent.context,
                    agent.worktree_id,
                    agent.registered_at,
                    agent.last_heartbeat,
                    agent.state,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Refresh `last_heartbeat`. Returns `false` for an unknown id.
pub async fn touch_heartbeat(db: &Database, id: &str, now: i64) -> Result<bool, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE agents SET last_heartbeat = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<AgentRow>, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SELECT_COLS} FROM agents WHERE id = ?1"))?;
            Ok(stmt.query_row(params![id], row_to_agent).optional()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete an agent row. Sessions created by it are left untouched.
pub async fn delete(db: &Database, id: &str) -> Result<bool, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute("DELETE FROM agents WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// All agents, optionally narrowed to one project.
pub async fn list(db: &Database, project: Option<&str>) -> Result<Vec<AgentRow>, BerthError> {
    let project = project.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut agents = Vec::new();
            match project {
                Some(project) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLS} FROM agents WHERE project = ?1 ORDER BY id ASC"
                    ))?;
                    let rows = stmt.query_map(params![project], row_to_agent)?;
                    for row in rows {
                        agents.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn
                        .prepare(&format!("SELECT {SELECT_COLS} FROM agents ORDER BY id ASC"))?;
                    let rows = stmt.query_map([], row_to_agent)?;
                    for row in rows {
                        agents.push(row?);
                    }
                }
            }
            Ok(agents)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply one reaper sweep over the agents entity class: every state stamp
/// and every resurrection entry in a single transaction, so a failed sweep
/// never records a transition without its entry (or vice versa).
pub async fn apply_sweep(
    db: &Database,
    state_updates: Vec<(String, String)>,
    entries: Vec<crate::models::ResurrectionRow>,
) -> Result<(), BerthError> {
    if state_updates.is_empty() && entries.is_empty() {
        return Ok(());
    }
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("UPDATE agents SET state = ?1 WHERE id = ?2")?;
                for (id, state) in &state_updates {
                    stmt.execute(params![state, id])?;
                }
            }
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO resurrection_entries
                     (dead_agent_id, identity, project, stack, sessions_snapshot, notes_snapshot, state, claimed_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for entry in &entries {
                    stmt.execute(params![
                        entry.dead_agent_id,
                        entry.identity,
                        entry.project,
                        entry.stack,
                        entry.sessions_snapshot,
                        entry.notes_snapshot,
                        entry.state,
                        entry.claimed_by,
                        entry.created_at,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
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

    fn make_agent(id: &str, now: i64) -> AgentRow {
        AgentRow {
            id: id.to_string(),
            agent_type: "worker".to_string(),
            purpose: Some("build the api".to_string()),
            project: Some("myapp".to_string()),
            stack: Some("api".to_string()),
            context: None,
            worktree_id: None,
            registered_at: now,
            last_heartbeat: now,
            state: "active".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_registered_at() {
        let (db, _dir) = setup_db().await;
        upsert(&db, &make_agent("alpha", 100)).await.unwrap();

        let mut again = make_agent("alpha", 200);
        again.registered_at = 200;
        upsert(&db, &again).await.unwrap();

        let row = get(&db, "alpha").await.unwrap().unwrap();
        assert_eq!(row.registered_at, 100, "first registration wins");
        assert_eq!(row.last_heartbeat, 200, "heartbeat refreshed");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_unknown_agent_is_reported() {
        let (db, _dir) = setup_db().await;
        assert!(!touch_heartbeat(&db, "ghost", 100).await.unwrap());
        upsert(&db, &make_agent("alpha", 100)).await.unwrap();
        assert!(touch_heartbeat(&db, "alpha", 150).await.unwrap());
        assert_eq!(
            get(&db, "alpha").await.unwrap().unwrap().last_heartbeat,
            150
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_project() {
        let (db, _dir) = setup_db().await;
        upsert(&db, &make_agent("alpha", 100)).await.unwrap();
        let mut other = make_agent("beta", 100);
        other.project = Some("elsewhere".to_string());
        upsert(&db, &other).await.unwrap();

        assert_eq!(list(&db, None).await.unwrap().len(), 2);
        let filtered = list(&db, Some("myapp")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "alpha");
        db.close().await.unwrap();
    }
}
