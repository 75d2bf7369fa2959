// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Changelog queries.
//!
//! Rollups are computed, not stored: a query for `a` also returns entries
//! recorded under `a:b` and `a:b:c`.

use berth_core::BerthError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::ChangelogRow;

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangelogRow> {
    Ok(ChangelogRow {
        id: row.get(0)?,
        identity: row.get(1)?,
        kind: row.get(2)?,
        summary: row.get(3)?,
        description: row.get(4)?,
        session_id: row.get(5)?,
        agent_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const SELECT_COLS: &str = "id, identity, kind, summary, description, session_id, agent_id, created_at";

/// Append an entry. Returns the assigned id.
pub async fn insert(db: &Database, entry: &ChangelogRow) -> Result<i64, BerthError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO changelog (identity, kind, summary, description, session_id, agent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.identity,
                    entry.kind,
                    entry.summary,
                    entry.description,
                    entry.session_id,
                    entry.agent_id,
                    entry.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Entries for an identity and all of its refinements, newest first.
/// `a:b` matches entries recorded under `a:b` and `a:b:*`, but not `a`.
pub async fn list_rollup(
    db: &Database,
    identity: &str,
    limit: i64,
) -> Result<Vec<ChangelogRow>, BerthError> {
    let identity = identity.to_string();
    db.connection()
        .call(move |conn| {
            let prefix = format!("{identity}:%");
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM changelog
                 WHERE identity = ?1 OR identity LIKE ?2
                 ORDER BY id DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![identity, prefix, limit], row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}
