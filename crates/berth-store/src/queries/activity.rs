// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit log queries.

use berth_core::BerthError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::ActivityRow;

fn row_to_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityRow> {
    Ok(ActivityRow {
        id: row.get(0)?,
        entry_type: row.get(1)?,
        action: row.get(2)?,
        target: row.get(3)?,
        details: row.get(4)?,
        agent_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const SELECT_COLS: &str = "id, entry_type, action, target, details, agent_id, created_at";

/// Append one audit row.
pub async fn insert(db: &Database, entry: &ActivityRow) -> Result<i64, BerthError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO activity (entry_type, action, target, details, agent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.entry_type,
                    entry.action,
                    entry.target,
                    entry.details,
                    entry.agent_id,
                    entry.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Filter parameters for activity reads.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub entry_type: Option<String>,
    pub agent_id: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// Read audit rows newest first with the given filters.
pub async fn list(db: &Database, filter: ActivityFilter) -> Result<Vec<ActivityRow>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut sql = format!("SELECT {SELECT_COLS} FROM activity WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(entry_type) = filter.entry_type {
                args.push(Box::new(entry_type));
                sql.push_str(&format!(" AND entry_type = ?{}", args.len()));
            }
            if let Some(agent_id) = filter.agent_id {
                args.push(Box::new(agent_id));
                sql.push_str(&format!(" AND agent_id = ?{}", args.len()));
            }
            if let Some(from) = filter.from {
                args.push(Box::new(from));
                sql.push_str(&format!(" AND created_at >= ?{}", args.len()));
            }
            if let Some(to) = filter.to {
                args.push(Box::new(to));
                sql.push_str(&format!(" AND created_at <= ?{}", args.len()));
            }
            let limit = if filter.limit > 0 { filter.limit } else { 100 };
            args.push(Box::new(limit));
            sql.push_str(&format!(" ORDER BY id DESC LIMIT ?{}", args.len()));
            args.push(Box::new(filter.offset));
            sql.push_str(&format!(" OFFSET ?{}", args.len()));

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                args.iter().map(|a| a.as_ref() as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(params.as_slice(), row_to_activity)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Row counts grouped by entry type in a time window.
pub async fn summary(
    db: &Database,
    from: Option<i64>,
    to: Option<i64>,
) -> Result<Vec<(String, i64)>, BerthError> {
    db.connection()
        .call(move |conn| {
            let from = from.unwrap_or(0);
            let to = to.unwrap_or(i64::MAX);
            let mut stmt = conn.prepare(
                "SELECT entry_type, COUNT(*) FROM activity
                 WHERE created_at >= ?1 AND created_at <= ?2
                 GROUP BY entry_type ORDER BY entry_type ASC",
            )?;
            let rows = stmt.query_map(params![from, to], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut counts = Vec::new();
            for row in rows {
                counts.push(row?);
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

/// Retention sweep: drop rows older than `cutoff`, then trim to the newest
/// `max_rows`. Returns the count removed.
pub async fn prune(db: &Database, cutoff: i64, max_rows: i64) -> Result<u64, BerthError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = tx.execute(
                "DELETE FROM activity WHERE created_at < ?1",
                params![cutoff],
            )? as u64;
            removed += tx.execute(
                "DELETE FROM activity WHERE id NOT IN (
                     SELECT id FROM activity ORDER BY id DESC LIMIT ?1
                 )",
                params![max_rows],
            )? as u64;
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}
