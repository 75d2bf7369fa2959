// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lock queries.
//!
//! The acquire path runs delete-expired + insert in one transaction so
//! that "at most one unexpired row per name" holds under concurrency.

use berth_core::BerthError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::LockRow;

fn row_to_lock(row: &rusqlite::Row<'_>) -> rusqlite::Result<LockRow> {
    Ok(LockRow {
        name: row.get(0)?,
        owner: row.get(1)?,
        acquired_at: row.get(2)?,
        expires_at: row.get(3)?,
        pid: row.get(4)?,
    })
}

const SELECT_COLS: &str = "name, owner, acquired_at, expires_at, pid";

/// Attempt to acquire. Returns `None` when the lock was inserted, or
/// `Some(holder)` with the current unexpired row when it was not.
pub async fn try_acquire(db: &Database, lock: &LockRow) -> Result<Option<LockRow>, BerthError> {
    let lock = lock.clone();
    let now = lock.acquired_at;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM locks WHERE name = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
                params![lock.name, now],
            )?;
            let inserted = tx.execute(
                "INSERT INTO locks (name, owner, acquired_at, expires_at, pid)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(name) DO NOTHING",
                params![lock.name, lock.owner, lock.acquired_at, lock.expires_at, lock.pid],
            )?;
            let holder = if inserted == 0 {
                tx.query_row(
                    &format!("SELECT {SELECT_COLS} FROM locks WHERE name = ?1"),
                    params![lock.name],
                    row_to_lock,
                )
                .optional()?
            } else {
                None
            };
            tx.commit()?;
            Ok(holder)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one lock regardless of expiry.
pub async fn get(db: &Database, name: &str) -> Result<Option<LockRow>, BerthError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SELECT_COLS} FROM locks WHERE name = ?1"))?;
            Ok(stmt.query_row(params![name], row_to_lock).optional()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Update a lock's expiry. Returns `false` when the row is gone.
pub async fn update_expiry(
    db: &Database,
    name: &str,
    expires_at: Option<i64>,
) -> Result<bool, BerthError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE locks SET expires_at = ?1 WHERE name = ?2",
                params![expires_at, name],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a lock, optionally only when the owner matches. Returns whether a
/// row was removed.
pub async fn delete(db: &Database, name: &str, owner: Option<&str>) -> Result<bool, BerthError> {
    let name = name.to_string();
    let owner = owner.map(String::from);
    db.connection()
        .call(move |conn| {
            let removed = match owner {
                Some(owner) => conn.execute(
                    "DELETE FROM locks WHERE name = ?1 AND owner = ?2",
                    params![name, owner],
                )?,
                None => conn.execute("DELETE FROM locks WHERE name = ?1", params![name])?,
            };
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Sweep expired rows, then list the unexpired remainder, optionally
/// filtered by owner. One transaction so the listing never shows a row the
/// sweep should have removed.
pub async fn sweep_and_list(
    db: &Database,
    now: i64,
    owner: Option<&str>,
) -> Result<Vec<LockRow>, BerthError> {
    let owner = owner.map(String::from);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM locks WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            let mut locks = Vec::new();
            {
                let (sql, param): (String, Vec<String>) = match owner {
                    Some(owner) => (
                        format!(
                            "SELECT {SELECT_COLS} FROM locks WHERE owner = ?1 ORDER BY name ASC"
                        ),
                        vec![owner],
                    ),
                    None => (
                        format!("SELECT {SELECT_COLS} FROM locks ORDER BY name ASC"),
                        vec![],
                    ),
                };
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(param), row_to_lock)?;
                for row in rows {
                    locks.push(row?);
                }
            }
            tx.commit()?;
            Ok(locks)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete all expired rows. Returns the count removed.
pub async fn delete_expired(db: &Database, now: i64) -> Result<u64, BerthError> {
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM locks WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}
