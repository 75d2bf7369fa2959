// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service (port assignment) queries.

use berth_core::BerthError;
use rusqlite::{params, OptionalExtension};

use crate::database::{is_unique_violation, map_tr_err, Database};
use crate::models::ServiceRow;

fn row_to_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRow> {
    let endpoints_json: String = row.get(7)?;
    let endpoints = serde_json::from_str(&endpoints_json).unwrap_or_default();
    Ok(ServiceRow {
        identity: row.get(0)?,
        port: row.get::<_, i64>(1)? as u16,
        pid: row.get(2)?,
        claimed_at: row.get(3)?,
        last_seen: row.get(4)?,
        expires_at: row.get(5)?,
        health_path: row.get(6)?,
        endpoints,
    })
}

const SELECT_COLS: &str =
    "identity, port, pid, claimed_at, last_seen, expires_at, health_path, endpoints";

/// Fetch one service by exact identity.
pub async fn get_by_identity(
    db: &Database,
    identity: &str,
) -> Result<Option<ServiceRow>, BerthError> {
    let identity = identity.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM services WHERE identity = ?1"
            ))?;
            Ok(stmt
                .query_row(params![identity], row_to_service)
                .optional()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a fresh assignment. Returns `false` when the identity or port
/// unique constraint fired (the caller lost a race and should retry with a
/// different candidate).
pub async fn try_insert(db: &Database, service: &ServiceRow) -> Result<bool, BerthError> {
    let service = service.clone();
    db.connection()
        .call(move |conn| {
            let endpoints = serde_json::to_string(&service.endpoints)
                .unwrap_or_else(|_| "{}".to_string());
            let result = conn.execute(
                "INSERT INTO services (identity, port, pid, claimed_at, last_seen, expires_at, health_path, endpoints)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    service.identity,
                    service.port as i64,
                    service.pid,
                    service.claimed_at,
                    service.last_seen,
                    service.expires_at,
                    service.health_path,
                    endpoints,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(ref e) if is_unique_violation(e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Refresh `last_seen` on an existing assignment.
pub async fn touch_last_seen(db: &Database, identity: &str, now: i64) -> Result<(), BerthError> {
    let identity = identity.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE services SET last_seen = ?1 WHERE identity = ?2",
                params![now, identity],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete the given identities in one transaction. Returns the count removed.
pub async fn delete_by_identities(
    db: &Database,
    identities: Vec<String>,
) -> Result<u64, BerthError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0u64;
            {
                let mut stmt = tx.prepare("DELETE FROM services WHERE identity = ?1")?;
                for identity in &identities {
                    removed += stmt.execute(params![identity])? as u64;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete rows whose expiry has passed. Returns the count removed.
pub async fn delete_expired(db: &Database, now: i64) -> Result<u64, BerthError> {
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM services WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// All assignments, ordered by identity.
pub async fn list_all(db: &Database) -> Result<Vec<ServiceRow>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM services ORDER BY identity ASC"
            ))?;
            let rows = stmt.query_map([], row_to_service)?;
            let mut services = Vec::new();
            for row in rows {
                services.push(row?);
            }
            Ok(services)
        })
        .await
        .map_err(map_tr_err)
}

/// Every port currently present in the table.
pub async fn used_ports(db: &Database) -> Result<Vec<u16>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT port FROM services")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            let mut ports = Vec::new();
            for row in rows {
                ports.push(row? as u16);
            }
            Ok(ports)
        })
        .await
        .map_err(map_tr_err)
}

/// Merge one `env -> url` pair into the service's endpoint map.
///
/// Returns `false` when no row exists for the identity.
pub async fn merge_endpoint(
    db: &Database,
    identity: &str,
    env: &str,
    url: &str,
) -> Result<bool, BerthError> {
    let identity = identity.to_string();
    let env = env.to_string();
    let url = url.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT endpoints FROM services WHERE identity = ?1",
                    params![identity],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(existing) = existing else {
                tx.commit()?;
                return Ok(false);
            };
            let mut map: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&existing).unwrap_or_default();
            map.insert(env.clone(), serde_json::Value::String(url.clone()));
            let merged = serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string());
            tx.execute(
                "UPDATE services SET endpoints = ?1 WHERE identity = ?2",
                params![merged, identity],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}
