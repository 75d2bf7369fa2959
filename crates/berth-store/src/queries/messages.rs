// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel message log queries.

use berth_core::BerthError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{ChannelInfo, MessageRow};

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel: row.get(1)?,
        payload: row.get(2)?,
        sender: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const SELECT_COLS: &str = "id, channel, payload, sender, created_at";

/// Append a message. Returns the assigned monotonic id.
pub async fn insert(
    db: &Database,
    channel: &str,
    payload: &str,
    sender: Option<&str>,
    now: i64,
) -> Result<i64, BerthError> {
    let channel = channel.to_string();
    let payload = payload.to_string();
    let sender = sender.map(String::from);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (channel, payload, sender, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![channel, payload, sender, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Stored messages for one channel in id order, newer than `since`.
pub async fn list(
    db: &Database,
    channel: &str,
    since: i64,
    limit: i64,
) -> Result<Vec<MessageRow>, BerthError> {
    let channel = channel.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM messages
                 WHERE channel = ?1 AND id > ?2
                 ORDER BY id ASC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![channel, since, limit], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Highest assigned id on a channel, or 0 when empty.
pub async fn last_id(db: &Database, channel: &str) -> Result<i64, BerthError> {
    let channel = channel.to_string();
    db.connection()
        .call(move |conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(MAX(id), 0) FROM messages WHERE channel = ?1",
                params![channel],
                |row| row.get(0),
            )?)
        })
        .await
        .map_err(map_tr_err)
}

/// Distinct channels with message count and last-message time.
pub async fn channels(db: &Database) -> Result<Vec<ChannelInfo>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT channel, COUNT(*), MAX(created_at) FROM messages
                 GROUP BY channel ORDER BY channel ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ChannelInfo {
                    channel: row.get(0)?,
                    message_count: row.get(1)?,
                    last_message: row.get(2)?,
                })
            })?;
            let mut infos = Vec::new();
            for row in rows {
                infos.push(row?);
            }
            Ok(infos)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a channel's stored history. Returns the count removed.
pub async fn clear(db: &Database, channel: &str) -> Result<u64, BerthError> {
    let channel = channel.to_string();
    db.connection()
        .call(move |conn| {
            let removed =
                conn.execute("DELETE FROM messages WHERE channel = ?1", params![channel])?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Retention sweep: drop rows older than `cutoff`, then trim every channel
/// to its newest `keep` rows. One transaction. Returns the count removed.
pub async fn prune(db: &Database, cutoff: i64, keep: i64) -> Result<u64, BerthError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = tx.execute(
                "DELETE FROM messages WHERE created_at < ?1",
                params![cutoff],
            )? as u64;
            let channels: Vec<String> = {
                let mut stmt = tx.prepare("SELECT DISTINCT channel FROM messages")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                out
            };
            {
                let mut stmt = tx.prepare(
                    "DELETE FROM messages WHERE channel = ?1 AND id NOT IN (
                         SELECT id FROM messages WHERE channel = ?1
                         ORDER BY id DESC LIMIT ?2
                     )",
                )?;
                for channel in &channels {
                    removed += stmt.execute(params![channel, keep])? as u64;
                }
            }
            tx.commit()?;
            Ok(removed)
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

    #[tokio::test]
    async fn ids_are_monotonic_within_and_across_channels() {
        let (db, _dir) = setup_db().await;
        let a = insert(&db, "builds", r#"{"s":1}"#, None, 1).await.unwrap();
        let b = insert(&db, "deploys", r#"{"s":2}"#, None, 2).await.unwrap();
        let c = insert(&db, "builds", r#"{"s":3}"#, None, 3).await.unwrap();
        assert!(a < b && b < c);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_respects_since_and_order() {
        let (db, _dir) = setup_db().await;
        let first = insert(&db, "c", "1", Some("alice"), 10).await.unwrap();
        insert(&db, "c", "2", Some("bob"), 20).await.unwrap();
        insert(&db, "c", "3", None, 30).await.unwrap();
        insert(&db, "other", "x", None, 40).await.unwrap();

        let all = list(&db, "c", 0, 100).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].payload, "1");
        assert_eq!(all[2].payload, "3");

        let after_first = list(&db, "c", first, 100).await.unwrap();
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].payload, "2");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn channels_aggregates() {
        let (db, _dir) = setup_db().await;
        insert(&db, "a", "1", None, 10).await.unwrap();
        insert(&db, "a", "2", None, 20).await.unwrap();
        insert(&db, "b", "3", None, 30).await.unwrap();

        let infos = channels(&db).await.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].channel, "a");
        assert_eq!(infos[0].message_count, 2);
        assert_eq!(infos[0].last_message, 20);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn clear_removes_only_one_channel() {
        let (db, _dir) = setup_db().await;
        insert(&db, "a", "1", None, 10).await.unwrap();
        insert(&db, "b", "2", None, 20).await.unwrap();

        assert_eq!(clear(&db, "a").await.unwrap(), 1);
        assert!(list(&db, "a", 0, 100).await.unwrap().is_empty());
        assert_eq!(list(&db, "b", 0, 100).await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn prune_applies_age_then_count() {
        let (db, _dir) = setup_db().await;
        for i in 0..10 {
            insert(&db, "c", &i.to_string(), None, i).await.unwrap();
        }
        // Age cutoff removes created_at < 2 (two rows), count keeps newest 5.
        let removed = prune(&db, 2, 5).await.unwrap();
        assert_eq!(removed, 5);
        let left = list(&db, "c", 0, 100).await.unwrap();
        assert_eq!(left.len(), 5);
        assert_eq!(left[0].payload, "5");
        db.close().await.unwrap();
    }
}
