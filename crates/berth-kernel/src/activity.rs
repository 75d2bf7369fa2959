// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Uniform audit log.
//!
//! Every mutating kernel operation records exactly one row here. Writes are
//! best-effort: an audit failure is logged, never propagated, so it cannot
//! fail the operation it describes.

use std::sync::Arc;

use berth_core::{now_ms, BerthError};
use berth_store::queries::activity as activity_q;
use berth_store::{ActivityRow, Database};
use tracing::warn;

pub use berth_store::queries::activity::ActivityFilter;

/// Handle for audit writes and reads.
pub struct ActivityLog {
    db: Arc<Database>,
}

impl ActivityLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one audit row.
    pub async fn record(
        &self,
        entry_type: &str,
        action: &str,
        target: Option<&str>,
        details: Option<serde_json::Value>,
        agent_id: Option<&str>,
    ) {
        let row = ActivityRow {
            id: 0,
            entry_type: entry_type.to_string(),
            action: action.to_string(),
            target: target.map(String::from),
            details: details.map(|d| d.to_string()),
            agent_id: agent_id.map(String::from),
            created_at: now_ms(),
        };
        if let Err(e) = activity_q::insert(&self.db, &row).await {
            warn!(error = %e, entry_type, action, "activity write failed");
        }
    }

    /// Filtered, paginated reads; newest first.
    pub async fn list(&self, filter: ActivityFilter) -> Result<Vec<ActivityRow>, BerthError> {
        activity_q::list(&self.db, filter).await
    }

    /// Row counts per entry type over a time window.
    pub async fn summary(
        &self,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<(String, i64)>, BerthError> {
        activity_q::summary(&self.db, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn record_then_read_back() {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let log = ActivityLog::new(db);

        log.record(
            "service",
            "claim",
            Some("myapp:api"),
            Some(serde_json::json!({"port": 4001})),
            Some("alpha"),
        )
        .await;

        let rows = log.list(ActivityFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entry_type, "service");
        assert_eq!(rows[0].action, "claim");
        assert_eq!(rows[0].agent_id.as_deref(), Some("alpha"));
        assert!(rows[0].details.as_deref().unwrap().contains("4001"));
    }

    #[tokio::test]
    async fn filters_narrow_the_trail() {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let log = ActivityLog::new(db);

        log.record("lock", "acquire", Some("db-mig"), None, Some("alpha")).await;
        log.record("lock", "release", Some("db-mig"), None, Some("alpha")).await;
        log.record("service", "claim", Some("myapp"), None, Some("beta")).await;

        let locks = log
            .list(ActivityFilter {
                entry_type: Some("lock".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);

        let summary = log.summary(None, None).await.unwrap();
        assert_eq!(
            summary,
            vec![("lock".to_string(), 2), ("service".to_string(), 1)]
        );
    }
}
