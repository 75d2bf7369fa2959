// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable changelog keyed by identity, with computed rollups.

use std::sync::Arc;

use berth_core::{now_ms, BerthError, ChangelogKind, Identity};
use berth_store::queries::changelog as changelog_q;
use berth_store::{ChangelogRow, Database};

use crate::activity::ActivityLog;

/// Inputs for recording an entry.
#[derive(Debug, Clone)]
pub struct AddChangelog {
    pub identity: Identity,
    pub kind: ChangelogKind,
    pub summary: String,
    pub description: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

/// Changelog service.
pub struct ChangelogService {
    db: Arc<Database>,
    activity: Arc<ActivityLog>,
}

impl ChangelogService {
    pub fn new(db: Arc<Database>, activity: Arc<ActivityLog>) -> Self {
        Self { db, activity }
    }

    /// Append an entry. Entries are never edited or deleted.
    pub async fn add(&self, input: AddChangelog) -> Result<ChangelogRow, BerthError> {
        if input.summary.trim().is_empty() {
            return Err(BerthError::validation("changelog summary must not be empty"));
        }
        let now = now_ms();
        let row = ChangelogRow {
            id: 0,
            identity: input.identity.as_str().to_string(),
            kind: input.kind.to_string(),
            summary: input.summary,
            description: input.description,
            session_id: input.session_id,
            agent_id: input.agent_id.clone(),
            created_at: now,
        };
        let id = changelog_q::insert(&self.db, &row).await?;
        self.activity
            .record(
                "changelog",
                "add",
                Some(input.identity.as_str()),
                Some(serde_json::json!({ "kind": row.kind })),
                input.agent_id.as_deref(),
            )
            .await;
        Ok(ChangelogRow { id, ..row })
    }

    /// Entries for an identity and its refinements, newest first. An entry
    /// for `a:b:c` is visible to queries for `a:b` and `a`.
    pub async fn query(
        &self,
        identity: &Identity,
        limit: i64,
    ) -> Result<Vec<ChangelogRow>, BerthError> {
        changelog_q::list_rollup(&self.db, identity.as_str(), limit).await
    }
}
