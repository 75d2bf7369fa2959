// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resurrection queue: handoff of a dead agent's in-progress sessions.
//!
//! Entries are created only by the reaper (see `reaper.rs`); this service
//! owns the read side and the one-way state machine.

use std::str::FromStr;
use std::sync::Arc;

use berth_core::{BerthError, SalvageState};
use berth_store::queries::salvage as salvage_q;
use berth_store::{Database, ResurrectionRow};
use tracing::info;

use crate::activity::ActivityLog;

/// Salvage service.
pub struct SalvageService {
    db: Arc<Database>,
    activity: Arc<ActivityLog>,
}

impl SalvageService {
    pub fn new(db: Arc<Database>, activity: Arc<ActivityLog>) -> Self {
        Self { db, activity }
    }

    /// Pending entries, optionally narrowed by project and stack.
    pub async fn pending(
        &self,
        project: Option<&str>,
        stack: Option<&str>,
    ) -> Result<Vec<ResurrectionRow>, BerthError> {
        salvage_q::list(
            &self.db,
            Some(&SalvageState::Pending.to_string()),
            project,
            stack,
        )
        .await
    }

    /// Entries in any state, with the same filters.
    pub async fn list(
        &self,
        state: Option<SalvageState>,
        project: Option<&str>,
        stack: Option<&str>,
    ) -> Result<Vec<ResurrectionRow>, BerthError> {
        salvage_q::list(
            &self.db,
            state.map(|s| s.to_string()).as_deref(),
            project,
            stack,
        )
        .await
    }

    pub async fn get(&self, id: i64) -> Result<ResurrectionRow, BerthError> {
        salvage_q::get(&self.db, id)
            .await?
            .ok_or_else(|| BerthError::not_found("resurrection entry", id.to_string()))
    }

    /// Move pending -> claimed, recording the claimer.
    pub async fn claim(&self, id: i64, by_agent: &str) -> Result<ResurrectionRow, BerthError> {
        if by_agent.is_empty() {
            return Err(BerthError::validation("claim requires a claiming agent id"));
        }
        self.transition(id, SalvageState::Claimed, Some(by_agent)).await
    }

    /// Apply a one-way transition. Guards both the allowed edge set and the
    /// race against concurrent claimers.
    pub async fn transition(
        &self,
        id: i64,
        to: SalvageState,
        by_agent: Option<&str>,
    ) -> Result<ResurrectionRow, BerthError> {
        let current = self.get(id).await?;
        let from = SalvageState::from_str(&current.state)
            .map_err(|_| BerthError::Internal(format!("corrupt salvage state `{}`", current.state)))?;

        if !from.can_become(to) {
            return Err(BerthError::conflict(format!(
                "resurrection entry {id} cannot move {from} -> {to}"
            )));
        }

        let moved = salvage_q::transition(
            &self.db,
            id,
            &from.to_string(),
            &to.to_string(),
            by_agent,
        )
        .await?;
        if !moved {
            // Someone else transitioned between our read and write.
            return Err(BerthError::conflict(format!(
                "resurrection entry {id} was transitioned concurrently"
            )));
        }

        info!(entry = id, from = %from, to = %to, "salvage transition");
        self.activity
            .record(
                "salvage",
                &to.to_string(),
                Some(&id.to_string()),
                Some(serde_json::json!({ "deadAgent": current.dead_agent_id })),
                by_agent,
            )
            .await;

        self.get(id).await
    }

    /// Pending-entry counts per project, for the register salvage hint.
    pub async fn count_by_project(&self) -> Result<Vec<(String, i64)>, BerthError> {
        salvage_q::count_pending_by_project(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (SalvageService, Arc<Database>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let activity = Arc::new(ActivityLog::new(db.clone()));
        let service = SalvageService::new(db.clone(), activity);
        (service, db, dir)
    }

    async fn seed_entry(db: &Database, agent: &str, project: &str) -> i64 {
        salvage_q::insert(
            db,
            &ResurrectionRow {
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
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn claim_then_complete() {
        let (service, db, _dir) = setup().await;
        let id = seed_entry(&db, "alpha", "myapp").await;

        let claimed = service.claim(id, "beta").await.unwrap();
        assert_eq!(claimed.state, "claimed");
        assert_eq!(claimed.claimed_by.as_deref(), Some("beta"));

        let done = service.transition(id, SalvageState::Done, Some("beta")).await.unwrap();
        assert_eq!(done.state, "done");
    }

    #[tokio::test]
    async fn illegal_edges_are_conflicts() {
        let (service, db, _dir) = setup().await;
        let id = seed_entry(&db, "alpha", "myapp").await;

        // pending -> done skips claiming.
        let err = service.transition(id, SalvageState::Done, None).await.unwrap_err();
        assert!(matches!(err, BerthError::Conflict { .. }));

        service.claim(id, "beta").await.unwrap();
        // claimed -> claimed double-claim.
        let err = service.claim(id, "gamma").await.unwrap_err();
        assert!(matches!(err, BerthError::Conflict { .. }));
    }

    #[tokio::test]
    async fn dismiss_from_pending() {
        let (service, db, _dir) = setup().await;
        let id = seed_entry(&db, "alpha", "myapp").await;
        let dismissed = service
            .transition(id, SalvageState::Dismissed, None)
            .await
            .unwrap();
        assert_eq!(dismissed.state, "dismissed");
    }

    #[tokio::test]
    async fn pending_filters_by_project() {
        let (service, db, _dir) = setup().await;
        seed_entry(&db, "alpha", "myapp").await;
        seed_entry(&db, "beta", "other").await;

        let myapp = service.pending(Some("myapp"), None).await.unwrap();
        assert_eq!(myapp.len(), 1);
        assert_eq!(myapp[0].dead_agent_id, "alpha");

        let counts = service.count_by_project().await.unwrap();
        assert_eq!(counts.len(), 2);
    }
}
