// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent registration and liveness.
//!
//! Registration is an upsert; liveness is a pure function of the heartbeat
//! gap. The `state` column is written only by the reaper (its memory of the
//! last derived state); every read here re-derives.

use std::sync::Arc;

use berth_config::model::AgentsConfig;
use berth_core::{now_ms, AgentState, BerthError, Identity};
use berth_store::queries::{agents as agents_q, salvage as salvage_q};
use berth_store::{AgentRow, Database};
use serde::Serialize;
use tracing::info;

use crate::activity::ActivityLog;

/// Registration inputs beyond the id.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub agent_type: String,
    pub purpose: Option<String>,
    pub identity: Option<Identity>,
    pub worktree_id: Option<String>,
}

/// Registration result, including a hint for proactive salvage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOutcome {
    pub agent: AgentRow,
    /// Pending resurrection entries whose project matches the supplied
    /// identity's project. Zero when no identity was supplied.
    pub salvage_hint: i64,
}

/// Agent registry service.
pub struct AgentRegistry {
    db: Arc<Database>,
    config: AgentsConfig,
    activity: Arc<ActivityLog>,
}

impl AgentRegistry {
    pub fn new(db: Arc<Database>, config: AgentsConfig, activity: Arc<ActivityLog>) -> Self {
        Self {
            db,
            config,
            activity,
        }
    }

    /// Derive the live state of a row from its heartbeat gap.
    pub fn derive_state(&self, row: &AgentRow, now: i64) -> AgentState {
        AgentState::derive(
            now - row.last_heartbeat,
            self.config.stale_after_ms,
            self.config.dead_after_ms,
        )
    }

    fn with_derived_state(&self, mut row: AgentRow, now: i64) -> AgentRow {
        row.state = self.derive_state(&row, now).to_string();
        row
    }

    /// Register (or refresh) an agent.
    pub async fn register(
        &self,
        id: &str,
        opts: RegisterOptions,
    ) -> Result<RegisterOutcome, BerthError> {
        if id.is_empty() {
            return Err(BerthError::validation("agent id must not be empty"));
        }
        let now = now_ms();
        let row = AgentRow {
            id: id.to_string(),
            agent_type: if opts.agent_type.is_empty() {
                "agent".to_string()
            } else {
                opts.agent_type.clone()
            },
            purpose: opts.purpose.clone(),
            project: opts.identity.as_ref().map(|i| i.project().to_string()),
            stack: opts.identity.as_ref().and_then(|i| i.stack()).map(String::from),
            context: opts
                .identity
                .as_ref()
                .and_then(|i| i.context())
                .map(String::from),
            worktree_id: opts.worktree_id.clone(),
            registered_at: now,
            last_heartbeat: now,
            state: AgentState::Active.to_string(),
        };
        agents_q::upsert(&self.db, &row).await?;

        let salvage_hint = match opts.identity.as_ref().map(|i| i.project()) {
            Some(project) => salvage_q::count_pending_by_project(&self.db)
                .await?
                .into_iter()
                .find(|(p, _)| p.as_str() == project)
                .map(|(_, count)| count)
                .unwrap_or(0),
            None => 0,
        };

        info!(agent = id, salvage_hint, "agent registered");
        self.activity
            .record("agent", "register", Some(id), None, Some(id))
            .await;

        let agent = agents_q::get(&self.db, id)
            .await?
            .ok_or_else(|| BerthError::Internal(format!("agent {id} vanished after upsert")))?;
        Ok(RegisterOutcome {
            agent: self.with_derived_state(agent, now),
            salvage_hint,
        })
    }

    /// Refresh `last_heartbeat`. Unknown ids are a defined error.
    pub async fn heartbeat(&self, id: &str) -> Result<(), BerthError> {
        let known = agents_q::touch_heartbeat(&self.db, id, now_ms()).await?;
        if !known {
            return Err(BerthError::not_found("agent", id));
        }
        Ok(())
    }

    /// Remove the registration. Sessions owned by the agent are untouched:
    /// a human-invoked unregister is treated as clean.
    pub async fn unregister(&self, id: &str) -> Result<(), BerthError> {
        let removed = agents_q::delete(&self.db, id).await?;
        if !removed {
            return Err(BerthError::not_found("agent", id));
        }
        self.activity
            .record("agent", "unregister", Some(id), None, Some(id))
            .await;
        Ok(())
    }

    /// Fetch one agent with its derived state.
    pub async fn get(&self, id: &str) -> Result<AgentRow, BerthError> {
        let row = agents_q::get(&self.db, id)
            .await?
            .ok_or_else(|| BerthError::not_found("agent", id))?;
        Ok(self.with_derived_state(row, now_ms()))
    }

    /// List agents with derived states, optionally filtered by project
    /// prefix and state.
    pub async fn list(
        &self,
        project: Option<&str>,
        state: Option<AgentState>,
    ) -> Result<Vec<AgentRow>, BerthError> {
        let now = now_ms();
        let rows = agents_q::list(&self.db, project).await?;
        Ok(rows
            .into_iter()
            .map(|row| self.with_derived_state(row, now))
            .filter(|row| match state {
                Some(state) => row.state == state.to_string(),
                None => true,
            })
            .collect())
    }
}
