// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic background sweep driving lifecycle transitions.
//!
//! One sweep: drop service rows owned by dead pids, delete expired locks,
//! re-derive agent states (creating resurrection entries for newly dead
//! agents with active sessions), truncate channel history, and enforce
//! activity retention. Writes per entity class are batched into one
//! transaction so a failed sweep never leaves half a transition behind.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use berth_config::model::{ActivityConfig, AgentsConfig, MessagingConfig, SalvageConfig};
use berth_core::{now_ms, AgentState, BerthError};
use berth_store::queries::{
    agents as agents_q, locks as locks_q, messages as messages_q, notes as notes_q,
    salvage as salvage_q, services as services_q, sessions as sessions_q,
};
use berth_store::{Database, ResurrectionRow};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::probe::pid_alive;

/// What one sweep did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub services_dropped: u64,
    pub services_expired: u64,
    pub locks_expired: u64,
    pub agents_stale: u64,
    pub agents_dead: u64,
    pub resurrections_created: u64,
    pub messages_pruned: u64,
    pub activity_pruned: u64,
}

/// The background reaper.
pub struct Reaper {
    db: Arc<Database>,
    agents_cfg: AgentsConfig,
    messaging_cfg: MessagingConfig,
    activity_cfg: ActivityConfig,
    salvage_cfg: SalvageConfig,
    activity: Arc<ActivityLog>,
}

impl Reaper {
    pub fn new(
        db: Arc<Database>,
        agents_cfg: AgentsConfig,
        messaging_cfg: MessagingConfig,
        activity_cfg: ActivityConfig,
        salvage_cfg: SalvageConfig,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            db,
            agents_cfg,
            messaging_cfg,
            activity_cfg,
            salvage_cfg,
            activity,
        }
    }

    /// Run sweeps on the given interval until cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick; startup is not a sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) => {
                            debug!(?report, "reaper sweep complete");
                        }
                        Err(e) => {
                            warn!(error = %e, "reaper sweep failed (non-fatal)");
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("reaper shutting down");
                    break;
                }
            }
        }
    }

    /// One full sweep across all entity classes.
    pub async fn sweep(&self) -> Result<SweepReport, BerthError> {
        let started = Instant::now();
        let now = now_ms();
        let mut report = SweepReport::default();

        report.services_dropped = self.sweep_services(now).await?;
        report.services_expired = services_q::delete_expired(&self.db, now).await?;
        report.locks_expired = locks_q::delete_expired(&self.db, now).await?;
        self.sweep_agents(now, &mut report).await?;
        report.messages_pruned = messages_q::prune(
            &self.db,
            now - self.messaging_cfg.history_max_age_ms,
            self.messaging_cfg.history_max_per_channel,
        )
        .await?;
        report.activity_pruned = activity_prune(&self.db, now, &self.activity_cfg).await?;

        let elapsed = started.elapsed();
        metrics::histogram!("berth_reaper_sweep_seconds").record(elapsed.as_secs_f64());
        metrics::counter!("berth_reaper_sweeps_total").increment(1);
        metrics::counter!("berth_reaper_resurrections_total")
            .increment(report.resurrections_created);

        info!(
            services_dropped = report.services_dropped,
            locks_expired = report.locks_expired,
            agents_dead = report.agents_dead,
            resurrections = report.resurrections_created,
            elapsed_ms = elapsed.as_millis() as u64,
            "reaper sweep"
        );
        Ok(report)
    }

    /// Drop service rows whose owning pid is no longer alive.
    async fn sweep_services(&self, _now: i64) -> Result<u64, BerthError> {
        let stale: Vec<String> = services_q::list_all(&self.db)
            .await?
            .into_iter()
            .filter(|row| row.pid.map(|pid| !pid_alive(pid)).unwrap_or(false))
            .map(|row| row.identity)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let removed = services_q::delete_by_identities(&self.db, stale.clone()).await?;
        self.activity
            .record(
                "service",
                "reap_stale_pid",
                None,
                Some(serde_json::json!({ "identities": stale })),
                None,
            )
            .await;
        Ok(removed)
    }

    /// Re-derive agent states; on a transition to dead with active sessions,
    /// build a resurrection entry snapshotting session ids and recent notes.
    async fn sweep_agents(&self, now: i64, report: &mut SweepReport) -> Result<(), BerthError> {
        let agents = agents_q::list(&self.db, None).await?;
        let mut state_updates: Vec<(String, String)> = Vec::new();
        let mut entries: Vec<ResurrectionRow> = Vec::new();
        let mut transitions: Vec<(String, AgentState)> = Vec::new();

        for agent in &agents {
            let derived = AgentState::derive(
                now - agent.last_heartbeat,
                self.agents_cfg.stale_after_ms,
                self.agents_cfg.dead_after_ms,
            );
            let stored = AgentState::from_str(&agent.state).unwrap_or(AgentState::Active);
            if derived == stored {
                continue;
            }
            state_updates.push((agent.id.clone(), derived.to_string()));
            transitions.push((agent.id.clone(), derived));

            if derived == AgentState::Dead {
                if salvage_q::has_pending_for_agent(&self.db, &agent.id).await? {
                    continue;
                }
                let sessions = sessions_q::active_for_agent(&self.db, &agent.id).await?;
                if sessions.is_empty() {
                    continue;
                }
                let session_ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
                let mut notes_by_session = HashMap::new();
                for session in &sessions {
                    let notes = notes_q::last_n_for_session(
                        &self.db,
                        &session.id,
                        self.salvage_cfg.notes_per_session,
                    )
                    .await?;
                    notes_by_session.insert(session.id.clone(), notes);
                }
                let identity = sessions.iter().find_map(|s| s.identity.clone()).or_else(|| {
                    agent.project.as_ref().map(|p| match &agent.stack {
                        Some(stack) => format!("{p}:{stack}"),
                        None => p.clone(),
                    })
                });
                entries.push(ResurrectionRow {
                    id: 0,
                    dead_agent_id: agent.id.clone(),
                    identity,
                    project: agent.project.clone(),
                    stack: agent.stack.clone(),
                    sessions_snapshot: serde_json::to_string(&session_ids)
                        .unwrap_or_else(|_| "[]".to_string()),
                    notes_snapshot: serde_json::to_string(&notes_by_session)
                        .unwrap_or_else(|_| "{}".to_string()),
                    state: "pending".to_string(),
                    claimed_by: None,
                    created_at: now,
                });
            }
        }

        report.resurrections_created = entries.len() as u64;
        report.agents_stale = transitions
            .iter()
            .filter(|(_, s)| *s == AgentState::Stale)
            .count() as u64;
        report.agents_dead = transitions
            .iter()
            .filter(|(_, s)| *s == AgentState::Dead)
            .count() as u64;

        agents_q::apply_sweep(&self.db, state_updates, entries).await?;

        for (agent_id, state) in transitions {
            match state {
                AgentState::Stale => {
                    self.activity
                        .record("agent", "agent.stale", Some(&agent_id), None, Some(&agent_id))
                        .await;
                }
                AgentState::Dead => {
                    self.activity
                        .record("agent", "agent.dead", Some(&agent_id), None, Some(&agent_id))
                        .await;
                }
                AgentState::Active => {
                    self.activity
                        .record("agent", "agent.revived", Some(&agent_id), None, Some(&agent_id))
                        .await;
                }
            }
        }
        Ok(())
    }
}

async fn activity_prune(
    db: &Database,
    now: i64,
    cfg: &ActivityConfig,
) -> Result<u64, BerthError> {
    berth_store::queries::activity::prune(db, now - cfg.max_age_ms, cfg.max_rows).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_config::model::BerthConfig;
    use berth_core::Identity;
    use tempfile::tempdir;

    use crate::agents::{AgentRegistry, RegisterOptions};
    use crate::sessions::{SessionService, StartSession};

    struct Fixture {
        db: Arc<Database>,
        reaper: Reaper,
        agents: AgentRegistry,
        sessions: SessionService,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let config = BerthConfig::default();
        let activity = Arc::new(ActivityLog::new(db.clone()));
        let reaper = Reaper::new(
            db.clone(),
            config.agents.clone(),
            config.messaging.clone(),
            config.activity.clone(),
            config.salvage.clone(),
            activity.clone(),
        );
        let agents = AgentRegistry::new(db.clone(), config.agents.clone(), activity.clone());
        let sessions = SessionService::new(db.clone(), activity, None);
        Fixture {
            db,
            reaper,
            agents,
            sessions,
            _dir: dir,
        }
    }

    fn register_opts(identity: &str) -> RegisterOptions {
        RegisterOptions {
            agent_type: "worker".to_string(),
            purpose: None,
            identity: Some(Identity::parse(identity).unwrap()),
            worktree_id: None,
        }
    }

    #[tokio::test]
    async fn dead_agent_with_active_session_yields_one_entry() {
        let f = setup().await;
        f.agents.register("alpha", register_opts("myapp:api")).await.unwrap();
        f.sessions
            .start(StartSession {
                purpose: "in flight".to_string(),
                agent_id: Some("alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        // Back-date past DEAD_AFTER.
        agents_q::touch_heartbeat(&f.db, "alpha", now_ms() - 2_000_000)
            .await
            .unwrap();

        let report = f.reaper.sweep().await.unwrap();
        assert_eq!(report.agents_dead, 1);
        assert_eq!(report.resurrections_created, 1);

        // A second sweep does not duplicate the entry.
        let report = f.reaper.sweep().await.unwrap();
        assert_eq!(report.agents_dead, 0, "no new transition");
        assert_eq!(report.resurrections_created, 0);

        let pending = salvage_q::list(&f.db, Some("pending"), Some("myapp"), None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dead_agent_id, "alpha");
        assert!(pending[0].sessions_snapshot.contains("\""));
    }

    #[tokio::test]
    async fn dead_agent_without_sessions_yields_no_entry() {
        let f = setup().await;
        f.agents.register("idle", register_opts("myapp")).await.unwrap();
        agents_q::touch_heartbeat(&f.db, "idle", now_ms() - 2_000_000)
            .await
            .unwrap();

        let report = f.reaper.sweep().await.unwrap();
        assert_eq!(report.agents_dead, 1);
        assert_eq!(report.resurrections_created, 0);
    }

    #[tokio::test]
    async fn stale_transition_is_recorded_but_creates_nothing() {
        let f = setup().await;
        f.agents.register("slow", register_opts("myapp")).await.unwrap();
        agents_q::touch_heartbeat(&f.db, "slow", now_ms() - 700_000)
            .await
            .unwrap();

        let report = f.reaper.sweep().await.unwrap();
        assert_eq!(report.agents_stale, 1);
        assert_eq!(report.resurrections_created, 0);
    }

    #[tokio::test]
    async fn expired_locks_are_swept() {
        let f = setup().await;
        let now = now_ms();
        locks_q::try_acquire(
            &f.db,
            &berth_store::LockRow {
                name: "stale".to_string(),
                owner: "A".to_string(),
                acquired_at: now - 10_000,
                expires_at: Some(now - 5_000),
                pid: None,
            },
        )
        .await
        .unwrap();

        let report = f.reaper.sweep().await.unwrap();
        assert_eq!(report.locks_expired, 1);
    }
}
