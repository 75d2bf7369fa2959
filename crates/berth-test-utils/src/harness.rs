// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end testing.
//!
//! `TestHarness` assembles the complete kernel (temp SQLite database,
//! every domain service, the broker, and the reaper) with thresholds a
//! test can tune. Tests drive it exactly the way the gateway does.

use std::sync::Arc;

use berth_bus::Broker;
use berth_config::BerthConfig;
use berth_core::{now_ms, BerthError};
use berth_kernel::{Kernel, SweepReport};
use berth_store::queries::agents as agents_q;
use berth_store::Database;
use tempfile::TempDir;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: BerthConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = BerthConfig::default();
        // A high, narrow range keeps test claims away from real services.
        config.ports.range_start = 43000;
        config.ports.range_end = 43127;
        Self { config }
    }

    /// Override the agent staleness thresholds.
    pub fn with_liveness(mut self, stale_after_ms: i64, dead_after_ms: i64) -> Self {
        self.config.agents.stale_after_ms = stale_after_ms;
        self.config.agents.dead_after_ms = dead_after_ms;
        self
    }

    /// Override the assignable port range.
    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.config.ports.range_start = start;
        self.config.ports.range_end = end;
        self
    }

    /// Override message retention bounds.
    pub fn with_history_bounds(mut self, max_per_channel: i64, max_age_ms: i64) -> Self {
        self.config.messaging.history_max_per_channel = max_per_channel;
        self.config.messaging.history_max_age_ms = max_age_ms;
        self
    }

    /// Set the agent id attributed to anonymous requests.
    pub fn with_default_agent(mut self, id: &str) -> Self {
        self.config.daemon.default_agent_id = Some(id.to_string());
        self
    }

    /// Arbitrary config access for everything else.
    pub fn with_config(mut self, mutate: impl FnOnce(&mut BerthConfig)) -> Self {
        mutate(&mut self.config);
        self
    }

    pub async fn build(self) -> Result<TestHarness, BerthError> {
        let dir = tempfile::tempdir()
            .map_err(|e| BerthError::Internal(format!("tempdir: {e}")))?;
        let db_path = dir.path().join("berth-test.db");
        let db = Arc::new(
            Database::open(db_path.to_str().unwrap_or("berth-test.db")).await?,
        );
        let kernel = Arc::new(Kernel::new(db.clone(), &self.config));
        let broker = Arc::new(Broker::new(
            db.clone(),
            self.config.messaging.clone(),
            kernel.activity.clone(),
        ));
        Ok(TestHarness {
            config: self.config,
            db,
            kernel,
            broker,
            _dir: dir,
        })
    }
}

/// A complete kernel over an isolated temp database.
pub struct TestHarness {
    pub config: BerthConfig,
    pub db: Arc<Database>,
    pub kernel: Arc<Kernel>,
    pub broker: Arc<Broker>,
    _dir: TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Rewind an agent's heartbeat `ms_ago` into the past, as if it had
    /// silently stopped reporting.
    pub async fn backdate_heartbeat(&self, agent_id: &str, ms_ago: i64) -> Result<(), BerthError> {
        let known = agents_q::touch_heartbeat(&self.db, agent_id, now_ms() - ms_ago).await?;
        if !known {
            return Err(BerthError::not_found("agent", agent_id));
        }
        Ok(())
    }

    /// Run one reaper sweep.
    pub async fn reap(&self) -> Result<SweepReport, BerthError> {
        self.kernel.reaper.sweep().await
    }
}
