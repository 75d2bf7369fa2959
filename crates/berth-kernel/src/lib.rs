// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain services for the berth coordination daemon.
//!
//! Each service is a thin struct over the shared [`Database`] handle; all
//! serialization lives in the store. The [`Kernel`] aggregate wires the
//! whole set up for the gateway and the test harness.

pub mod activity;
pub mod agents;
pub mod changelog;
pub mod locks;
pub mod ports;
pub mod probe;
pub mod reaper;
pub mod salvage;
pub mod sessions;

use std::sync::Arc;

use berth_config::BerthConfig;
use berth_store::Database;

pub use activity::{ActivityFilter, ActivityLog};
pub use agents::{AgentRegistry, RegisterOptions, RegisterOutcome};
pub use changelog::{AddChangelog, ChangelogService};
pub use locks::{AcquireOutcome, LockService};
pub use ports::{ClaimOptions, ClaimOutcome, PortRegistry};
pub use reaper::{Reaper, SweepReport};
pub use salvage::SalvageService;
pub use sessions::{
    AddFilesOutcome, AddNote, SessionDetail, SessionService, StartOutcome, StartSession,
};

/// The assembled coordination kernel: one database, one of each service.
pub struct Kernel {
    pub db: Arc<Database>,
    pub activity: Arc<ActivityLog>,
    pub ports: Arc<PortRegistry>,
    pub locks: Arc<LockService>,
    pub agents: Arc<AgentRegistry>,
    pub sessions: Arc<SessionService>,
    pub salvage: Arc<SalvageService>,
    pub changelog: Arc<ChangelogService>,
    pub reaper: Arc<Reaper>,
}

impl Kernel {
    pub fn new(db: Arc<Database>, config: &BerthConfig) -> Self {
        let activity = Arc::new(ActivityLog::new(db.clone()));
        let ports = Arc::new(PortRegistry::new(
            db.clone(),
            config.ports.clone(),
            activity.clone(),
        ));
        let locks = Arc::new(LockService::new(
            db.clone(),
            config.locks.clone(),
            activity.clone(),
        ));
        let agents = Arc::new(AgentRegistry::new(
            db.clone(),
            config.agents.clone(),
            activity.clone(),
        ));
        let sessions = Arc::new(SessionService::new(
            db.clone(),
            activity.clone(),
            config.daemon.default_agent_id.clone(),
        ));
        let salvage = Arc::new(SalvageService::new(db.clone(), activity.clone()));
        let changelog = Arc::new(ChangelogService::new(db.clone(), activity.clone()));
        let reaper = Arc::new(Reaper::new(
            db.clone(),
            config.agents.clone(),
            config.messaging.clone(),
            config.activity.clone(),
            config.salvage.clone(),
            activity.clone(),
        ));
        Self {
            db,
            activity,
            ports,
            locks,
            agents,
            sessions,
            salvage,
            changelog,
            reaper,
        }
    }
}
