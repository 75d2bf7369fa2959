// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared entity enums and well-known names.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Channel on which the orchestrator announces services that passed their
/// health probe.
pub const SERVICE_READY_CHANNEL: &str = "service.ready";

/// Derived liveness of a registered agent.
///
/// Never stored as truth: always re-derived from the heartbeat gap. The
/// reaper keeps a copy of the last state it derived so transitions fire
/// exactly once.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentState {
    Active,
    Stale,
    Dead,
}

impl AgentState {
    /// Derive the state from a heartbeat gap and the configured thresholds.
    pub fn derive(gap_ms: i64, stale_after_ms: i64, dead_after_ms: i64) -> Self {
        if gap_ms >= dead_after_ms {
            AgentState::Dead
        } else if gap_ms >= stale_after_ms {
            AgentState::Stale
        } else {
            AgentState::Active
        }
    }
}

/// Session lifecycle. Terminal states never transition back to `Active`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// Lifecycle of a resurrection entry. All transitions are one-way.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SalvageState {
    Pending,
    Claimed,
    Done,
    Abandoned,
    Dismissed,
}

impl SalvageState {
    /// Whether `self -> next` is an allowed transition.
    pub fn can_become(self, next: SalvageState) -> bool {
        matches!(
            (self, next),
            (SalvageState::Pending, SalvageState::Claimed)
                | (SalvageState::Pending, SalvageState::Dismissed)
                | (SalvageState::Claimed, SalvageState::Done)
                | (SalvageState::Claimed, SalvageState::Abandoned)
        )
    }
}

/// Category of a changelog entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangelogKind {
    Feature,
    Fix,
    Refactor,
    Docs,
    Chore,
    Breaking,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn agent_state_derivation_thresholds() {
        let stale = 600_000;
        let dead = 1_200_000;
        assert_eq!(AgentState::derive(0, stale, dead), AgentState::Active);
        assert_eq!(AgentState::derive(599_999, stale, dead), AgentState::Active);
        assert_eq!(AgentState::derive(600_000, stale, dead), AgentState::Stale);
        assert_eq!(AgentState::derive(1_199_999, stale, dead), AgentState::Stale);
        assert_eq!(AgentState::derive(1_200_000, stale, dead), AgentState::Dead);
    }

    #[test]
    fn session_terminal_states() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
    }

    #[test]
    fn salvage_transitions_are_one_way() {
        use SalvageState::*;
        assert!(Pending.can_become(Claimed));
        assert!(Pending.can_become(Dismissed));
        assert!(Claimed.can_become(Done));
        assert!(Claimed.can_become(Abandoned));

        assert!(!Claimed.can_become(Pending));
        assert!(!Done.can_become(Claimed));
        assert!(!Dismissed.can_become(Pending));
        assert!(!Pending.can_become(Done), "claim before completing");
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for s in ["active", "stale", "dead"] {
            assert_eq!(AgentState::from_str(s).unwrap().to_string(), s);
        }
        for s in ["pending", "claimed", "done", "abandoned", "dismissed"] {
            assert_eq!(SalvageState::from_str(s).unwrap().to_string(), s);
        }
        for s in ["feature", "fix", "refactor", "docs", "chore", "breaking"] {
            assert_eq!(ChangelogKind::from_str(s).unwrap().to_string(), s);
        }
        assert!(AgentState::from_str("zombie").is_err());
        assert!(SessionStatus::from_str("Active").is_err(), "wire form is lowercase");
    }
}
