// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the berth daemon.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Every field has a compiled default so an empty
//! config file (or none at all) yields a working daemon.

use serde::{Deserialize, Serialize};

/// Top-level berth configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with `BERTHD_*`
/// environment variable overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BerthConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub locks: LocksConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub salvage: SalvageConfig,

    #[serde(default)]
    pub activity: ActivityConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Daemon process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Address to bind. The trust model assumes loopback.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// TCP port the daemon itself listens on.
    #[serde(default = "default_daemon_port")]
    pub port: u16,

    /// Agent id attributed to requests that carry none.
    #[serde(default)]
    pub default_agent_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Heap size above which the memory monitor logs pressure warnings.
    #[serde(default = "default_memory_warn_mb")]
    pub memory_warn_mb: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_daemon_port(),
            default_agent_id: None,
            log_level: default_log_level(),
            memory_warn_mb: default_memory_warn_mb(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file. One file per daemon instance.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Port assignment settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PortsConfig {
    /// Inclusive lower bound of the assignable range.
    #[serde(default = "default_range_start")]
    pub range_start: u16,

    /// Inclusive upper bound of the assignable range.
    #[serde(default = "default_range_end")]
    pub range_end: u16,

    /// Ports never assigned even when inside the range.
    #[serde(default = "default_reserved")]
    pub reserved: Vec<u16>,

    /// How long one OS bind-probe result stays cached.
    #[serde(default = "default_probe_cache_ms")]
    pub probe_cache_ms: u64,

    /// Fresh-port search attempts before a claim surfaces a transient error.
    #[serde(default = "default_claim_retries")]
    pub claim_retries: u32,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
            reserved: default_reserved(),
            probe_cache_ms: default_probe_cache_ms(),
            claim_retries: default_claim_retries(),
        }
    }
}

/// Lock service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocksConfig {
    /// TTL applied when an acquire carries none. `None` means infinite.
    #[serde(default)]
    pub default_ttl_ms: Option<i64>,

    /// Upper bound on caller-supplied TTLs.
    #[serde(default = "default_max_ttl_ms")]
    pub max_ttl_ms: i64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: None,
            max_ttl_ms: default_max_ttl_ms(),
        }
    }
}

/// Pub/sub settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    /// Stored messages kept per channel; older rows are reaped.
    #[serde(default = "default_history_max_per_channel")]
    pub history_max_per_channel: i64,

    /// Stored messages older than this are reaped.
    #[serde(default = "default_history_max_age_ms")]
    pub history_max_age_ms: i64,

    /// Per-subscriber pending frame queue; a full queue evicts the subscriber.
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,

    /// Concurrent SSE streams allowed per source address.
    #[serde(default = "default_max_streams_per_source")]
    pub max_streams_per_source: usize,

    /// Maximum accepted publish payload in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            history_max_per_channel: default_history_max_per_channel(),
            history_max_age_ms: default_history_max_age_ms(),
            subscriber_queue: default_subscriber_queue(),
            max_streams_per_source: default_max_streams_per_source(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Agent liveness thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentsConfig {
    /// Heartbeat gap after which an agent is reported stale.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: i64,

    /// Heartbeat gap after which an agent is reported dead.
    #[serde(default = "default_dead_after_ms")]
    pub dead_after_ms: i64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: default_stale_after_ms(),
            dead_after_ms: default_dead_after_ms(),
        }
    }
}

/// Salvage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SalvageConfig {
    /// Notes snapshotted per session when a resurrection entry is created.
    #[serde(default = "default_notes_per_session")]
    pub notes_per_session: i64,
}

impl Default for SalvageConfig {
    fn default() -> Self {
        Self {
            notes_per_session: default_notes_per_session(),
        }
    }
}

/// Activity log retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    /// Activity rows older than this are reaped.
    #[serde(default = "default_activity_max_age_ms")]
    pub max_age_ms: i64,

    /// Hard cap on retained activity rows; oldest beyond it are reaped.
    #[serde(default = "default_activity_max_rows")]
    pub max_rows: i64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_age_ms: default_activity_max_age_ms(),
            max_rows: default_activity_max_rows(),
        }
    }
}

/// Background sweep settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReaperConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval_secs(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Accepted requests per source address per minute.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: default_rate_limit_per_minute(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_daemon_port() -> u16 {
    9876
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_memory_warn_mb() -> u64 {
    512
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("berthd/berthd.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "berthd.db".to_string())
}

fn default_range_start() -> u16 {
    4000
}

fn default_range_end() -> u16 {
    4999
}

fn default_reserved() -> Vec<u16> {
    vec![default_daemon_port()]
}

fn default_probe_cache_ms() -> u64 {
    2000
}

fn default_claim_retries() -> u32 {
    5
}

fn default_max_ttl_ms() -> i64 {
    24 * 60 * 60 * 1000
}

fn default_history_max_per_channel() -> i64 {
    1000
}

fn default_history_max_age_ms() -> i64 {
    7 * 24 * 60 * 60 * 1000
}

fn default_subscriber_queue() -> usize {
    256
}

fn default_max_streams_per_source() -> usize {
    10
}

fn default_max_payload_bytes() -> usize {
    10 * 1024
}

fn default_stale_after_ms() -> i64 {
    10 * 60 * 1000
}

fn default_dead_after_ms() -> i64 {
    20 * 60 * 1000
}

fn default_notes_per_session() -> i64 {
    20
}

fn default_activity_max_age_ms() -> i64 {
    14 * 24 * 60 * 60 * 1000
}

fn default_activity_max_rows() -> i64 {
    50_000
}

fn default_reaper_interval_secs() -> u64 {
    300
}

fn default_rate_limit_per_minute() -> u32 {
    100
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BerthConfig::default();
        assert_eq!(config.daemon.port, 9876);
        assert_eq!(config.daemon.bind, "127.0.0.1");
        assert!(config.ports.range_start < config.ports.range_end);
        assert!(config.ports.reserved.contains(&9876));
        assert!(config.agents.stale_after_ms < config.agents.dead_after_ms);
        assert_eq!(config.reaper.interval_secs, 300);
        assert_eq!(config.gateway.rate_limit_per_minute, 100);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = BerthConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BerthConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.daemon.port, config.daemon.port);
        assert_eq!(back.messaging.subscriber_queue, config.messaging.subscriber_queue);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<DaemonConfig, _> =
            serde_json::from_str(r#"{"port": 9876, "prot": 1234}"#);
        assert!(result.is_err());
    }
}
