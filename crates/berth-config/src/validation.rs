// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as range ordering and threshold ordering.

use crate::model::BerthConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err` with all collected
/// validation messages (does not fail fast).
pub fn validate_config(config: &BerthConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.daemon.bind.trim().is_empty() {
        errors.push("daemon.bind must not be empty".to_string());
    } else {
        let addr = config.daemon.bind.trim();
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(format!(
                "daemon.bind `{addr}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push("storage.database_path must not be empty".to_string());
    }

    if config.ports.range_start < 1024 {
        errors.push(format!(
            "ports.range_start must be >= 1024, got {}",
            config.ports.range_start
        ));
    }

    if config.ports.range_start > config.ports.range_end {
        errors.push(format!(
            "ports.range_start ({}) must not exceed ports.range_end ({})",
            config.ports.range_start, config.ports.range_end
        ));
    }

    if config.ports.claim_retries == 0 {
        errors.push("ports.claim_retries must be at least 1".to_string());
    }

    if let Some(ttl) = config.locks.default_ttl_ms {
        if ttl < 1 || ttl > config.locks.max_ttl_ms {
            errors.push(format!(
                "locks.default_ttl_ms must be in [1, {}], got {ttl}",
                config.locks.max_ttl_ms
            ));
        }
    }

    if config.locks.max_ttl_ms < 1 {
        errors.push(format!(
            "locks.max_ttl_ms must be positive, got {}",
            config.locks.max_ttl_ms
        ));
    }

    if config.messaging.history_max_per_channel < 1 {
        errors.push(format!(
            "messaging.history_max_per_channel must be at least 1, got {}",
            config.messaging.history_max_per_channel
        ));
    }

    if config.messaging.subscriber_queue < 2 {
        errors.push(format!(
            "messaging.subscriber_queue must be at least 2, got {}",
            config.messaging.subscriber_queue
        ));
    }

    if config.messaging.max_streams_per_source == 0 {
        errors.push("messaging.max_streams_per_source must be at least 1".to_string());
    }

    if config.agents.stale_after_ms >= config.agents.dead_after_ms {
        errors.push(format!(
            "agents.stale_after_ms ({}) must be below agents.dead_after_ms ({})",
            config.agents.stale_after_ms, config.agents.dead_after_ms
        ));
    }

    if config.agents.stale_after_ms < 1 {
        errors.push("agents.stale_after_ms must be positive".to_string());
    }

    if config.salvage.notes_per_session < 0 {
        errors.push(format!(
            "salvage.notes_per_session must be non-negative, got {}",
            config.salvage.notes_per_session
        ));
    }

    if config.reaper.interval_secs == 0 {
        errors.push("reaper.interval_secs must be at least 1".to_string());
    }

    if config.gateway.rate_limit_per_minute == 0 {
        errors.push("gateway.rate_limit_per_minute must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&BerthConfig::default()).is_ok());
    }

    #[test]
    fn inverted_port_range_is_rejected() {
        let mut config = BerthConfig::default();
        config.ports.range_start = 5000;
        config.ports.range_end = 4000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("range_start")));
    }

    #[test]
    fn inverted_staleness_thresholds_are_rejected() {
        let mut config = BerthConfig::default();
        config.agents.stale_after_ms = 1_200_000;
        config.agents.dead_after_ms = 600_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = BerthConfig::default();
        config.daemon.bind = String::new();
        config.reaper.interval_secs = 0;
        config.gateway.rate_limit_per_minute = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3, "expected all failures reported, got {errors:?}");
    }

    #[test]
    fn privileged_range_start_is_rejected() {
        let mut config = BerthConfig::default();
        config.ports.range_start = 80;
        assert!(validate_config(&config).is_err());
    }
}
