// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./berthd.toml` > `~/.config/berthd/berthd.toml`
//! > `/etc/berthd/berthd.toml` with environment variable overrides via the
//! `BERTHD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BerthConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/berthd/berthd.toml` (system-wide)
/// 3. `~/.config/berthd/berthd.toml` (user XDG config)
/// 4. `./berthd.toml` (local directory)
/// 5. `BERTHD_*` environment variables
pub fn load_config() -> Result<BerthConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BerthConfig::default()))
        .merge(Toml::file("/etc/berthd/berthd.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("berthd/berthd.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("berthd.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<BerthConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BerthConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BerthConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BerthConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `BERTHD_PORTS_RANGE_START` must map to
/// `ports.range_start`, not `ports.range.start`.
fn env_provider() -> Env {
    Env::prefixed("BERTHD_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: BERTHD_STORAGE_DATABASE_PATH -> "storage_database_path"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("daemon_", "daemon.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("ports_", "ports.", 1)
            .replacen("locks_", "locks.", 1)
            .replacen("messaging_", "messaging.", 1)
            .replacen("agents_", "agents.", 1)
            .replacen("salvage_", "salvage.", 1)
            .replacen("activity_", "activity.", 1)
            .replacen("reaper_", "reaper.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.daemon.port, 9876);
        assert_eq!(config.ports.range_start, 4000);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [daemon]
            port = 7777

            [ports]
            range_start = 5000
            range_end = 5100
            "#,
        )
        .unwrap();
        assert_eq!(config.daemon.port, 7777);
        assert_eq!(config.ports.range_start, 5000);
        assert_eq!(config.ports.range_end, 5100);
        // Untouched sections keep defaults.
        assert_eq!(config.reaper.interval_secs, 300);
    }

    #[test]
    fn unknown_section_key_is_an_error() {
        let result = load_config_from_str(
            r#"
            [daemon]
            prot = 1234
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn env_var_mapping_hits_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BERTHD_DAEMON_PORT", "6001");
            jail.set_env("BERTHD_PORTS_RANGE_START", "6100");
            jail.set_env("BERTHD_STORAGE_DATABASE_PATH", "/tmp/test-berth.db");
            let config: BerthConfig = Figment::new()
                .merge(Serialized::defaults(BerthConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.daemon.port, 6001);
            assert_eq!(config.ports.range_start, 6100);
            assert_eq!(config.storage.database_path, "/tmp/test-berth.db");
            Ok(())
        });
    }
}
