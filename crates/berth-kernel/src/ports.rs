// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port assignment and service registry.
//!
//! Same name, same port: a claim for an identity whose owning pid is still
//! alive always returns the existing assignment. Stale assignments (dead
//! pid) are reclaimed transparently. The free-port search is preferred-port
//! first, then a range scan skipping database rows, OS-busy ports, and the
//! reserved set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use berth_config::model::PortsConfig;
use berth_core::{now_ms, BerthError, Identity, IdentityPattern};
use berth_store::queries::services;
use berth_store::{Database, ServiceRow};
use serde::Serialize;
use tracing::{debug, info};

use crate::activity::ActivityLog;
use crate::probe::{pid_alive, PortProbe};

/// Caller-tunable knobs on a claim.
#[derive(Debug, Clone, Default)]
pub struct ClaimOptions {
    pub preferred_port: Option<u16>,
    /// Overrides the configured scan range for this claim only.
    pub range: Option<(u16, u16)>,
    /// Milliseconds from now until the assignment expires.
    pub expires_ms: Option<i64>,
    pub pid: Option<i64>,
    pub health_path: Option<String>,
}

/// Result of a claim.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub port: u16,
    pub existing: bool,
}

/// Port assignment service.
pub struct PortRegistry {
    db: Arc<Database>,
    config: PortsConfig,
    probe: PortProbe,
    activity: Arc<ActivityLog>,
}

impl PortRegistry {
    pub fn new(db: Arc<Database>, config: PortsConfig, activity: Arc<ActivityLog>) -> Self {
        let probe = PortProbe::new(Duration::from_millis(config.probe_cache_ms));
        Self {
            db,
            config,
            probe,
            activity,
        }
    }

    /// Claim a port for an identity.
    ///
    /// Idempotent while the owning pid is alive; reclaims and reassigns when
    /// it is not. Two concurrent claimers for one identity are serialized by
    /// the unique constraint: the loser observes the winner's row and
    /// returns `existing: true`.
    pub async fn claim(
        &self,
        identity: &Identity,
        opts: ClaimOptions,
    ) -> Result<ClaimOutcome, BerthError> {
        let now = now_ms();

        if let Some(existing) = services::get_by_identity(&self.db, identity.as_str()).await? {
            let alive = existing.pid.map(pid_alive).unwrap_or(true);
            if alive {
                services::touch_last_seen(&self.db, identity.as_str(), now).await?;
                return Ok(ClaimOutcome {
                    port: existing.port,
                    existing: true,
                });
            }
            debug!(
                identity = identity.as_str(),
                pid = existing.pid,
                "reclaiming assignment from dead pid"
            );
            services::delete_by_identities(&self.db, vec![identity.as_str().to_string()]).await?;
        }

        let (range_start, range_end) = opts.range.unwrap_or((
            self.config.range_start,
            self.config.range_end,
        ));
        if range_start < 1024 || range_start > range_end {
            return Err(BerthError::validation(format!(
                "invalid port range [{range_start}, {range_end}]"
            )));
        }

        let used: HashSet<u16> = services::used_ports(&self.db).await?.into_iter().collect();
        let reserved: HashSet<u16> = self.config.reserved.iter().copied().collect();

        let preferred = opts.preferred_port.filter(|p| !used.contains(p));
        let candidates = preferred
            .into_iter()
            .chain((range_start..=range_end).filter(|p| Some(*p) != opts.preferred_port));

        let mut collisions = 0u32;
        for candidate in candidates {
            if reserved.contains(&candidate) || used.contains(&candidate) {
                continue;
            }
            if self.probe.is_busy(candidate) {
                continue;
            }

            let row = ServiceRow {
                identity: identity.as_str().to_string(),
                port: candidate,
                pid: opts.pid,
                claimed_at: now,
                last_seen: now,
                expires_at: opts.expires_ms.map(|ms| now + ms),
                health_path: opts.health_path.clone(),
                endpoints: serde_json::Map::new(),
            };
            if services::try_insert(&self.db, &row).await? {
                info!(identity = identity.as_str(), port = candidate, "port claimed");
                self.activity
                    .record(
                        "service",
                        "claim",
                        Some(identity.as_str()),
                        Some(serde_json::json!({ "port": candidate })),
                        None,
                    )
                    .await;
                return Ok(ClaimOutcome {
                    port: candidate,
                    existing: false,
                });
            }

            // Lost a race. If the winner claimed our identity, return its
            // port; otherwise it was a port collision and the scan continues.
            if let Some(winner) =
                services::get_by_identity(&self.db, identity.as_str()).await?
            {
                return Ok(ClaimOutcome {
                    port: winner.port,
                    existing: true,
                });
            }
            collisions += 1;
            metrics::counter!("berth_claim_retries_total").increment(1);
            if collisions >= self.config.claim_retries {
                return Err(BerthError::Transient(format!(
                    "claim for {identity} lost {collisions} insert races; retry"
                )));
            }
        }

        Err(BerthError::Transient(format!(
            "no free port in [{range_start}, {range_end}] for {identity}"
        )))
    }

    /// Release assignments matching an identity or pattern. Returns the
    /// count removed; releasing nothing is a successful no-op.
    pub async fn release(&self, pattern: &IdentityPattern) -> Result<u64, BerthError> {
        let matching: Vec<String> = services::list_all(&self.db)
            .await?
            .into_iter()
            .filter(|row| pattern.matches_str(&row.identity))
            .map(|row| row.identity)
            .collect();
        if matching.is_empty() {
            return Ok(0);
        }
        let removed = services::delete_by_identities(&self.db, matching.clone()).await?;
        self.activity
            .record(
                "service",
                "release",
                None,
                Some(serde_json::json!({ "identities": matching })),
                None,
            )
            .await;
        Ok(removed)
    }

    /// Sweep assignments whose expiry has passed.
    pub async fn release_expired(&self) -> Result<u64, BerthError> {
        let removed = services::delete_expired(&self.db, now_ms()).await?;
        if removed > 0 {
            self.activity
                .record(
                    "service",
                    "release_expired",
                    None,
                    Some(serde_json::json!({ "removed": removed })),
                    None,
                )
                .await;
        }
        Ok(removed)
    }

    /// Query assignments, optionally narrowed by a wildcard pattern.
    pub async fn list(
        &self,
        pattern: Option<&IdentityPattern>,
    ) -> Result<Vec<ServiceRow>, BerthError> {
        let all = services::list_all(&self.db).await?;
        Ok(match pattern {
            Some(pattern) => all
                .into_iter()
                .filter(|row| pattern.matches_str(&row.identity))
                .collect(),
            None => all,
        })
    }

    /// Fetch one assignment by exact identity.
    pub async fn get(&self, identity: &Identity) -> Result<ServiceRow, BerthError> {
        services::get_by_identity(&self.db, identity.as_str())
            .await?
            .ok_or_else(|| BerthError::not_found("service", identity.as_str()))
    }

    /// Merge an `env -> url` pair into a service's endpoint map.
    pub async fn set_endpoint(
        &self,
        identity: &Identity,
        env: &str,
        url: &str,
    ) -> Result<(), BerthError> {
        let found = services::merge_endpoint(&self.db, identity.as_str(), env, url).await?;
        if !found {
            return Err(BerthError::not_found("service", identity.as_str()));
        }
        self.activity
            .record(
                "service",
                "set_endpoint",
                Some(identity.as_str()),
                Some(serde_json::json!({ "env": env, "url": url })),
                None,
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (PortRegistry, Arc<Database>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let activity = Arc::new(ActivityLog::new(db.clone()));
        let config = PortsConfig {
            range_start: 42000,
            range_end: 42063,
            reserved: vec![42001],
            probe_cache_ms: 2000,
            claim_retries: 5,
        };
        let registry = PortRegistry::new(db.clone(), config, activity);
        (registry, db, dir)
    }

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[tokio::test]
    async fn claim_is_idempotent_for_live_pid() {
        let (registry, _db, _dir) = setup().await;
        let me = std::process::id() as i64;

        let first = registry
            .claim(
                &id("myapp:api"),
                ClaimOptions {
                    pid: Some(me),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!first.existing);

        let second = registry
            .claim(
                &id("myapp:api"),
                ClaimOptions {
                    pid: Some(me),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(second.existing);
        assert_eq!(second.port, first.port);
    }

    #[tokio::test]
    async fn dead_pid_assignment_is_reclaimed() {
        let (registry, _db, _dir) = setup().await;

        // i32::MAX is effectively never a live pid on Linux (pid_max caps far lower).
        let first = registry
            .claim(
                &id("myapp:web"),
                ClaimOptions {
                    pid: Some(i32::MAX as i64),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!first.existing);

        let second = registry
            .claim(&id("myapp:web"), ClaimOptions::default())
            .await
            .unwrap();
        assert!(!second.existing, "stale row reclaimed, fresh claim");
    }

    #[tokio::test]
    async fn preferred_port_wins_when_free() {
        let (registry, _db, _dir) = setup().await;
        let outcome = registry
            .claim(
                &id("a"),
                ClaimOptions {
                    preferred_port: Some(42042),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.port, 42042);
    }

    #[tokio::test]
    async fn reserved_and_taken_ports_are_skipped() {
        let (registry, _db, _dir) = setup().await;
        let a = registry.claim(&id("a"), ClaimOptions::default()).await.unwrap();
        let b = registry.claim(&id("b"), ClaimOptions::default()).await.unwrap();
        assert_ne!(a.port, b.port);
        assert_ne!(a.port, 42001);
        assert_ne!(b.port, 42001);
    }

    #[tokio::test]
    async fn no_two_identities_share_a_port() {
        let (registry, _db, _dir) = setup().await;
        let mut seen = std::collections::HashSet::new();
        for i in 0..8 {
            let outcome = registry
                .claim(&id(&format!("svc{i}")), ClaimOptions::default())
                .await
                .unwrap();
            assert!(seen.insert(outcome.port), "port {} assigned twice", outcome.port);
        }
    }

    #[tokio::test]
    async fn release_by_pattern() {
        let (registry, _db, _dir) = setup().await;
        registry.claim(&id("myapp:api"), ClaimOptions::default()).await.unwrap();
        registry.claim(&id("myapp:web"), ClaimOptions::default()).await.unwrap();
        registry.claim(&id("other"), ClaimOptions::default()).await.unwrap();

        let removed = registry
            .release(&IdentityPattern::parse("myapp:*").unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(registry.list(None).await.unwrap().len(), 1);

        // Releasing again is a successful no-op.
        let removed = registry
            .release(&IdentityPattern::parse("myapp:*").unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn endpoints_merge_and_surface_in_get() {
        let (registry, _db, _dir) = setup().await;
        registry.claim(&id("myapp:api"), ClaimOptions::default()).await.unwrap();

        registry
            .set_endpoint(&id("myapp:api"), "local", "http://127.0.0.1:42000")
            .await
            .unwrap();
        registry
            .set_endpoint(&id("myapp:api"), "tunnel", "https://t.example.com")
            .await
            .unwrap();

        let row = registry.get(&id("myapp:api")).await.unwrap();
        assert_eq!(row.endpoints.len(), 2);

        let missing = registry
            .set_endpoint(&id("nope"), "local", "http://x")
            .await;
        assert!(matches!(missing, Err(BerthError::NotFound { .. })));
    }
}
