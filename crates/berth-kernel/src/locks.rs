// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leased mutual exclusion keyed by name.
//!
//! Acquire never blocks server-side: contention is reported to the caller
//! with the current holder and expiry, and the caller decides whether to
//! poll. Expired rows are swept lazily at list time and by the reaper.

use std::sync::Arc;

use berth_config::model::LocksConfig;
use berth_core::{now_ms, BerthError};
use berth_store::queries::locks as locks_q;
use berth_store::{Database, LockRow};
use serde::Serialize;
use tracing::debug;

use crate::activity::ActivityLog;

/// Result of an acquire attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum AcquireOutcome {
    Acquired { lock: LockRow },
    Held { holder: LockRow },
}

/// Lock service.
pub struct LockService {
    db: Arc<Database>,
    config: LocksConfig,
    activity: Arc<ActivityLog>,
}

impl LockService {
    pub fn new(db: Arc<Database>, config: LocksConfig, activity: Arc<ActivityLog>) -> Self {
        Self {
            db,
            config,
            activity,
        }
    }

    fn check_ttl(&self, ttl_ms: Option<i64>) -> Result<Option<i64>, BerthError> {
        let ttl = ttl_ms.or(self.config.default_ttl_ms);
        if let Some(ttl) = ttl {
            if ttl < 1 || ttl > self.config.max_ttl_ms {
                return Err(BerthError::validation(format!(
                    "ttl must be in [1, {}] ms, got {ttl}",
                    self.config.max_ttl_ms
                )));
            }
        }
        Ok(ttl)
    }

    fn resolve_owner(owner: Option<String>, pid: Option<i64>) -> String {
        owner
            .filter(|o| !o.is_empty())
            .or_else(|| pid.map(|p| p.to_string()))
            .unwrap_or_else(|| "anonymous".to_string())
    }

    /// Insert a lock row iff no unexpired row exists for the name.
    pub async fn acquire(
        &self,
        name: &str,
        owner: Option<String>,
        ttl_ms: Option<i64>,
        pid: Option<i64>,
    ) -> Result<AcquireOutcome, BerthError> {
        let ttl = self.check_ttl(ttl_ms)?;
        let now = now_ms();
        let owner = Self::resolve_owner(owner, pid);
        let candidate = LockRow {
            name: name.to_string(),
            owner: owner.clone(),
            acquired_at: now,
            expires_at: ttl.map(|t| now + t),
            pid,
        };

        match locks_q::try_acquire(&self.db, &candidate).await? {
            None => {
                self.activity
                    .record("lock", "acquire", Some(name), None, Some(&owner))
                    .await;
                Ok(AcquireOutcome::Acquired { lock: candidate })
            }
            Some(holder) => {
                debug!(name, holder = holder.owner.as_str(), "lock held");
                Ok(AcquireOutcome::Held { holder })
            }
        }
    }

    /// Push the lease forward. Requires a matching owner unless forced.
    pub async fn extend(
        &self,
        name: &str,
        owner: Option<String>,
        ttl_ms: i64,
        force: bool,
    ) -> Result<LockRow, BerthError> {
        let ttl = self
            .check_ttl(Some(ttl_ms))?
            .unwrap_or(self.config.max_ttl_ms);
        let now = now_ms();

        let current = locks_q::get(&self.db, name)
            .await?
            .filter(|lock| lock.expires_at.map(|e| e > now).unwrap_or(true))
            .ok_or_else(|| BerthError::not_found("lock", name))?;

        if !force {
            let owner = owner.unwrap_or_default();
            if owner != current.owner {
                return Err(BerthError::Conflict {
                    message: format!("lock {name} is owned by {}", current.owner),
                    detail: Some(serde_json::json!({
                        "holder": current.owner,
                        "expiresAt": current.expires_at,
                    })),
                });
            }
        }

        let expires_at = Some(now + ttl);
        locks_q::update_expiry(&self.db, name, expires_at).await?;
        self.activity
            .record("lock", "extend", Some(name), None, Some(&current.owner))
            .await;
        Ok(LockRow {
            expires_at,
            ..current
        })
    }

    /// Release the lock. Returns `false` (not an error) when nothing was
    /// held; an owner mismatch without force is a conflict.
    pub async fn release(
        &self,
        name: &str,
        owner: Option<String>,
        force: bool,
    ) -> Result<bool, BerthError> {
        let now = now_ms();
        let current = locks_q::get(&self.db, name).await?;
        let Some(current) = current else {
            return Ok(false);
        };
        let expired = current.expires_at.map(|e| e <= now).unwrap_or(false);

        if !force && !expired {
            let owner = owner.unwrap_or_default();
            if owner != current.owner {
                return Err(BerthError::Conflict {
                    message: format!("lock {name} is owned by {}", current.owner),
                    detail: Some(serde_json::json!({
                        "holder": current.owner,
                        "expiresAt": current.expires_at,
                    })),
                });
            }
        }

        let removed = locks_q::delete(&self.db, name, None).await?;
        if removed && !expired {
            self.activity
                .record("lock", "release", Some(name), None, Some(&current.owner))
                .await;
        }
        // Deleting an already-expired row is a successful no-op for the caller.
        Ok(removed && !expired)
    }

    /// Non-mutating read. Expired locks read as absent.
    pub async fn check(&self, name: &str) -> Result<Option<LockRow>, BerthError> {
        let now = now_ms();
        Ok(locks_q::get(&self.db, name)
            .await?
            .filter(|lock| lock.expires_at.map(|e| e > now).unwrap_or(true)))
    }

    /// Unexpired locks, optionally filtered by owner. Sweeps expired rows.
    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<LockRow>, BerthError> {
        locks_q::sweep_and_list(&self.db, now_ms(), owner).await
    }
}
