// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `berthd serve`: assembly and lifecycle of the daemon.
//!
//! Wires the store, kernel, broker, metrics, reaper, and gateway together,
//! installs the signal handler, and serves until shutdown. Store open and
//! schema migration failures abort startup.

use std::sync::Arc;
use std::time::Duration;

use berth_bus::Broker;
use berth_config::{validate_config, BerthConfig};
use berth_core::BerthError;
use berth_gateway::{GatewayState, HealthState, RateLimiter};
use berth_kernel::Kernel;
use berth_metrics::MetricsHandle;
use berth_store::Database;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::shutdown;

/// Runs the `berthd serve` command.
pub async fn run_serve(config: BerthConfig) -> Result<(), BerthError> {
    init_tracing(&config.daemon.log_level);

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            warn!("config: {error}");
        }
        return Err(BerthError::Config(errors.join("; ")));
    }

    info!(
        database = config.storage.database_path.as_str(),
        bind = config.daemon.bind.as_str(),
        port = config.daemon.port,
        "starting berthd"
    );

    // Fatal on failure: a daemon without its store is nothing.
    let db = Arc::new(Database::open(&config.storage.database_path).await?);

    let kernel = Arc::new(Kernel::new(db.clone(), &config));
    let broker = Arc::new(Broker::new(
        db.clone(),
        config.messaging.clone(),
        kernel.activity.clone(),
    ));

    // Metrics recorder; non-fatal when a recorder is already installed.
    let prometheus_render = match MetricsHandle::install() {
        Ok(handle) => {
            let handle = Arc::new(handle);
            Some(Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>)
        }
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let cancel = shutdown::install_signal_handler();

    // Background reaper.
    {
        let reaper = kernel.reaper.clone();
        let interval = Duration::from_secs(config.reaper.interval_secs);
        let reaper_cancel = cancel.clone();
        tokio::spawn(reaper.run(interval, reaper_cancel));
        info!(interval_secs = config.reaper.interval_secs, "reaper started");
    }

    // Memory monitor.
    {
        let warn_mb = config.daemon.memory_warn_mb;
        let monitor_cancel = cancel.clone();
        tokio::spawn(async move {
            memory_monitor(warn_mb, monitor_cancel).await;
        });
    }

    let state = GatewayState {
        kernel,
        broker,
        limiter: Arc::new(RateLimiter::new(config.gateway.rate_limit_per_minute)),
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
        config: Arc::new(config),
    };

    berth_gateway::serve(state, cancel).await?;

    info!("berthd shutdown complete");
    Ok(())
}

/// Background task exporting jemalloc heap gauges and logging pressure
/// above the configured threshold.
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(warn_mb: u64, cancel: CancellationToken) {
    let warn_bytes = warn_mb as usize * 1024 * 1024;
    let mut interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);

                berth_metrics::set_memory_heap(allocated as f64);
                berth_metrics::set_memory_resident(resident as f64);

                if allocated > warn_bytes {
                    warn!(
                        allocated_mb = allocated / (1024 * 1024),
                        threshold_mb = warn_mb,
                        "memory pressure: heap above warning threshold"
                    );
                }
            }
            _ = cancel.cancelled() => {
                info!("memory monitor shutting down");
                break;
            }
        }
    }
}

/// Stub memory monitor for MSVC (no jemalloc).
#[cfg(target_env = "msvc")]
async fn memory_monitor(_warn_mb: u64, cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("berth={log_level},berthd={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
