// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the berth daemon.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text format via [`MetricsHandle::render`], which
//! the gateway exposes through `GET /metrics`.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use recording::{record_http_request, register_metrics, set_memory_heap, set_memory_resident};

#[derive(Debug, Error)]
pub enum MetricsError {
    /// Only one recorder can be installed per process.
    #[error("failed to install Prometheus recorder: {0}")]
    Install(String),
}

/// Handle to the installed Prometheus recorder.
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Install the Prometheus recorder globally and register metric
    /// descriptions. Returns an error if a recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
