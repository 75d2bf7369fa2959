// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `berthd status`: probe a running daemon over its own HTTP surface.

use berth_config::BerthConfig;
use berth_core::BerthError;

/// Hit `GET /health` on the configured bind address and report the result.
pub async fn run_status(config: &BerthConfig) -> Result<(), BerthError> {
    let url = format!(
        "http://{}:{}/health",
        config.daemon.bind, config.daemon.port
    );
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()
        .map_err(|e| BerthError::Internal(format!("http client: {e}")))?;

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| BerthError::Internal(format!("unparsable health body: {e}")))?;
            println!(
                "berthd ok: version {}, up {}s",
                body.get("version").and_then(|v| v.as_str()).unwrap_or("?"),
                body.get("uptimeSecs").and_then(|v| v.as_u64()).unwrap_or(0),
            );
            Ok(())
        }
        Ok(response) => Err(BerthError::Internal(format!(
            "daemon answered {} at {url}",
            response.status()
        ))),
        Err(e) => Err(BerthError::Internal(format!(
            "no daemon reachable at {url}: {e}"
        ))),
    }
}
