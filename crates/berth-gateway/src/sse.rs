// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE subscription streams.
//!
//! `GET /subscribe/:channel` opens a `text/event-stream` keyed by one
//! channel (wildcard matching is a client concern). The first frame is a
//! heartbeat; each publication follows as a `data: <json>` event. The
//! stream closes on client disconnect, server shutdown, or slow-consumer
//! eviction. Keep-alive comments flow every 15 seconds.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;

use berth_bus::{BusFrame, Subscription};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::{check_channel, Source};

/// GET /subscribe/:channel
pub async fn subscribe(
    State(state): State<GatewayState>,
    Path(channel): Path<String>,
    source: Source,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    check_channel(&channel)?;
    let subscription = state.broker.subscribe(&channel, &source.0.to_string())?;

    let stream = futures::stream::unfold(subscription, |mut sub: Subscription| async move {
        let frame = sub.recv().await?;
        Some((Ok(frame_to_event(frame)), sub))
    })
    .boxed();

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn frame_to_event(frame: BusFrame) -> Event {
    match frame {
        BusFrame::Heartbeat => Event::default().event("heartbeat").data("{}"),
        BusFrame::Message(row) => {
            let json = serde_json::to_string(&row)
                .unwrap_or_else(|_| r#"{"error":"unserializable message"}"#.to_string());
            Event::default().data(json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_store::MessageRow;

    #[test]
    fn message_frames_are_data_only_json() {
        let event = frame_to_event(BusFrame::Message(MessageRow {
            id: 7,
            channel: "builds".to_string(),
            payload: r#"{"s":1}"#.to_string(),
            sender: None,
            created_at: 100,
        }));
        let rendered = format!("{event:?}");
        assert!(rendered.contains("builds"));
    }
}
