//! Server-Sent Events for audit progress streaming

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// Query parameters for the event stream
#[derive(Debug, Deserialize)]
pub struct EventStreamQuery {
    /// Restrict the stream to one analysis
    #[serde(default)]
    pub analysis_id: Option<Uuid>,
}

/// GET /api/events - SSE stream of audit lifecycle events
///
/// Streams events:
/// - AuditStarted
/// - StageStarted / StageCompleted / StageFailed
/// - AuditCompleted
/// - AuditFailed
/// - AuditCancelled
///
/// With `?analysis_id=<uuid>` only events for that analysis are sent.
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(filter = ?query.analysis_id, "New SSE client connected to audit events");

    let mut rx = state.event_bus.subscribe();
    let filter = query.analysis_id;

    let stream = async_stream::stream! {
        info!("SSE: Audit event stream started");

        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                // Broadcast events
                Ok(event) = rx.recv() => {
                    if let Some(analysis_id) = filter {
                        if event.analysis_id() != analysis_id {
                            continue;
                        }
                    }

                    let event_type = event.event_type().to_string();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default()
                                .event(event_type)
                                .data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
