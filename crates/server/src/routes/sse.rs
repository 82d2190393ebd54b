//! Progress projector: one ordered push stream per observer.
//!
//! A connecting client first receives a synthetic `connected` event, then a
//! `snapshot` of the run from the store, then the live tail from the bus.
//! The subscription is opened before the snapshot is read, so no event can
//! fall between them; live events whose sequence is at or below the bus
//! sequence observed at snapshot time are already reflected in the snapshot
//! and are dropped. The stream ends after a terminal event, or immediately
//! after the snapshot when the run is already terminal.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use events::EventEnvelope;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn envelope_to_sse_event(envelope: &EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.seq.to_string())
        .event(envelope.event.kind())
        .data(data))
}

/// Live tail for one run: filters the bus down to the run id, drops events
/// already covered by the snapshot, and ends after a terminal event.
fn run_event_stream(
    rx: broadcast::Receiver<EventEnvelope>,
    run_id: Uuid,
    cutoff: u64,
    already_terminal: bool,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((rx, already_terminal), move |(mut rx, done)| async move {
        if done {
            return None;
        }
        loop {
            match rx.recv().await {
                Ok(envelope) if envelope.run_id == run_id && envelope.seq > cutoff => {
                    let terminal = envelope.event.is_terminal();
                    return Some((envelope_to_sse_event(&envelope), (rx, terminal)));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(run_id = %run_id, skipped, "SSE subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

#[utoipa::path(
    get,
    path = "/api/scans/{id}/events",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "SSE progress stream"),
        (status = 404, description = "Run not found"),
    ),
    tag = "scans"
)]
pub async fn scan_events_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe first: anything published while we read the snapshot is
    // buffered, so connect-time state and live tail leave no gap.
    let rx = state.bus.subscribe();
    let snapshot = state.service.snapshot(id).await?;
    let cutoff = state.bus.last_seq(id);
    let terminal = snapshot.status.is_terminal();

    let connected = Event::default().event("connected").data(id.to_string());
    let snapshot_event = Event::default()
        .event("snapshot")
        .data(serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string()));

    let head = stream::iter(vec![Ok(connected), Ok(snapshot_event)]);
    let stream = head.chain(run_event_stream(rx, id, cutoff, terminal));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}
