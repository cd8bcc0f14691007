//! Run event streaming over server-sent events.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{Stream, StreamExt};
use tracing::{debug, warn};

use agentrun_core::{RunId, StreamId};

use crate::http::{ApiError, Caller};
use crate::relay;
use crate::state::AppState;

const LAST_EVENT_ID: &str = "last-event-id";

/// Stream a run's events as SSE.
///
/// Each session replays stored events, then tails live ones until the run
/// finishes or the session budget runs out. Reconnecting clients send
/// `Last-Event-ID` and only receive what they have not seen.
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(run_id): Path<RunId>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    state.run_service.get(&run_id, &user_id).await?;

    let resume_after = match headers.get(LAST_EVENT_ID) {
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::bad_request("Last-Event-ID is not valid text"))?;
            let id = raw
                .parse::<StreamId>()
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            Some(id)
        }
        None => None,
    };

    debug!(run_id = %run_id, resume_after = ?resume_after, "Event stream session opened");

    let events = relay::session(
        state.broker.clone(),
        state.runs.clone(),
        run_id.clone(),
        resume_after,
        state.relay.clone(),
    )
    .map(move |message| {
        Event::default()
            .id(message.id.to_string())
            .event(message.data.event_type().as_str())
            .json_data(&message.data)
            .map_err(|e| {
                warn!(run_id = %run_id, error = %e, "Failed to encode event");
                e
            })
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
