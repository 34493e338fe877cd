use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamFilter {
    /// Only events keyed by this PNR (or chart key).
    pub key: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/events", get(stream_events))
}

async fn stream_events(
    State(state): State<AppState>,
    Query(filter): Query<StreamFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let wanted = filter.key.clone();
        async move {
            // Lagged receivers skip what they missed.
            let event = result.ok()?;
            if wanted.is_some_and(|key| key != event.key()) {
                return None;
            }
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().event(event.name()).data(data)))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
