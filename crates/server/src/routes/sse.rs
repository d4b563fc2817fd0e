use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Live event stream. The first frame is always `connection:ack`; each
/// broadcast after that is one `data:` frame carrying the event JSON.
pub async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (rx, handle) = state.event_bus.subscribe().into_parts();
    tracing::debug!(client_id = handle.id(), "SSE client connected");

    // The handle unregisters the client when the response stream is dropped.
    let stream = ReceiverStream::new(rx).map(move |payload| {
        let _registration = &handle;
        Ok(Event::default().data(payload))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
