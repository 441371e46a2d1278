//! Server-Sent Events framing for pipeline streams.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use datastory_agents::{StreamEvent, DONE_EVENT};
use futures_util::stream::{Stream, StreamExt};

/// One pipeline event as an SSE event; the sentinel becomes `event: done` with an empty object.
pub fn to_event(event: &StreamEvent) -> Event {
    match event.data() {
        Some(body) => Event::default().data(body.to_string()),
        None => Event::default().event(DONE_EVENT).data("{}"),
    }
}

pub fn sse_response<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let stream = events.map(|event| Ok(to_event(&event)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
