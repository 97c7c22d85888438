//! Server-sent event channel for reload notifications.
//!
//! Every subscriber gets its own `broadcast` receiver. Publishing never waits
//! on subscribers; a session that falls behind skips the missed events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::Request;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Event name used for reload notifications.
pub const RELOAD_EVENT: &str = "reload";

/// Events buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Message delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadEvent {
    /// SSE event name.
    pub event: String,
    /// SSE data, the aggregated `op:path;...` payload.
    pub data: String,
    /// Reconnect delay hint for the browser.
    pub retry: Option<Duration>,
}

impl ReloadEvent {
    /// A `reload` event carrying `payload`.
    pub fn reload(payload: impl Into<String>, retry: Option<Duration>) -> Self {
        Self {
            event: RELOAD_EVENT.to_owned(),
            data: payload.into(),
            retry,
        }
    }

    fn to_sse(&self) -> Event {
        // SSE field values may not contain carriage returns
        let mut event = Event::default()
            .event(self.event.replace(['\r', '\n'], ""))
            .data(self.data.replace('\r', ""));
        if let Some(retry) = self.retry {
            event = event.retry(retry);
        }
        event
    }
}

/// Why an event was not delivered.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Nobody is subscribed.
    #[error("no subscribers")]
    NoSubscribers(ReloadEvent),

    /// The channel was closed.
    #[error("channel closed")]
    Closed(ReloadEvent),
}

impl PublishError {
    /// The event that was not delivered.
    pub fn event(&self) -> &ReloadEvent {
        match self {
            Self::NoSubscribers(event) | Self::Closed(event) => event,
        }
    }
}

/// Broadcast channel with an SSE subscribe endpoint.
#[derive(Debug)]
pub struct EventChannel {
    sender: broadcast::Sender<ReloadEvent>,
    closed: CancellationToken,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    /// Create an open channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            closed: CancellationToken::new(),
        }
    }

    /// Send an event to every subscriber.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: ReloadEvent) -> Result<usize, PublishError> {
        if self.closed.is_cancelled() {
            return Err(PublishError::Closed(event));
        }
        self.sender
            .send(event)
            .map_err(|broadcast::error::SendError(event)| PublishError::NoSubscribers(event))
    }

    /// Receiver for in-process consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.sender.subscribe()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// End every open SSE session. Later publishes fail with
    /// [`PublishError::Closed`].
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Subscribe endpoint.
    ///
    /// `GET` requests accepting `text/event-stream` get an event stream;
    /// anything else is `404`.
    pub fn serve(&self, request: &Request) -> Response {
        if request.method() != Method::GET || !accepts_event_stream(request.headers()) {
            return not_found();
        }
        if self.is_closed() {
            return (StatusCode::SERVICE_UNAVAILABLE, "livereload: closed").into_response();
        }
        Sse::new(self.stream())
            .keep_alive(KeepAlive::default())
            .into_response()
    }

    fn stream(&self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        // Subscribe now so events published right after the handshake are kept
        let receiver = self.sender.subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok::<_, Infallible>(event.to_sse()), receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(target: "livereload", skipped, "Subscriber lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .take_until(self.closed.clone().cancelled_owned())
    }
}

/// Whether any `Accept` header lists `text/event-stream`.
pub fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|media| media.split(';').next())
        .any(|media| media.trim().eq_ignore_ascii_case("text/event-stream"))
}

/// Plain-text `404` for the subscribe path.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "livereload: not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use axum::http::header::CONTENT_TYPE;
    use pretty_assertions::assert_eq;

    fn request(method: Method, accept: Option<&'static str>) -> Request {
        let mut builder = Request::builder().method(method).uri("/livereload");
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn next_chunk(response: Response) -> String {
        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[test]
    fn test_accepts_event_stream() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_event_stream(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!accepts_event_stream(&headers));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html, text/event-stream;q=0.9"),
        );
        assert!(accepts_event_stream(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("TEXT/EVENT-STREAM"));
        assert!(accepts_event_stream(&headers));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let channel = EventChannel::new();

        let result = channel.publish(ReloadEvent::reload("write:/x", None));

        assert!(matches!(result, Err(PublishError::NoSubscribers(e)) if e.data == "write:/x"));
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let channel = EventChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        let reached = channel
            .publish(ReloadEvent::reload("write:/x", None))
            .unwrap();

        assert_eq!(reached, 2);
        assert_eq!(first.try_recv().unwrap().data, "write:/x");
        assert_eq!(second.try_recv().unwrap().data, "write:/x");
    }

    #[test]
    fn test_publish_after_close_fails() {
        let channel = EventChannel::new();
        let _receiver = channel.subscribe();
        channel.close();

        let result = channel.publish(ReloadEvent::reload("write:/x", None));

        assert!(matches!(result, Err(PublishError::Closed(_))));
    }

    #[test]
    fn test_serve_rejects_non_get() {
        let channel = EventChannel::new();

        let response = channel.serve(&request(Method::POST, Some("text/event-stream")));

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_serve_rejects_missing_accept() {
        let channel = EventChannel::new();

        let response = channel.serve(&request(Method::GET, None));

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_streams_published_events() {
        let channel = EventChannel::new();

        let response = channel.serve(&request(Method::GET, Some("text/event-stream")));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        assert_eq!(channel.subscriber_count(), 1);

        channel
            .publish(ReloadEvent::reload(
                "write:/a;create:/b",
                Some(Duration::from_millis(1000)),
            ))
            .unwrap();

        let chunk = next_chunk(response).await;
        assert!(chunk.contains("event: reload\n"), "chunk: {chunk:?}");
        assert!(chunk.contains("data: write:/a;create:/b\n"), "chunk: {chunk:?}");
        assert!(chunk.contains("retry: 1000\n"), "chunk: {chunk:?}");
    }

    #[tokio::test]
    async fn test_close_ends_open_streams() {
        let channel = EventChannel::new();
        let response = channel.serve(&request(Method::GET, Some("text/event-stream")));

        channel.close();

        let mut body = response.into_body().into_data_stream();
        assert!(body.next().await.is_none());
    }

    #[test]
    fn test_to_sse_strips_carriage_returns() {
        let event = ReloadEvent::reload("write:/a\r.txt", None);
        // Building the event must not panic on the invalid byte
        let _ = event.to_sse();
    }
}
