//! In-memory response capture.
//!
//! The downstream handler runs to completion and its body is collected
//! before anything reaches the client, so the status, headers and body can
//! still be changed. [`BufferedResponse::flush`] consumes the buffer, which
//! makes a second flush impossible.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode, response::Parts};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use super::logger::Logger;

/// Result of running the downstream handler.
pub enum Capture {
    /// Status, headers and full body held in memory.
    Buffered(BufferedResponse),
    /// Streaming response that must reach the client untouched.
    Passthrough(Response),
}

/// A response held in memory until it is flushed.
#[derive(Debug)]
pub struct BufferedResponse {
    parts: Parts,
    body: Vec<u8>,
}

impl BufferedResponse {
    /// Run `downstream` and collect its response.
    ///
    /// A panicking handler becomes `500 Internal Server Error` and an
    /// unreadable body becomes `502 Bad Gateway`, both logged at error level.
    /// Event streams are returned as [`Capture::Passthrough`].
    pub async fn capture<F>(downstream: F, logger: &dyn Logger) -> Capture
    where
        F: Future<Output = Response>,
    {
        let response = match AssertUnwindSafe(downstream).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                logger.error(
                    "livereload: handler panicked",
                    &[("panic", &panic_message(panic.as_ref()))],
                );
                return Capture::Buffered(Self::plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                ));
            }
        };

        if is_event_stream(response.headers()) {
            return Capture::Passthrough(response);
        }

        let (parts, body) = response.into_parts();
        match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => Capture::Buffered(Self {
                parts,
                body: Vec::from(bytes),
            }),
            Err(err) => {
                logger.error(
                    "livereload: failed to read response body",
                    &[("error", &err), ("status", &parts.status)],
                );
                Capture::Buffered(Self::plain(StatusCode::BAD_GATEWAY, "Bad Gateway"))
            }
        }
    }

    /// Buffer a plain-text response.
    fn plain(status: StatusCode, message: &'static str) -> Self {
        let (mut parts, ()) = Response::new(()).into_parts();
        parts.status = status;
        parts.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            parts,
            body: message.as_bytes().to_vec(),
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    /// Replace the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.parts.status = status;
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Mutable response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// Body bytes collected so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Append bytes to the body.
    pub fn append(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Replace the body, returning the previous one.
    pub fn replace_body(&mut self, body: Vec<u8>) -> Vec<u8> {
        std::mem::replace(&mut self.body, body)
    }

    /// Send the buffered response.
    ///
    /// A `Content-Length` header, if present, is corrected to the final
    /// body length.
    pub fn flush(mut self) -> Response {
        if self.parts.headers.contains_key(CONTENT_LENGTH) {
            self.parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        Response::from_parts(self.parts, Body::from(self.body))
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        self.flush()
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
