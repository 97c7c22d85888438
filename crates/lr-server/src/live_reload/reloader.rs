//! Reload service.
//!
//! Ties the pieces together: the middleware that injects the client script
//! and exposes the subscribe endpoint, the watch loop that turns change
//! batches into notifications, and the standalone listener.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, EXPIRES, HOST, LAST_MODIFIED, PRAGMA,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lr_watch::{BatchReceiver, ChangeRecord, FsWatcher, WatchError};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::aggregate::aggregate;
use super::buffer::{BufferedResponse, Capture};
use super::channel::{EventChannel, PublishError, ReloadEvent, accepts_event_stream, not_found};
use super::logger::{Logger, TracingLogger};
use super::rewrite::{client_script, rewrite};
use crate::error::ServerError;

/// Default subscribe path.
pub const DEFAULT_PATH: &str = "/livereload";

/// Default reconnect hint sent with every event.
pub const DEFAULT_RETRY: Duration = Duration::from_millis(1000);

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Reload service settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadOptions {
    /// Subscribe path, also the URL given to the injected script.
    pub path: String,
    /// Reconnect hint sent with every event.
    pub retry: Option<Duration>,
    /// Publish a notification for batches whose changes cancelled out.
    pub publish_empty_batches: bool,
    /// Inject into `4xx` and `5xx` responses too.
    pub inject_error_responses: bool,
    /// Serve the client script from the standalone listener.
    pub serve_client_script: bool,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_owned(),
            retry: Some(DEFAULT_RETRY),
            publish_empty_batches: false,
            inject_error_responses: false,
            serve_client_script: false,
        }
    }
}

impl From<&lr_config::ReloadConfig> for ReloadOptions {
    fn from(config: &lr_config::ReloadConfig) -> Self {
        Self {
            path: config.path.clone(),
            retry: config.retry(),
            publish_empty_batches: config.publish_empty_batches,
            inject_error_responses: config.inject_error_responses,
            serve_client_script: config.serve_client_script,
        }
    }
}

/// Live reload service.
///
/// Build one, wrap it in an [`Arc`], and share it between the middleware,
/// the watch loop and the standalone listener.
pub struct Reloader {
    options: ReloadOptions,
    logger: Arc<dyn Logger>,
    channel: EventChannel,
}

impl Reloader {
    /// Create a service that logs through `tracing`.
    pub fn new(options: ReloadOptions) -> Self {
        Self::with_logger(options, Arc::new(TracingLogger))
    }

    /// Create a service with a custom logger.
    pub fn with_logger(options: ReloadOptions, logger: Arc<dyn Logger>) -> Self {
        Self {
            options,
            logger,
            channel: EventChannel::new(),
        }
    }

    /// Subscribe path.
    pub fn path(&self) -> &str {
        &self.options.path
    }

    /// Service settings.
    pub fn options(&self) -> &ReloadOptions {
        &self.options
    }

    /// Client script that subscribes to `url`.
    pub fn script(&self, url: &str) -> String {
        client_script(url)
    }

    /// Receiver for in-process consumers of reload events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.channel.subscribe()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    /// End all open event streams.
    pub fn close(&self) {
        self.logger.debug("livereload: closing event streams", &[]);
        self.channel.close();
    }

    /// Wrap every route of `router` in the reload middleware.
    pub fn attach<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            Arc::clone(self),
            live_reload,
        ))
    }

    /// Handle one request.
    ///
    /// Requests for the subscribe path that accept `text/event-stream` are
    /// answered by the event channel. Everything else goes to `downstream`,
    /// whose response is buffered and, if it sniffs as HTML or plain text,
    /// gets the client script appended. `HEAD` responses pass through
    /// untouched.
    pub async fn handle<F, Fut>(&self, request: Request, downstream: F) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        if request.uri().path() == self.options.path && accepts_event_stream(request.headers()) {
            return self.channel.serve(&request);
        }
        // No body to inject into, and Content-Length describes the GET body
        if request.method() == Method::HEAD {
            return downstream(request).await;
        }

        let url = subscribe_url(&request, &self.options.path);
        let mut buffered =
            match BufferedResponse::capture(downstream(request), self.logger.as_ref()).await {
                Capture::Buffered(buffered) => buffered,
                Capture::Passthrough(response) => return response,
            };

        if self.injectable_status(buffered.status()) {
            let body = buffered.replace_body(Vec::new());
            let (body, injected) = rewrite(body, &url);
            let len = body.len();
            buffered.replace_body(body);
            if injected {
                mark_injected(buffered.headers_mut(), len);
            }
        }

        buffered.flush()
    }

    fn injectable_status(&self, status: StatusCode) -> bool {
        if status.is_informational()
            || matches!(
                status,
                StatusCode::NO_CONTENT | StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED
            )
        {
            return false;
        }
        self.options.inject_error_responses
            || !(status.is_client_error() || status.is_server_error())
    }

    /// Send `payload` as a `reload` event.
    ///
    /// Never fails; delivery problems are logged. Returns the number of
    /// subscribers reached.
    pub fn publish(&self, payload: impl Into<String>) -> usize {
        self.publish_event(ReloadEvent::reload(payload, self.options.retry))
    }

    /// Send a prepared event.
    pub fn publish_event(&self, event: ReloadEvent) -> usize {
        match self.channel.publish(event) {
            Ok(reached) => {
                self.logger
                    .debug("livereload: published", &[("subscribers", &reached)]);
                reached
            }
            Err(PublishError::NoSubscribers(event)) => {
                self.logger
                    .debug("livereload: no subscribers", &[("payload", &event.data)]);
                0
            }
            Err(err) => {
                self.logger.error(
                    "livereload: failed to publish",
                    &[("error", &err), ("payload", &err.event().data)],
                );
                0
            }
        }
    }

    /// Aggregate a batch and publish it.
    ///
    /// Empty batches are skipped unless
    /// [`ReloadOptions::publish_empty_batches`] is set.
    pub fn publish_batch(&self, batch: &[ChangeRecord]) -> usize {
        if batch.is_empty() && !self.options.publish_empty_batches {
            self.logger.debug("livereload: skipping empty batch", &[]);
            return 0;
        }
        let payload = aggregate(batch, self.logger.as_ref());
        self.publish(payload)
    }

    /// Watch `root` with default watcher settings until `cancel` fires.
    pub async fn watch(
        &self,
        root: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        self.watch_with(&FsWatcher::new(root), cancel).await
    }

    /// Start `watcher` and publish its batches until `cancel` fires.
    ///
    /// Returns `Ok(())` once cancelled and the watcher's error if it fails.
    pub async fn watch_with(
        &self,
        watcher: &FsWatcher,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let (mut batches, handle) = watcher.watch()?;
        let root = watcher.root().display();
        self.logger.debug("livereload: watching", &[("root", &root)]);

        let result = self.watch_batches(&mut batches, cancel).await;
        handle.stop();

        if result.is_ok() {
            self.logger
                .debug("livereload: stopped watching", &[("root", &root)]);
        }
        result
    }

    /// Publish every batch from `batches` until `cancel` fires.
    ///
    /// One publish per batch, in arrival order. Cancellation takes priority
    /// over pending batches, so nothing is published after it is observed.
    /// A closed receiver counts as stopped; an `Err` from the watcher ends
    /// the loop and is returned.
    pub async fn watch_batches(
        &self,
        batches: &mut BatchReceiver,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                next = batches.recv() => next,
            };
            match next {
                Some(Ok(batch)) => {
                    self.publish_batch(&batch);
                }
                Some(Err(err)) => {
                    self.logger
                        .error("livereload: watcher failed", &[("error", &err)]);
                    return Err(err);
                }
                None => return Ok(()),
            }
        }
    }

    /// Serve only the subscribe endpoint on `addr` until `cancel` fires.
    pub async fn listen_and_serve(
        self: &Arc<Self>,
        addr: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, cancel).await
    }

    /// Serve the subscribe endpoint on an already bound listener.
    ///
    /// On cancellation the open event streams are closed and the server
    /// drains its connections before returning.
    pub async fn serve_listener(
        self: &Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        self.logger
            .debug("livereload: listening", &[("address", &addr)]);

        let reloader = Arc::clone(self);
        axum::serve(listener, self.standalone_router())
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                reloader.close();
            })
            .await?;

        self.logger
            .debug("livereload: listener stopped", &[("address", &addr)]);
        Ok(())
    }

    /// Router answering only the subscribe path.
    pub fn standalone_router(self: &Arc<Self>) -> Router {
        Router::new()
            .fallback(standalone)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(self))
    }

    fn serve_standalone(&self, request: &Request) -> Response {
        if request.method() != Method::GET || request.uri().path() != self.options.path {
            return not_found();
        }
        if accepts_event_stream(request.headers()) {
            return self.channel.serve(request);
        }
        if self.options.serve_client_script {
            return self.script_response(request);
        }
        not_found()
    }

    fn script_response(&self, request: &Request) -> Response {
        let script = self.script(&subscribe_url(request, &self.options.path));
        (
            [
                (CONTENT_TYPE, "application/javascript; charset=utf-8"),
                (CACHE_CONTROL, NO_CACHE),
                (PRAGMA, "no-cache"),
                (EXPIRES, "0"),
            ],
            script,
        )
            .into_response()
    }
}

/// Reload middleware for `axum::middleware::from_fn_with_state`.
pub async fn live_reload(
    State(reloader): State<Arc<Reloader>>,
    request: Request,
    next: Next,
) -> Response {
    reloader.handle(request, |request| next.run(request)).await
}

async fn standalone(State(reloader): State<Arc<Reloader>>, request: Request) -> Response {
    reloader.serve_standalone(&request)
}

/// Headers for a body that now carries the client script.
fn mark_injected(headers: &mut HeaderMap, len: usize) {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(LAST_MODIFIED, HeaderValue::from_static("0"));
    // ETag no longer matches the body
    headers.remove(ETAG);
}

/// Absolute subscribe URL as seen by the browser, or the bare path when the
/// request carries no host.
fn subscribe_url(request: &Request, path: &str) -> String {
    let forwarded_https = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
    let scheme = if forwarded_https || request.uri().scheme_str() == Some("https") {
        "https"
    } else {
        "http"
    };

    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()));
    match host {
        Some(host) => format!("{scheme}://{host}{path}"),
        None => path.to_owned(),
    }
}
