//! Router construction.
//!
//! Builds the static file router wrapped in the reload middleware.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::live_reload::Reloader;

/// Create the application router.
///
/// # Arguments
///
/// * `reloader` - Shared reload service
/// * `static_dir` - Directory served at `/`
pub(crate) fn create_router(reloader: &Arc<Reloader>, static_dir: &Path) -> Router {
    let files = ServeDir::new(static_dir).append_index_html_on_directories(true);
    let router = Router::new().fallback_service(files);

    reloader
        .attach(router)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
