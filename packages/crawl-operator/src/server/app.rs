//! Application setup and server configuration.

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::kernel::OperatorDeps;
use crate::server::routes::{
    crawl_customize_handler, crawl_finalize_handler, crawl_sync_handler, cronjob_sync_handler,
    health_handler, profile_browser_sync_handler,
};

/// Build the webhook router the controller calls into.
pub fn build_app(deps: OperatorDeps) -> Router {
    Router::new()
        .route("/op/crawls/sync", post(crawl_sync_handler))
        // Same handler as sync; a distinct path keeps the logs readable
        .route("/op/crawls/finalize", post(crawl_finalize_handler))
        .route("/op/crawls/customize", post(crawl_customize_handler))
        .route("/op/profilebrowsers/sync", post(profile_browser_sync_handler))
        .route("/op/cronjob/sync", post(cronjob_sync_handler))
        .route("/healthz", get(health_handler))
        .layer(Extension(deps))
        .layer(TraceLayer::new_for_http())
}
