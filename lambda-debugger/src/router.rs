//! HTTP router for the debugger daemon

use axum::{
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use lambda_debugger_runtime::{handlers, InvokerState};

/// Page served at `/` when no UI directory is configured
const BUNDLED_UI: &str = include_str!("../ui/index.html");

/// Create the main application router
///
/// `/invoke` and `/health` are the API. With a UI directory everything else
/// falls through to it; without one `/` serves the page built into the binary.
pub fn create_router(state: InvokerState, ui_dir: Option<&Path>, body_limit: usize) -> Router {
    let shared_state = Arc::new(state);

    let router = Router::new()
        .route("/invoke", post(handlers::invoke))
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(shared_state);

    let router = match ui_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.route("/", get(bundled_ui)),
    };

    router.layer(TraceLayer::new_for_http())
}

async fn bundled_ui() -> Html<&'static str> {
    Html(BUNDLED_UI)
}
