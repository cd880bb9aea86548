//! HTTP/WebSocket surface over the core services (SPEC_FULL.md §6):
//! REST under `/dcg`, `/caam`, `/git-sync`, `/healthz`, and a `/ws`
//! endpoint fanning `at-hub` out to subscribers. This crate owns Axum
//! framing only — all state transitions live in the service crates it
//! wraps.

pub mod api_error;
pub mod auth;
pub mod json_response;
pub mod origin_validation;
pub mod rate_limit_middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::Runtime;

use axum::routing::get;
use axum::Router;

/// Assemble the full router over a constructed [`Runtime`]. The daemon
/// layers `AuthLayer`/`RateLimitLayer`/tracing/CORS on top of this.
pub fn build_router(runtime: std::sync::Arc<Runtime>) -> Router {
    Router::new()
        .merge(routes::dcg::router())
        .merge(routes::caam::router())
        .merge(routes::gitsync::router())
        .route("/healthz", get(routes::healthz::healthz))
        .route("/ws", get(ws::handler))
        .with_state(runtime)
}
