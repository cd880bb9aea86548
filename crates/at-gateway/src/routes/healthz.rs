//! `GET /healthz` — liveness probe (SPEC_FULL.md §6), grounded in the same
//! pid/version reporting the daemon writes into its lockfile.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::Runtime;

pub async fn healthz(State(_rt): State<Arc<Runtime>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "pid": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
