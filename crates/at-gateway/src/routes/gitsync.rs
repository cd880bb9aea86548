//! `/git-sync/*` — repository sync queue surface (SPEC_FULL.md §6).

use std::sync::Arc;

use at_core::error::ErrorKind;
use at_gitsync::{HistoryFilter, OperationKind, OperationStatus, SyncRequest};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api_error::{ok_envelope, ApiError};
use crate::routes::correlation_from_headers;
use crate::Runtime;

pub fn router() -> Router<Arc<Runtime>> {
    Router::new()
        .route("/git-sync/ops", axum::routing::get(list_ops).post(queue_op))
        .route("/git-sync/ops/:id", axum::routing::get(get_op))
        .route("/git-sync/ops/:id/cancel", post(cancel_op))
}

#[derive(Debug, Deserialize)]
struct ListOpsQuery {
    repository_id: String,
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_ops(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Query(q): Query<ListOpsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let ops = match q.status.as_deref() {
        Some("queued") => rt.gitsync.get_queued(&q.repository_id).await,
        Some("running") => rt.gitsync.get_running(&q.repository_id).await,
        Some(other) => {
            let status = match other {
                "completed" => Some(OperationStatus::Completed),
                "failed" => Some(OperationStatus::Failed),
                "cancelled" => Some(OperationStatus::Cancelled),
                _ => return Err(ApiError::new(ErrorKind::ValidationError, format!("unknown status '{other}'"))),
            };
            rt.gitsync
                .get_history(&q.repository_id, HistoryFilter { status, limit: q.limit })
                .await
        }
        None => {
            rt.gitsync
                .get_history(&q.repository_id, HistoryFilter { status: None, limit: q.limit })
                .await
        }
    };
    Ok(ok_envelope(ops, &ctx.request_id))
}

async fn get_op(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let op = rt
        .gitsync
        .get_operation(&id)
        .await
        .ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("operation {id} not found")))?;
    Ok(ok_envelope(op, &ctx.request_id))
}

#[derive(Debug, Deserialize)]
struct QueueOpBody {
    repository_id: String,
    branch: String,
    #[serde(default)]
    priority: i32,
    agent_id: String,
    operation: OperationKind,
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

async fn queue_op(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Json(body): Json<QueueOpBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let op = rt
        .gitsync
        .queue(SyncRequest {
            repository_id: body.repository_id,
            branch: body.branch,
            priority: body.priority,
            agent_id: body.agent_id,
            operation: body.operation,
            command: body.command,
            args: body.args,
        })
        .await;
    rt.audit
        .record(&ctx, "gitsync.queue", &op.id, at_audit::Outcome::Success, serde_json::to_value(&op).unwrap_or_default())
        .await;
    Ok(ok_envelope(op, &ctx.request_id))
}

#[derive(Debug, Deserialize)]
struct CancelOpBody {
    agent_id: String,
    #[serde(default)]
    is_admin: bool,
}

async fn cancel_op(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CancelOpBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let cancelled = rt.gitsync.cancel(&id, &body.agent_id, body.is_admin).await?;
    rt.audit
        .record(&ctx, "gitsync.cancel", &id, at_audit::Outcome::Success, serde_json::json!({"cancelled": cancelled}))
        .await;
    Ok(ok_envelope(serde_json::json!({"cancelled": cancelled}), &ctx.request_id))
}
