//! `/dcg/*` — destructive-command guard surface (SPEC_FULL.md §6).

use std::collections::HashMap;
use std::sync::Arc;

use at_core::error::ErrorKind;
use at_dcg::{Mode, Severity};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api_error::{ok_envelope, ApiError};
use crate::routes::correlation_from_headers;
use crate::Runtime;

pub fn router() -> Router<Arc<Runtime>> {
    Router::new()
        .route("/dcg/config", get(get_config).patch(patch_config))
        .route("/dcg/packs", get(list_packs))
        .route("/dcg/packs/:name/enable", post(enable_pack))
        .route("/dcg/packs/:name/disable", post(disable_pack))
        .route("/dcg/events", get(list_events).post(ingest_event))
        .route("/dcg/events/:id/false-positive", post(mark_false_positive))
        .route("/dcg/stats", get(get_stats))
}

async fn get_config(State(rt): State<Arc<Runtime>>, headers: HeaderMap) -> Json<serde_json::Value> {
    let ctx = correlation_from_headers(&headers);
    let config = rt.dcg.get_config().await;
    ok_envelope(config, &ctx.request_id)
}

#[derive(Debug, Deserialize)]
struct ConfigPatch {
    enabled_packs: Option<Vec<String>>,
    disabled_packs: Option<Vec<String>>,
    severity_modes: Option<HashMap<Severity, Mode>>,
    updated_by: Option<String>,
}

async fn patch_config(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let updated_by = patch.updated_by.clone().unwrap_or_else(|| "api".to_string());
    let config = rt
        .dcg
        .update_config(&updated_by, "patch via /dcg/config", |cfg| {
            if let Some(enabled) = patch.enabled_packs {
                cfg.enabled_packs = enabled;
            }
            if let Some(disabled) = patch.disabled_packs {
                cfg.disabled_packs = disabled;
            }
            if let Some(modes) = patch.severity_modes {
                cfg.severity_modes = modes;
            }
        })
        .await?;
    rt.audit
        .record(&ctx, "dcg.config_update", "dcg:config", at_audit::Outcome::Success, serde_json::to_value(&config).unwrap_or_default())
        .await;
    Ok(ok_envelope(config, &ctx.request_id))
}

async fn list_packs(State(rt): State<Arc<Runtime>>, headers: HeaderMap) -> Json<serde_json::Value> {
    let ctx = correlation_from_headers(&headers);
    let config = rt.dcg.get_config().await;
    let packs: Vec<serde_json::Value> = rt
        .dcg
        .list_pack_names()
        .into_iter()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "enabled": config.is_effective(&name),
            })
        })
        .collect();
    ok_envelope(packs, &ctx.request_id)
}

async fn enable_pack(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let config = rt
        .dcg
        .update_config("api", &format!("enable {name}"), |cfg| {
            cfg.disabled_packs.retain(|p| p != &name);
            if !cfg.enabled_packs.contains(&name) {
                cfg.enabled_packs.push(name.clone());
            }
        })
        .await?;
    Ok(ok_envelope(config, &ctx.request_id))
}

async fn disable_pack(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let config = rt
        .dcg
        .update_config("api", &format!("disable {name}"), |cfg| {
            if !cfg.disabled_packs.contains(&name) {
                cfg.disabled_packs.push(name.clone());
            }
        })
        .await?;
    Ok(ok_envelope(config, &ctx.request_id))
}

#[derive(Debug, Deserialize)]
struct IngestBody {
    agent_id: String,
    command: String,
}

async fn ingest_event(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Json(body): Json<IngestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let (verdict, event) = rt.dcg.evaluate_and_record(&body.agent_id, &body.command).await?;
    rt.audit
        .record(
            &ctx,
            "dcg.ingest",
            &body.agent_id,
            at_audit::Outcome::Success,
            serde_json::json!({"verdict": format!("{verdict:?}"), "event": event}),
        )
        .await;
    Ok(ok_envelope(serde_json::json!({"verdict": format!("{verdict:?}"), "event": event}), &ctx.request_id))
}

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    limit: Option<usize>,
}

async fn list_events(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Query(q): Query<ListEventsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let events = rt.dcg.list_events(q.limit.unwrap_or(100)).await?;
    Ok(ok_envelope(events, &ctx.request_id))
}

async fn mark_false_positive(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let event = rt.dcg.mark_false_positive(&id, "api").await?;
    let Some(event) = event else {
        return Err(ApiError::new(ErrorKind::NotFound, format!("block event {id} not found")));
    };
    rt.audit
        .record(&ctx, "dcg.false_positive", &id, at_audit::Outcome::Success, serde_json::json!({}))
        .await;
    Ok(ok_envelope(event, &ctx.request_id))
}

async fn get_stats(State(rt): State<Arc<Runtime>>, headers: HeaderMap) -> Json<serde_json::Value> {
    let ctx = correlation_from_headers(&headers);
    let stats = rt.dcg.get_stats(chrono::Utc::now()).await;
    ok_envelope(stats, &ctx.request_id)
}
