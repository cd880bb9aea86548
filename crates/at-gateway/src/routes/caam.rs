//! `/caam/*` — credential-pool profile and rotation surface (SPEC_FULL.md §6).

use std::str::FromStr;
use std::sync::Arc;

use at_caam::{Provider, ProfilePatch};
use at_core::error::ErrorKind;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api_error::{ok_envelope, ApiError};
use crate::routes::correlation_from_headers;
use crate::Runtime;

pub fn router() -> Router<Arc<Runtime>> {
    Router::new()
        .route(
            "/caam/profiles",
            axum::routing::get(list_profiles).post(create_profile),
        )
        .route(
            "/caam/profiles/:id",
            axum::routing::get(get_profile)
                .delete(delete_profile)
                .patch(patch_profile),
        )
        .route("/caam/pools/:provider/rotate", post(rotate_pool))
}

fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    Provider::from_str(raw).map_err(|_| ApiError::new(ErrorKind::ValidationError, format!("unknown provider '{raw}'")))
}

#[derive(Debug, Deserialize)]
struct ListProfilesQuery {
    workspace_id: String,
}

async fn list_profiles(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<ListProfilesQuery>,
) -> Json<serde_json::Value> {
    let ctx = correlation_from_headers(&headers);
    let profiles = rt.caam.list_profiles(&q.workspace_id);
    ok_envelope(profiles, &ctx.request_id)
}

#[derive(Debug, Deserialize)]
struct CreateProfileBody {
    workspace_id: String,
    provider: String,
    name: String,
    auth_mode: String,
    #[serde(default)]
    labels: Vec<String>,
}

async fn create_profile(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Json(body): Json<CreateProfileBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let provider = parse_provider(&body.provider)?;
    let profile = rt
        .caam
        .create_profile(&body.workspace_id, provider, &body.name, &body.auth_mode, body.labels);
    rt.audit
        .record(&ctx, "caam.profile_create", &profile.id, at_audit::Outcome::Success, serde_json::to_value(&profile).unwrap_or_default())
        .await;
    Ok(ok_envelope(profile, &ctx.request_id))
}

async fn get_profile(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let profile = rt
        .caam
        .get_profile(&id)
        .ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("profile {id} not found")))?;
    Ok(ok_envelope(profile, &ctx.request_id))
}

async fn delete_profile(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    rt.caam.delete_profile(&id).await?;
    rt.audit
        .record(&ctx, "caam.profile_delete", &id, at_audit::Outcome::Success, serde_json::json!({}))
        .await;
    Ok(ok_envelope(serde_json::json!({"deleted": id}), &ctx.request_id))
}

async fn patch_profile(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let profile = rt.caam.update_profile(&id, patch)?;
    rt.audit
        .record(&ctx, "caam.profile_update", &id, at_audit::Outcome::Success, serde_json::to_value(&profile).unwrap_or_default())
        .await;
    Ok(ok_envelope(profile, &ctx.request_id))
}

#[derive(Debug, Deserialize)]
struct RotateBody {
    workspace_id: String,
    reason: Option<String>,
}

async fn rotate_pool(
    State(rt): State<Arc<Runtime>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Json(body): Json<RotateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = correlation_from_headers(&headers);
    let provider = parse_provider(&provider)?;
    let result = rt.caam.rotate(&body.workspace_id, provider, body.reason.as_deref()).await;
    rt.audit
        .record(
            &ctx,
            "caam.rotate",
            &body.workspace_id,
            if result.success { at_audit::Outcome::Success } else { at_audit::Outcome::Denied },
            serde_json::to_value(&result).unwrap_or_default(),
        )
        .await;
    Ok(ok_envelope(result, &ctx.request_id))
}
