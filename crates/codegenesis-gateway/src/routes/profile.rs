//! The caller's profile.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Map, Value};

use codegenesis_core::store::{Collection, Query, decode};
use codegenesis_core::types::Profile;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

/// `GET /api/profile`
pub async fn get(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Profile>> {
    let record = state
        .store
        .select_one(Collection::Profiles, &Query::new().eq("id", user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;
    Ok(Json(decode(record)?))
}

/// `POST /api/profile`: create or merge. The id is always the caller's, so a
/// body cannot write someone else's row.
pub async fn upsert(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Json<Profile>> {
    let Json(mut body) = body?;
    body.insert("id".into(), Value::String(user));
    let record = state
        .store
        .upsert(Collection::Profiles, Value::Object(body), &["id"])
        .await?;
    Ok(Json(decode(record)?))
}
