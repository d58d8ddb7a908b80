//! `/api` route table. Every handler is scoped to the authenticated user.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

pub mod cleanup;
pub mod conversations;
pub mod generate;
pub mod keys;
pub mod preview;
pub mod profile;
pub mod project_data;
pub mod projects;

/// How long an idle agent conversation survives before cleanup.
pub const CONVERSATION_TTL_DAYS: i64 = 7;

pub fn api_router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/projects", get(projects::list).post(projects::create))
        .route(
            "/api/projects/{id}",
            get(projects::get).put(projects::update).delete(projects::delete),
        )
        .route(
            "/api/projects/{id}/data",
            get(project_data::load)
                .put(project_data::save)
                .delete(project_data::delete),
        )
        .route("/api/projects/{id}/preview", get(preview::render))
        .route("/api/profile", get(profile::get).post(profile::upsert))
        .route(
            "/api/keys",
            get(keys::list).post(keys::store).delete(keys::remove),
        )
        .route(
            "/api/agent/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route(
            "/api/agent/conversations/{id}",
            get(conversations::get)
                .put(conversations::update)
                .delete(conversations::delete),
        )
        .route(
            "/api/agent/conversations/{id}/messages",
            get(conversations::messages).post(conversations::add_message),
        )
        .route("/api/agent/cleanup", get(cleanup::stats).post(cleanup::run))
        .route("/api/generate", post(generate::generate))
}

/// Parse a path id; anything that is not a UUID cannot name a record.
pub(crate) fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("{what} not found")))
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn conversation_expiry() -> String {
    (Utc::now() + Duration::days(CONVERSATION_TTL_DAYS)).to_rfc3339()
}
