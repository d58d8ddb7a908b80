//! Preview documents for the sandboxed editor frame.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query as QueryParams, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse};
use serde::Deserialize;
use tracing::debug;

use codegenesis_core::store::{Collection, Query, decode_all};
use codegenesis_core::types::ProjectFile;
use codegenesis_preview::document::{default_html, inject_probe};
use codegenesis_preview::{PreviewFile, PreviewOptions, assemble, script};

use super::projects::owned_project;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct PreviewParams {
    /// Overrides `preview.visual_edit_default`.
    #[serde(default)]
    pub visual_edit: Option<bool>,
}

/// `GET /api/projects/{id}/preview?visual_edit=bool`
///
/// Returns the assembled `srcdoc`. With visual edit on, the probe is injected
/// so the frame answers `TOGGLE_VISUAL_EDIT`.
pub async fn render(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    params: Result<QueryParams<PreviewParams>, QueryRejection>,
) -> ApiResult<Html<String>> {
    let QueryParams(params) = params?;
    let visual_edit = params
        .visual_edit
        .unwrap_or_else(|| state.config.visual_edit_default());

    let project = owned_project(state.store.as_ref(), &id, &user).await?;
    let project_id = project
        .get("id")
        .cloned()
        .unwrap_or_else(|| id.clone().into());

    let rows = state
        .store
        .select(
            Collection::ProjectFiles,
            &Query::new().eq("project_id", project_id).order("name", true),
        )
        .await?;
    let files: Vec<PreviewFile> = decode_all::<ProjectFile>(rows)?
        .into_iter()
        .map(|f| PreviewFile {
            name: f.name,
            content: f.content,
            language: Some(f.language),
        })
        .collect();

    let document = assemble(&files, PreviewOptions { visual_edit });
    if document.is_empty() {
        debug!(project = %id, "Project has no files; serving placeholder");
        let page = default_html();
        return Ok(Html(if visual_edit { inject_probe(&page) } else { page }));
    }
    Ok(Html(document.html))
}

/// `GET /preview/probe.js`: the probe for hosts that inject it themselves.
pub async fn probe_script() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/javascript; charset=utf-8")],
        script::probe_script().into_owned(),
    )
}
