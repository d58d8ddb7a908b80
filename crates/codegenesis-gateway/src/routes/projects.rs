//! Project CRUD.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use codegenesis_core::store::{Collection, Query, RecordStore, decode};
use codegenesis_core::types::{Project, project_slug};

use super::{now, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;
use crate::templates;

/// Fetch a project owned by `user`, or 404.
pub(crate) async fn owned_project(
    store: &dyn RecordStore,
    raw_id: &str,
    user: &str,
) -> ApiResult<Value> {
    let id = parse_id(raw_id, "Project")?;
    store
        .select_one(
            Collection::Projects,
            &Query::new().eq("id", id.to_string()).eq("user_id", user),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))
}

/// Delete a project and everything hanging off it:
/// messages, then chats, then files, then the project row.
pub(crate) async fn delete_cascade(store: &dyn RecordStore, project_id: &str) -> ApiResult<()> {
    let chats = store
        .select(
            Collection::ProjectChats,
            &Query::new().eq("project_id", project_id),
        )
        .await?;
    for chat in &chats {
        if let Some(chat_id) = chat.get("id").cloned() {
            store
                .delete(Collection::ChatMessages, &Query::new().eq("chat_id", chat_id))
                .await?;
        }
    }
    store
        .delete(
            Collection::ProjectChats,
            &Query::new().eq("project_id", project_id),
        )
        .await?;
    store
        .delete(
            Collection::ProjectFiles,
            &Query::new().eq("project_id", project_id),
        )
        .await?;
    store
        .delete(Collection::Projects, &Query::new().eq("id", project_id))
        .await?;
    info!(project_id, chats = chats.len(), "Project deleted");
    Ok(())
}

/// `GET /api/projects`: newest first.
pub async fn list(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<Value>>> {
    let projects = state
        .store
        .select(
            Collection::Projects,
            &Query::new().eq("user_id", user).order("updated_at", false),
        )
        .await?;
    Ok(Json(projects))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateProject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `POST /api/projects`: seeds template files and a first chat.
pub async fn create(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<CreateProject>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let Json(body) = body?;
    let name = body
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Untitled Project".into());
    let framework = body
        .framework
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "vanilla".into());
    let stamp = now();

    let record = state
        .store
        .insert(
            Collection::Projects,
            json!({
                "user_id": user,
                "name": name,
                "slug": project_slug(&name, chrono::Utc::now()),
                "framework": framework,
                "description": body.description.unwrap_or_default(),
                "status": "active",
                "created_at": stamp,
                "updated_at": stamp,
            }),
        )
        .await?;
    let project: Project = decode(record)?;
    let project_id = project.id.to_string();

    for file in templates::default_files(&framework, &name) {
        state
            .store
            .insert(
                Collection::ProjectFiles,
                json!({
                    "project_id": project_id,
                    "name": file.name,
                    "content": file.content,
                    "language": file.language,
                }),
            )
            .await?;
    }

    state
        .store
        .insert(
            Collection::ProjectChats,
            json!({ "project_id": project_id, "name": "Chat 1", "created_at": stamp }),
        )
        .await?;

    info!(user = %user, project_id = %project_id, framework = %framework, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /api/projects/{id}`
pub async fn get(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(owned_project(state.store.as_ref(), &id, &user).await?))
}

/// Columns a client may change through `PUT /api/projects/{id}`.
///
/// `name`, `status` and `tech_stack` are only applied when truthy; the URL and
/// description columns accept any present value, including null.
fn project_updates(body: &Map<String, Value>) -> Map<String, Value> {
    let mut updates = Map::new();
    updates.insert("updated_at".into(), Value::String(now()));

    let truthy = |v: &Value| match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    };
    for key in ["name", "status", "tech_stack"] {
        if let Some(v) = body.get(key).filter(|v| truthy(v)) {
            updates.insert(key.into(), v.clone());
        }
    }
    for key in ["description", "repository_url", "deployment_url"] {
        if let Some(v) = body.get(key) {
            updates.insert(key.into(), v.clone());
        }
    }
    updates
}

/// `PUT /api/projects/{id}`
pub async fn update(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let id = parse_id(&id, "Project")?;
    let updated = state
        .store
        .update(
            Collection::Projects,
            &Query::new().eq("id", id.to_string()).eq("user_id", user),
            Value::Object(project_updates(&body)),
        )
        .await?;
    updated
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))
}

/// `DELETE /api/projects/{id}`
pub async fn delete(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let project = owned_project(state.store.as_ref(), &id, &user).await?;
    let project_id = project
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or(id.as_str())
        .to_string();
    delete_cascade(state.store.as_ref(), &project_id).await?;
    Ok(Json(json!({ "success": true })))
}
