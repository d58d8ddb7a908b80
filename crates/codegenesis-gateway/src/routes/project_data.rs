//! Whole-project load/save used by the editor.

use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use codegenesis_core::store::{Collection, Query, RecordStore};

use super::now;
use super::projects::{delete_cascade, owned_project};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

fn record_id(record: &Value) -> Option<String> {
    record.get("id").and_then(Value::as_str).map(str::to_string)
}

/// `GET /api/projects/{id}/data`: project, files by name, chats with messages.
pub async fn load(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.store.as_ref();
    let project = owned_project(store, &id, &user).await?;
    let project_id = record_id(&project).unwrap_or(id);

    let files = store
        .select(
            Collection::ProjectFiles,
            &Query::new().eq("project_id", project_id.as_str()).order("name", true),
        )
        .await?;

    let chats = store
        .select(
            Collection::ProjectChats,
            &Query::new()
                .eq("project_id", project_id.as_str())
                .order("created_at", true),
        )
        .await?;

    let mut chats_with_messages = Vec::with_capacity(chats.len());
    for chat in chats {
        let messages = match record_id(&chat) {
            Some(chat_id) => {
                store
                    .select(
                        Collection::ChatMessages,
                        &Query::new().eq("chat_id", chat_id).order("created_at", true),
                    )
                    .await?
            }
            None => Vec::new(),
        };
        let mut chat = match chat {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        chat.insert("messages".into(), Value::Array(messages));
        chats_with_messages.push(Value::Object(chat));
    }

    // Loading counts as access.
    store
        .update(
            Collection::Projects,
            &Query::new().eq("id", project_id.as_str()),
            json!({ "updated_at": now() }),
        )
        .await?;

    Ok(Json(json!({
        "project": project,
        "files": files,
        "chats": chats_with_messages,
    })))
}

#[derive(Debug, Deserialize)]
pub struct FileInput {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<MessageInput>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProject {
    #[serde(default)]
    pub files: Option<Vec<FileInput>>,
    #[serde(default)]
    pub chats: Option<Vec<ChatInput>>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
}

/// Bring the stored file set in line with `files`: drop files that are gone,
/// update the ones that exist by name, insert the rest.
async fn save_files(
    store: &dyn RecordStore,
    project_id: &str,
    files: &[FileInput],
) -> ApiResult<()> {
    let existing = store
        .select(
            Collection::ProjectFiles,
            &Query::new().eq("project_id", project_id),
        )
        .await?;
    let existing_names: HashSet<String> = existing
        .iter()
        .filter_map(|f| f.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    let new_names: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();

    for stale in &existing {
        let name = stale.get("name").and_then(Value::as_str).unwrap_or_default();
        if !new_names.contains(name) {
            if let Some(file_id) = record_id(stale) {
                store
                    .delete(Collection::ProjectFiles, &Query::new().eq("id", file_id))
                    .await?;
            }
        }
    }

    for file in files {
        let language = file.language.as_deref().unwrap_or("plaintext");
        if existing_names.contains(&file.name) {
            store
                .update(
                    Collection::ProjectFiles,
                    &Query::new()
                        .eq("project_id", project_id)
                        .eq("name", file.name.as_str()),
                    json!({ "content": file.content, "language": language }),
                )
                .await?;
        } else {
            store
                .insert(
                    Collection::ProjectFiles,
                    json!({
                        "project_id": project_id,
                        "name": file.name,
                        "content": file.content,
                        "language": language,
                    }),
                )
                .await?;
        }
    }
    Ok(())
}

/// Reject chat ids that already belong to a different project. Chat ids are
/// client-chosen, and messages are keyed by chat id alone.
async fn check_chat_ids(
    store: &dyn RecordStore,
    project_id: &str,
    chats: &[ChatInput],
) -> ApiResult<()> {
    for chat_id in chats.iter().filter_map(|c| c.id.as_deref()).filter(|id| !id.is_empty()) {
        let Some(existing) = store
            .select_one(Collection::ProjectChats, &Query::new().eq("id", chat_id))
            .await?
        else {
            continue;
        };
        let owner = existing.get("project_id").and_then(Value::as_str);
        if owner != Some(project_id) {
            warn!(chat_id, project_id, "Chat id belongs to another project");
            return Err(ApiError::NotFound("Chat not found".into()));
        }
    }
    Ok(())
}

/// Upsert each chat and replace its messages wholesale.
async fn save_chats(store: &dyn RecordStore, project_id: &str, chats: &[ChatInput]) -> ApiResult<()> {
    for chat in chats {
        let chat_id = chat
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = chat.name.clone().unwrap_or_else(|| "Chat".into());

        let existing = store
            .select_one(
                Collection::ProjectChats,
                &Query::new()
                    .eq("id", chat_id.as_str())
                    .eq("project_id", project_id),
            )
            .await?;
        if existing.is_some() {
            store
                .update(
                    Collection::ProjectChats,
                    &Query::new().eq("id", chat_id.as_str()),
                    json!({ "name": name }),
                )
                .await?;
        } else {
            store
                .insert(
                    Collection::ProjectChats,
                    json!({
                        "id": chat_id,
                        "project_id": project_id,
                        "name": name,
                        "created_at": chat.created_at.clone().unwrap_or_else(now),
                    }),
                )
                .await?;
        }

        let Some(messages) = &chat.messages else {
            continue;
        };
        store
            .delete(
                Collection::ChatMessages,
                &Query::new().eq("chat_id", chat_id.as_str()),
            )
            .await?;
        let base = Utc::now();
        for (idx, message) in messages.iter().enumerate() {
            // Untimed messages keep their order by spacing them a millisecond apart.
            let created_at = message.timestamp.clone().unwrap_or_else(|| {
                (base + Duration::milliseconds(idx as i64)).to_rfc3339()
            });
            store
                .insert(
                    Collection::ChatMessages,
                    json!({
                        "chat_id": chat_id,
                        "role": message.role,
                        "content": message.content,
                        "files_changed": message.files_changed,
                        "created_at": created_at,
                    }),
                )
                .await?;
        }
        debug!(chat_id = %chat_id, messages = messages.len(), "Chat saved");
    }
    Ok(())
}

/// `PUT /api/projects/{id}/data`
pub async fn save(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<SaveProject>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let store = state.store.as_ref();
    let project = owned_project(store, &id, &user).await?;
    let project_id = record_id(&project).unwrap_or(id);
    if let Some(chats) = &body.chats {
        check_chat_ids(store, &project_id, chats).await?;
    }

    let mut updates = Map::new();
    updates.insert("updated_at".into(), Value::String(now()));
    if let Some(name) = body.project_name.filter(|n| !n.is_empty()) {
        updates.insert("name".into(), Value::String(name));
    }
    if let Some(framework) = body.framework.filter(|f| !f.is_empty()) {
        updates.insert("framework".into(), Value::String(framework));
    }
    if let Some(config) = body.config.filter(|c| !c.is_null()) {
        updates.insert("config".into(), config);
    }
    store
        .update(
            Collection::Projects,
            &Query::new().eq("id", project_id.as_str()),
            Value::Object(updates),
        )
        .await?;

    if let Some(files) = &body.files {
        save_files(store, &project_id, files).await?;
    }
    if let Some(chats) = &body.chats {
        save_chats(store, &project_id, chats).await?;
    }

    let saved_at = now();
    info!(project_id = %project_id, "Project saved");
    Ok(Json(json!({ "success": true, "savedAt": saved_at })))
}

/// `DELETE /api/projects/{id}/data`
pub async fn delete(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.store.as_ref();
    let project = owned_project(store, &id, &user).await?;
    let project_id = record_id(&project).unwrap_or(id);
    delete_cascade(store, &project_id).await?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegenesis_core::store::MemoryStore;

    fn file(name: &str, content: &str) -> FileInput {
        FileInput {
            name: name.into(),
            content: content.into(),
            language: None,
        }
    }

    #[tokio::test]
    async fn test_save_files_diffs_by_name() {
        let store = MemoryStore::new();
        for name in ["index.html", "old.js"] {
            store
                .insert(
                    Collection::ProjectFiles,
                    json!({"project_id": "p", "name": name, "content": "", "language": "html"}),
                )
                .await
                .unwrap();
        }

        save_files(&store, "p", &[file("index.html", "<h1>hi</h1>"), file("new.css", "a{}")])
            .await
            .unwrap();

        let rows = store
            .select(
                Collection::ProjectFiles,
                &Query::new().eq("project_id", "p").order("name", true),
            )
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["index.html", "new.css"]);
        assert_eq!(rows[0]["content"], "<h1>hi</h1>");
        assert_eq!(rows[0]["language"], "plaintext");
    }

    #[tokio::test]
    async fn test_save_chats_replaces_messages_in_order() {
        let store = MemoryStore::new();
        let chat: ChatInput = serde_json::from_value(json!({
            "id": "c1",
            "name": "Chat 1",
            "messages": [
                {"role": "user", "content": "make a button"},
                {"role": "assistant", "content": "done", "filesChanged": ["index.html"]},
            ]
        }))
        .unwrap();

        save_chats(&store, "p", std::slice::from_ref(&chat)).await.unwrap();
        save_chats(&store, "p", &[chat]).await.unwrap();

        assert_eq!(
            store.count(Collection::ProjectChats, &Query::new()).await.unwrap(),
            1
        );
        let messages = store
            .select(
                Collection::ChatMessages,
                &Query::new().eq("chat_id", "c1").order("created_at", true),
            )
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["files_changed"], json!(["index.html"]));
    }

    #[tokio::test]
    async fn test_chat_ids_from_another_project_are_rejected() {
        let store = MemoryStore::new();
        let chat: ChatInput = serde_json::from_value(json!({
            "id": "shared",
            "messages": [{"role": "user", "content": "first"}]
        }))
        .unwrap();
        save_chats(&store, "p", std::slice::from_ref(&chat)).await.unwrap();

        check_chat_ids(&store, "p", std::slice::from_ref(&chat))
            .await
            .unwrap();
        match check_chat_ids(&store, "q", &[chat]).await {
            Err(ApiError::NotFound(m)) => assert_eq!(m, "Chat not found"),
            other => panic!("unexpected {other:?}"),
        }

        // A second project writing the same id directly hits the unique id.
        let intruder: ChatInput =
            serde_json::from_value(json!({"id": "shared", "messages": []})).unwrap();
        assert!(save_chats(&store, "q", &[intruder]).await.is_err());
        let messages = store
            .select(Collection::ChatMessages, &Query::new().eq("chat_id", "shared"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "first");
    }
}
