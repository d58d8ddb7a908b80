//! Agent-page conversations and their messages.
//!
//! A conversation expires [`CONVERSATION_TTL_DAYS`](super::CONVERSATION_TTL_DAYS)
//! after its last message unless archived; see [`cleanup`](super::cleanup).

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use codegenesis_core::store::{Collection, Query, RecordStore, decode};
use codegenesis_core::types::{AgentMessage, Conversation};

use super::{conversation_expiry, now, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

fn not_found() -> ApiError {
    ApiError::NotFound("Conversation not found".into())
}

async fn owned_conversation(
    store: &dyn RecordStore,
    raw_id: &str,
    user: &str,
) -> ApiResult<Conversation> {
    let id = parse_id(raw_id, "Conversation")?;
    let record = store
        .select_one(
            Collection::AgentConversations,
            &Query::new().eq("id", id.to_string()).eq("user_id", user),
        )
        .await?
        .ok_or_else(not_found)?;
    Ok(decode(record)?)
}

async fn conversation_messages(
    store: &dyn RecordStore,
    conversation_id: &str,
) -> ApiResult<Vec<Value>> {
    Ok(store
        .select(
            Collection::AgentMessages,
            &Query::new()
                .eq("conversation_id", conversation_id)
                .order("created_at", true),
        )
        .await?)
}

/// `GET /api/agent/conversations`: most recently active first.
pub async fn list(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<Value>>> {
    let rows = state
        .store
        .select(
            Collection::AgentConversations,
            &Query::new()
                .eq("user_id", user)
                .order("last_message_at", false),
        )
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversation {
    #[serde(default)]
    pub title: Option<String>,
}

/// `POST /api/agent/conversations`
pub async fn create(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<CreateConversation>, JsonRejection>,
) -> ApiResult<Json<Conversation>> {
    let Json(body) = body?;
    let title = body
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "New Conversation".into());
    let record = state
        .store
        .insert(
            Collection::AgentConversations,
            json!({
                "user_id": user,
                "title": title,
                "is_archived": false,
                "last_message_at": now(),
                "expires_at": conversation_expiry(),
            }),
        )
        .await?;
    let conversation: Conversation = decode(record)?;
    info!(user = %user, conversation_id = %conversation.id, "Conversation created");
    Ok(Json(conversation))
}

/// `GET /api/agent/conversations/{id}`: the conversation plus its messages.
pub async fn get(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.store.as_ref();
    let conversation = owned_conversation(store, &id, &user).await?;
    let messages = conversation_messages(store, &conversation.id.to_string()).await?;
    Ok(Json(json!({
        "conversation": conversation,
        "messages": messages,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_archived: Option<bool>,
}

/// `PUT /api/agent/conversations/{id}`: rename or (un)archive.
pub async fn update(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<UpdateConversation>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let id = parse_id(&id, "Conversation")?;

    let mut updates = Map::new();
    if let Some(title) = body.title {
        updates.insert("title".into(), Value::String(title));
    }
    if let Some(archived) = body.is_archived {
        updates.insert("is_archived".into(), Value::Bool(archived));
    }

    let updated = state
        .store
        .update(
            Collection::AgentConversations,
            &Query::new().eq("id", id.to_string()).eq("user_id", user),
            Value::Object(updates),
        )
        .await?;
    updated.into_iter().next().map(Json).ok_or_else(not_found)
}

/// `DELETE /api/agent/conversations/{id}`: messages first, then the row.
pub async fn delete(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.store.as_ref();
    let conversation = owned_conversation(store, &id, &user).await?;
    let conversation_id = conversation.id.to_string();

    let messages = store
        .delete(
            Collection::AgentMessages,
            &Query::new().eq("conversation_id", conversation_id.as_str()),
        )
        .await?;
    store
        .delete(
            Collection::AgentConversations,
            &Query::new()
                .eq("id", conversation_id.as_str())
                .eq("user_id", user.as_str()),
        )
        .await?;
    info!(user = %user, conversation_id = %conversation_id, messages, "Conversation deleted");
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/agent/conversations/{id}/messages`: oldest first.
pub async fn messages(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Value>>> {
    let store = state.store.as_ref();
    let conversation = owned_conversation(store, &id, &user).await?;
    Ok(Json(
        conversation_messages(store, &conversation.id.to_string()).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub artifact_data: Option<Value>,
}

/// `POST /api/agent/conversations/{id}/messages`
///
/// Appending a message bumps `last_message_at` and pushes `expires_at` out.
pub async fn add_message(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> ApiResult<Json<AgentMessage>> {
    let Json(body) = body?;
    let store = state.store.as_ref();
    let conversation = owned_conversation(store, &id, &user).await?;
    let conversation_id = conversation.id.to_string();

    let role = body
        .role
        .filter(|r| r == "user" || r == "assistant")
        .ok_or_else(|| ApiError::BadRequest("role must be 'user' or 'assistant'".into()))?;
    let content = body
        .content
        .ok_or_else(|| ApiError::BadRequest("content is required".into()))?;

    let record = store
        .insert(
            Collection::AgentMessages,
            json!({
                "conversation_id": conversation_id,
                "user_id": user,
                "role": role,
                "content": content,
                "message_type": body.message_type.unwrap_or_else(|| "text".into()),
                "artifact_data": body.artifact_data,
            }),
        )
        .await?;

    store
        .update(
            Collection::AgentConversations,
            &Query::new().eq("id", conversation_id.as_str()),
            json!({ "last_message_at": now(), "expires_at": conversation_expiry() }),
        )
        .await?;

    Ok(Json(decode(record)?))
}
