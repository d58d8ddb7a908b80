//! Expired-conversation cleanup, triggered by an external scheduler.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde_json::{Value, json};
use tracing::{info, warn};

use codegenesis_core::store::{Collection, Query, RecordStore};
use codegenesis_providers::identity::constant_time_eq;

use super::now;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

fn expired() -> Query {
    Query::new()
        .lt("expires_at", now())
        .eq("is_archived", false)
}

/// Whether `headers` carry `Authorization: Bearer <secret>`.
///
/// Without a configured secret nothing is authorized.
fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    constant_time_eq(presented, &format!("Bearer {secret}"))
}

/// Remove every expired, non-archived conversation and its messages.
/// Returns how many conversations were deleted.
pub async fn cleanup_expired(store: &dyn RecordStore) -> ApiResult<u64> {
    let query = expired();
    let doomed = store
        .select(Collection::AgentConversations, &query)
        .await?;
    for conversation in &doomed {
        if let Some(id) = conversation.get("id").cloned() {
            store
                .delete(
                    Collection::AgentMessages,
                    &Query::new().eq("conversation_id", id.clone()),
                )
                .await?;
            store
                .delete(Collection::AgentConversations, &Query::new().eq("id", id))
                .await?;
        }
    }
    Ok(doomed.len() as u64)
}

/// `POST /api/agent/cleanup`: requires `Bearer <cron_secret>`.
pub async fn run(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let secret = state
        .config
        .gateway
        .as_ref()
        .and_then(|g| g.resolve_cron_secret());
    if !authorized(&headers, secret.as_deref()) {
        if secret.is_none() {
            warn!("Cleanup requested but no cron secret is configured");
        }
        return Err(ApiError::Unauthorized);
    }

    let deleted = cleanup_expired(state.store.as_ref()).await?;
    info!(deleted, "Cleanup complete");
    Ok(Json(json!({
        "success": true,
        "deleted_count": deleted,
        "timestamp": now(),
    })))
}

/// `GET /api/agent/cleanup`: how many conversations the next run would remove.
pub async fn stats(State(state): State<Arc<GatewayState>>) -> ApiResult<Json<Value>> {
    let pending = state
        .store
        .count(Collection::AgentConversations, &expired())
        .await?;
    Ok(Json(json!({
        "pending_cleanup": pending,
        "next_cleanup": "Daily at midnight UTC",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegenesis_core::store::MemoryStore;

    #[test]
    fn test_authorized() {
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, Some("s3cret")));

        headers.insert(AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        assert!(authorized(&headers, Some("s3cret")));
        assert!(!authorized(&headers, Some("other")));
        assert!(!authorized(&headers, None));
    }

    #[tokio::test]
    async fn test_cleanup_spares_archived_and_live_conversations() {
        let store = MemoryStore::new();
        let past = "2020-01-01T00:00:00Z";
        let future = "2999-01-01T00:00:00Z";
        let expired_row = store
            .insert(
                Collection::AgentConversations,
                json!({"user_id": "u", "title": "old", "is_archived": false, "expires_at": past}),
            )
            .await
            .unwrap();
        store
            .insert(
                Collection::AgentMessages,
                json!({"conversation_id": expired_row["id"], "user_id": "u", "role": "user", "content": "hi"}),
            )
            .await
            .unwrap();
        store
            .insert(
                Collection::AgentConversations,
                json!({"user_id": "u", "title": "kept", "is_archived": true, "expires_at": past}),
            )
            .await
            .unwrap();
        store
            .insert(
                Collection::AgentConversations,
                json!({"user_id": "u", "title": "live", "is_archived": false, "expires_at": future}),
            )
            .await
            .unwrap();

        assert_eq!(
            store
                .count(Collection::AgentConversations, &expired())
                .await
                .unwrap(),
            1
        );
        assert_eq!(cleanup_expired(&store).await.unwrap(), 1);
        assert_eq!(
            store
                .count(Collection::AgentConversations, &Query::new())
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store.count(Collection::AgentMessages, &Query::new()).await.unwrap(),
            0
        );
    }
}
