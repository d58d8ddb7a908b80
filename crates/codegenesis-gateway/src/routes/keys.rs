//! Encrypted model-provider API keys.
//!
//! Keys are encrypted with the gateway [`KeyVault`](crate::vault::KeyVault)
//! before they reach the store; only [`stored_key`] ever decrypts one, and the
//! plaintext is handed straight to the generation endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query as QueryParams, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use codegenesis_core::error::CodeGenesisError;
use codegenesis_core::store::{Collection, Query, decode, decode_all};
use codegenesis_core::types::{ApiKeyRecord, ConfiguredProvider, KeyProvider, ModelPreference};

use super::now;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

fn parse_provider(raw: &str) -> ApiResult<KeyProvider> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid provider".into()))
}

/// `GET /api/keys`: active providers, never key material.
pub async fn list(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Value>> {
    let rows = state
        .store
        .select(
            Collection::EncryptedApiKeys,
            &Query::new().eq("user_id", user).eq("is_active", true),
        )
        .await?;
    let providers: Vec<ConfiguredProvider> = decode_all::<ApiKeyRecord>(rows)?
        .iter()
        .map(ConfiguredProvider::from)
        .collect();
    Ok(Json(json!({ "providers": providers })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreKey {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub is_custom_model: Option<bool>,
}

/// `POST /api/keys`: encrypt and store; older keys for the provider are
/// deactivated first.
pub async fn store(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<StoreKey>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let (Some(provider), Some(api_key)) = (
        body.provider.filter(|p| !p.is_empty()),
        body.api_key.filter(|k| !k.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Provider and API key are required".into(),
        ));
    };
    let provider = parse_provider(&provider)?;
    let encrypted_key = state.vault()?.encrypt(&api_key)?;

    state
        .store
        .update(
            Collection::EncryptedApiKeys,
            &Query::new()
                .eq("user_id", user.as_str())
                .eq("provider", provider.as_str()),
            json!({ "is_active": false }),
        )
        .await?;
    state
        .store
        .insert(
            Collection::EncryptedApiKeys,
            json!({
                "user_id": user,
                "provider": provider,
                "encrypted_key": encrypted_key,
                "key_name": body.key_name,
                "is_active": true,
            }),
        )
        .await?;

    if let Some(model_id) = body.model_id.filter(|m| !m.is_empty()) {
        let preference = ModelPreference {
            user_id: user.clone(),
            provider,
            model_id,
            is_custom: body.is_custom_model.unwrap_or(false),
        };
        state
            .store
            .upsert(
                Collection::ModelPreferences,
                serde_json::to_value(&preference).map_err(CodeGenesisError::from)?,
                &["user_id", "provider"],
            )
            .await?;
    }

    info!(user = %user, provider = %provider, "API key stored");
    Ok(Json(json!({
        "success": true,
        "message": "API key stored securely",
        "provider": provider,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveKey {
    #[serde(default)]
    pub provider: Option<String>,
}

/// `DELETE /api/keys?provider=openai`
pub async fn remove(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    params: Result<QueryParams<RemoveKey>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let QueryParams(params) = params?;
    let provider = params
        .provider
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Provider is required".into()))?;
    let provider = parse_provider(&provider)?;

    let removed = state
        .store
        .delete(
            Collection::EncryptedApiKeys,
            &Query::new()
                .eq("user_id", user.as_str())
                .eq("provider", provider.as_str()),
        )
        .await?;
    info!(user = %user, provider = %provider, removed, "API key deleted");
    Ok(Json(json!({ "success": true, "message": "API key deleted" })))
}

/// Decrypt the caller's active key for `provider` and stamp `last_used_at`.
///
/// `Ok(None)` when there is no key or no vault configured.
pub async fn stored_key(
    state: &GatewayState,
    user: &str,
    provider: KeyProvider,
) -> ApiResult<Option<String>> {
    let Some(vault) = state.vault.as_deref() else {
        return Ok(None);
    };
    let Some(record) = state
        .store
        .select_one(
            Collection::EncryptedApiKeys,
            &Query::new()
                .eq("user_id", user)
                .eq("provider", provider.as_str())
                .eq("is_active", true),
        )
        .await?
    else {
        return Ok(None);
    };
    let record: ApiKeyRecord = decode(record)?;

    let key = match vault.decrypt(&record.encrypted_key) {
        Ok(key) => key,
        Err(e) => {
            // Typically the encryption secret was rotated.
            warn!(user, provider = %provider, error = %e, "Stored API key could not be decrypted");
            return Ok(None);
        }
    };

    state
        .store
        .update(
            Collection::EncryptedApiKeys,
            &Query::new().eq("id", record.id.to_string()),
            json!({ "last_used_at": now() }),
        )
        .await?;
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegenesis_core::config::Config;
    use codegenesis_core::store::MemoryStore;
    use codegenesis_providers::AnonymousIdentity;

    use crate::vault::KeyVault;

    fn state(vault: bool) -> GatewayState {
        let state = GatewayState::new(
            Arc::new(Config::default()),
            Arc::new(MemoryStore::new()),
            Arc::new(AnonymousIdentity::new("u")),
        );
        if vault {
            state.with_vault(KeyVault::new("secret"))
        } else {
            state
        }
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!(parse_provider("anthropic").unwrap(), KeyProvider::Anthropic);
        assert!(matches!(parse_provider("mistral"), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_stored_key_round_trip_and_last_used() {
        let state = state(true);
        let encrypted = state.vault().unwrap().encrypt("sk-live").unwrap();
        state
            .store
            .insert(
                Collection::EncryptedApiKeys,
                json!({"user_id": "u", "provider": "openai", "encrypted_key": encrypted, "is_active": true}),
            )
            .await
            .unwrap();

        let key = stored_key(&state, "u", KeyProvider::Openai).await.unwrap();
        assert_eq!(key.as_deref(), Some("sk-live"));
        assert!(stored_key(&state, "u", KeyProvider::Groq).await.unwrap().is_none());

        let row = state
            .store
            .select_one(Collection::EncryptedApiKeys, &Query::new().eq("user_id", "u"))
            .await
            .unwrap()
            .unwrap();
        assert!(row["last_used_at"].is_string());
    }

    #[tokio::test]
    async fn test_stored_key_without_vault_is_none() {
        let state = state(false);
        assert!(state.vault().is_err());
        assert!(stored_key(&state, "u", KeyProvider::Openai).await.unwrap().is_none());
    }
}
