//! Code generation on behalf of the editor.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use codegenesis_core::types::KeyProvider;
use codegenesis_providers::{GenerationRequest, ModelCredentials};

use super::keys::stored_key;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Current code to modify.
    #[serde(default)]
    pub code: Option<String>,
}

/// Providers to try, in order: Claude models prefer Anthropic and fall back
/// to OpenAI; everything else uses OpenAI.
fn provider_order(model: Option<&str>) -> &'static [KeyProvider] {
    match model {
        Some(m) if m.starts_with("claude") => &[KeyProvider::Anthropic, KeyProvider::Openai],
        _ => &[KeyProvider::Openai],
    }
}

fn header_key(headers: &HeaderMap, provider: KeyProvider) -> Option<String> {
    headers
        .get(format!("x-{}-key", provider.as_str()))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Request headers win over keys stored in the vault.
async fn resolve_credentials(
    state: &GatewayState,
    user: &str,
    headers: &HeaderMap,
    model: Option<&str>,
) -> ApiResult<Option<ModelCredentials>> {
    for &provider in provider_order(model) {
        if let Some(api_key) = header_key(headers, provider) {
            return Ok(Some(ModelCredentials { provider, api_key }));
        }
        if let Some(api_key) = stored_key(state, user, provider).await? {
            debug!(provider = %provider, "Using stored API key");
            return Ok(Some(ModelCredentials { provider, api_key }));
        }
    }
    Ok(None)
}

/// `POST /api/generate`: `{prompt, model?, code?}` → `{code, files}`.
pub async fn generate(
    State(state): State<Arc<GatewayState>>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let prompt = body
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Prompt is required".into()))?;

    let generator = state
        .generator
        .clone()
        .ok_or_else(|| ApiError::Unavailable("Code generation is not configured".into()))?;

    let credentials = resolve_credentials(&state, &user, &headers, body.model.as_deref())
        .await?
        .ok_or(ApiError::MissingApiKey)?;
    let provider = credentials.provider;

    let generated = generator
        .generate(GenerationRequest {
            prompt,
            model: body.model,
            existing_code: body.code,
            credentials: Some(credentials),
        })
        .await?;

    info!(user = %user, provider = %provider, files = generated.files.len(), "Generation complete");
    Ok(Json(json!({
        "code": generated.html().unwrap_or_default(),
        "files": generated.files,
    })))
}
