//! Request authentication.
//!
//! Handlers take an [`AuthUser`] argument; extraction fails with 401 before the
//! handler runs. The token comes from `Authorization: Bearer`, or from the
//! `firebase-token` / `__session` cookie the dashboard sets.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use tracing::debug;

use codegenesis_core::types::UserId;

use crate::error::ApiError;
use crate::state::GatewayState;

const SESSION_COOKIES: [&str; 2] = ["firebase-token", "__session"];

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

/// Extract the bearer token from headers, falling back to session cookies.
pub fn request_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| SESSION_COOKIES.contains(name) && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

impl FromRequestParts<Arc<GatewayState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState>,
    ) -> Result<Self, Self::Rejection> {
        let token = request_token(parts);
        let token = match token {
            Some(t) => t,
            None if !state.identity.requires_token() => String::new(),
            None => return Err(ApiError::Unauthorized),
        };

        match state.identity.verify(&token).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(e) => {
                debug!(error = %e, path = %parts.uri.path(), "Authentication failed");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
