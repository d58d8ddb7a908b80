//! Authentication collaborator: bearer token in, user id out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use codegenesis_core::config::{AuthMode, GatewayAuthConfig};
use codegenesis_core::error::{CodeGenesisError, Result};
use codegenesis_core::types::UserId;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId>;

    /// Whether a request without credentials must be rejected.
    fn requires_token(&self) -> bool {
        true
    }
}

/// Build the verifier selected by `gateway.auth.mode`.
pub fn from_config(config: &GatewayAuthConfig) -> Result<Arc<dyn IdentityVerifier>> {
    match config.mode {
        AuthMode::None => Ok(Arc::new(AnonymousIdentity::new(
            config.anonymous_user.as_deref().unwrap_or("local-user"),
        ))),
        AuthMode::Token => {
            let tokens = StaticTokens::from_config(config);
            if tokens.is_empty() {
                return Err(CodeGenesisError::Config(
                    "auth mode 'token' needs at least one resolvable token".into(),
                ));
            }
            Ok(Arc::new(tokens))
        }
        AuthMode::Remote => {
            let url = config.verify_url.as_deref().ok_or_else(|| {
                CodeGenesisError::Config("auth mode 'remote' needs gateway.auth.verify_url".into())
            })?;
            Ok(Arc::new(RemoteVerifier::new(url)))
        }
    }
}

/// Every request is the same local user. Development only.
pub struct AnonymousIdentity {
    user: UserId,
}

impl AnonymousIdentity {
    pub fn new(user: &str) -> Self {
        Self { user: user.into() }
    }
}

#[async_trait]
impl IdentityVerifier for AnonymousIdentity {
    async fn verify(&self, _token: &str) -> Result<UserId> {
        Ok(self.user.clone())
    }

    fn requires_token(&self) -> bool {
        false
    }
}

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Static token table from config. Tokens are kept as SHA-256 digests.
pub struct StaticTokens {
    entries: Vec<(String, UserId)>,
}

impl StaticTokens {
    pub fn new<I, T, U>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (T, U)>,
        T: AsRef<str>,
        U: Into<UserId>,
    {
        Self {
            entries: tokens
                .into_iter()
                .map(|(t, u)| (digest(t.as_ref()), u.into()))
                .collect(),
        }
    }

    pub fn from_config(config: &GatewayAuthConfig) -> Self {
        Self::new(
            config
                .tokens
                .iter()
                .filter_map(|t| t.resolve_token().map(|tok| (tok, t.user_id.clone()))),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Result<UserId> {
        let provided = digest(token);
        // Scan every entry so timing does not depend on the match position.
        let mut found = None;
        for (expected, user) in &self.entries {
            if constant_time_eq(&provided, expected) && found.is_none() {
                found = Some(user.clone());
            }
        }
        found.ok_or_else(|| CodeGenesisError::Auth("invalid token".into()))
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Verifies tokens against a remote identity endpoint: `GET verify_url` with
/// the bearer token, expecting `{ "uid": .. }` or `{ "user_id": .. }`.
pub struct RemoteVerifier {
    url: String,
    client: reqwest::Client,
}

impl RemoteVerifier {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> Result<UserId> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Identity endpoint unreachable");
                CodeGenesisError::Auth("identity provider unavailable".into())
            })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Token rejected by identity endpoint");
            return Err(CodeGenesisError::Auth("invalid token".into()));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| CodeGenesisError::Auth(format!("bad identity response: {e}")))?;
        body.uid
            .or(body.user_id)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CodeGenesisError::Auth("identity response has no user id".into()))
    }
}
