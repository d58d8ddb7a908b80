//! Code-generation collaborator.
//!
//! Generation itself happens elsewhere; the gateway posts the prompt to a
//! remote endpoint and turns whatever comes back into preview files.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use codegenesis_core::config::GenerationConfig;
use codegenesis_core::error::{CodeGenesisError, Result};
use codegenesis_core::types::KeyProvider;
use codegenesis_preview::PreviewFile;
use codegenesis_preview::document::strip_code_fences;

/// A provider key forwarded to the generation endpoint.
#[derive(Clone)]
pub struct ModelCredentials {
    pub provider: KeyProvider,
    pub api_key: String,
}

impl fmt::Debug for ModelCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCredentials")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Option<String>,
    /// Current code to modify, if any.
    pub existing_code: Option<String>,
    pub credentials: Option<ModelCredentials>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFiles {
    pub files: Vec<PreviewFile>,
}

impl GeneratedFiles {
    /// The HTML page, if one was produced.
    pub fn html(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.name.contains(".html"))
            .map(|f| f.content.as_str())
    }
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedFiles>;
}

pub struct HttpGenerator {
    endpoint: String,
    default_model: Option<String>,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CodeGenesisError::Generation(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            default_model: None,
            client,
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let mut generator = Self::new(&config.endpoint, Duration::from_secs(config.timeout_secs))?;
        generator.default_model = config.default_model.clone();
        Ok(generator)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn key_header(provider: KeyProvider) -> String {
    format!("x-{}-key", provider.as_str())
}

/// Accept `{files: [...]}` or the single-page `{code: "..."}` shape.
pub fn parse_generation_response(body: Value) -> Result<GeneratedFiles> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(CodeGenesisError::Generation(error.to_string()));
    }
    if let Some(files) = body.get("files") {
        let mut files: Vec<PreviewFile> = serde_json::from_value(files.clone())?;
        for file in &mut files {
            file.content = strip_code_fences(&file.content);
        }
        return Ok(GeneratedFiles { files });
    }
    if let Some(code) = body.get("code").and_then(Value::as_str) {
        let mut file = PreviewFile::new("index.html", strip_code_fences(code));
        file.language = Some("html".into());
        return Ok(GeneratedFiles { files: vec![file] });
    }
    Err(CodeGenesisError::Generation(
        "generation response had neither files nor code".into(),
    ))
}

#[async_trait]
impl CodeGenerator for HttpGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedFiles> {
        let model = request.model.clone().or_else(|| self.default_model.clone());
        let body = json!({
            "prompt": request.prompt,
            "model": model,
            "code": request.existing_code,
        });

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(creds) = &request.credentials {
            builder = builder.header(key_header(creds.provider), &creds.api_key);
        }

        debug!(endpoint = %self.endpoint, model = ?model, "Requesting generation");
        let response = builder
            .send()
            .await
            .map_err(|e| CodeGenesisError::Generation(e.to_string()))?;

        let status = response.status();
        let value: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("generation endpoint returned {status}"));
            warn!(%status, %message, "Generation failed");
            return Err(CodeGenesisError::Generation(message));
        }
        parse_generation_response(value)
    }
}
