//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CodeGenesisError, Result};

/// Top-level CodeGenesis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase: Option<SupabaseConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeysConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<GatewayAuthConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Shared secret the scheduler presents to `/api/agent/cleanup`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_secret_env: Option<String>,

    /// Allowed CORS origins. Empty = allow any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            auth: None,
            rate_limit: None,
            cron_secret: None,
            cron_secret_env: None,
            cors_origins: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn resolve_cron_secret(&self) -> Option<String> {
        resolve_secret_field(&self.cron_secret, &self.cron_secret_env)
    }
}

/// How inbound requests are mapped to a user id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Every request runs as `anonymous_user`. Development only.
    #[default]
    None,
    /// Bearer tokens are looked up in a static token table.
    Token,
    /// Bearer tokens are verified by a remote identity endpoint.
    Remote,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayAuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Static token table: token -> user id.
    #[serde(default)]
    pub tokens: Vec<StaticToken>,

    /// Identity endpoint used in `remote` mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<String>,

    /// User id assumed in `none` mode (default: "local-user").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticToken {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    pub user_id: String,
}

impl StaticToken {
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret_field(&self.token, &self.token_env)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max API requests per IP per minute (default: 120).
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
}

fn default_max_requests_per_minute() -> u32 {
    120
}

/// Managed Postgres (PostgREST) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key_env: Option<String>,
}

impl SupabaseConfig {
    pub fn resolve_service_key(&self) -> Option<String> {
        resolve_secret_field(&self.service_key, &self.service_key_env)
    }
}

/// Remote code-generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    /// Request timeout in seconds (default: 120).
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Secret used to derive the API-key vault encryption key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_secret_env: Option<String>,
}

impl KeysConfig {
    pub fn resolve_encryption_secret(&self) -> Option<String> {
        resolve_secret_field(&self.encryption_secret, &self.encryption_secret_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Inject the visual-edit probe when the request does not say.
    #[serde(default)]
    pub visual_edit_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "codegenesis_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse config text (JSON5) after env substitution.
    pub fn parse(raw: &str) -> Result<Self> {
        let substituted = substitute_env_vars(raw);
        json5::from_str(&substituted).map_err(|e| CodeGenesisError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(3000)
    }

    /// Gateway bind address.
    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn auth(&self) -> GatewayAuthConfig {
        self.gateway
            .as_ref()
            .and_then(|g| g.auth.clone())
            .unwrap_or_default()
    }

    pub fn visual_edit_default(&self) -> bool {
        self.preview
            .as_ref()
            .map(|p| p.visual_edit_default)
            .unwrap_or(false)
    }

    /// Get a config value by dotted path (e.g. "gateway.port").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a config value by dotted path.
    pub fn set_path(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(CodeGenesisError::Config("Empty path".into()));
        };

        let mut json = serde_json::to_value(&*self)?;
        let mut current = &mut json;
        for segment in parents {
            if !current.is_object() {
                return Err(CodeGenesisError::Config(format!(
                    "'{segment}' is not an object"
                )));
            }
            current = current
                .as_object_mut()
                .map(|obj| {
                    obj.entry(segment.to_string())
                        .or_insert_with(|| serde_json::json!({}))
                })
                .ok_or_else(|| CodeGenesisError::Config(format!("bad segment '{segment}'")))?;
        }
        match current.as_object_mut() {
            Some(obj) => {
                obj.insert(last.to_string(), value);
            }
            None => {
                return Err(CodeGenesisError::Config(format!(
                    "cannot set '{last}' on a non-object"
                )));
            }
        }

        *self = serde_json::from_value(json)
            .map_err(|e| CodeGenesisError::Config(format!("Config deserialization error: {e}")))?;
        Ok(())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
            if gw.resolve_cron_secret().is_none() {
                warnings.push("No cron secret configured; /api/agent/cleanup is disabled".into());
            }
        }

        let auth = self.auth();
        match auth.mode {
            AuthMode::None => {
                warnings.push("Auth mode is 'none'; every request runs as one user".into());
            }
            AuthMode::Token => {
                if auth.tokens.iter().all(|t| t.resolve_token().is_none()) {
                    errors.push("Auth mode 'token' requires at least one token".into());
                }
            }
            AuthMode::Remote => {
                if auth.verify_url.is_none() {
                    errors.push("Auth mode 'remote' requires gateway.auth.verify_url".into());
                }
            }
        }

        match &self.supabase {
            Some(sb) if sb.resolve_service_key().is_none() => {
                errors.push("Supabase is configured without a service key".into());
            }
            Some(_) => {}
            None => warnings.push("No Supabase configured; using in-memory store".into()),
        }

        if self
            .keys
            .as_ref()
            .and_then(|k| k.resolve_encryption_secret())
            .is_none()
        {
            warnings.push("No key encryption secret; /api/keys is disabled".into());
        }

        if self.generation.is_none() {
            warnings.push("No generation endpoint; /api/generate is disabled".into());
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for CodeGenesis data: `~/.codegenesis/`
pub fn data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let raw = std::env::var("CODEGENESIS_HOME").ok();
    match raw {
        Some(dir) if !dir.is_empty() => PathBuf::from(shellexpand::tilde(&dir).as_ref()),
        _ => home.join(".codegenesis"),
    }
}
