//! Record shapes exchanged with the persistence collaborator.
//!
//! Field names match the stored columns (snake_case) so records round-trip
//! through the store as plain JSON.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated user identifier, as issued by the identity provider.
pub type UserId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub slug: String,
    #[serde(default = "default_framework")]
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_framework() -> String {
    "vanilla".into()
}

fn default_status() -> String {
    "active".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub content: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "plaintext".into()
}

/// A chat thread attached to a project in the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectChat {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// An agent-page conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: UserId,
    pub role: String,
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_message_type() -> String {
    "text".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Anything else the settings page stores.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Model providers a user may store an API key for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyProvider {
    Openai,
    Anthropic,
    Openrouter,
    Groq,
    Stability,
}

impl KeyProvider {
    pub const ALL: [KeyProvider; 5] = [
        KeyProvider::Openai,
        KeyProvider::Anthropic,
        KeyProvider::Openrouter,
        KeyProvider::Groq,
        KeyProvider::Stability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyProvider::Openai => "openai",
            KeyProvider::Anthropic => "anthropic",
            KeyProvider::Openrouter => "openrouter",
            KeyProvider::Groq => "groq",
            KeyProvider::Stability => "stability",
        }
    }
}

impl fmt::Display for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyProvider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

/// An encrypted API key row. `encrypted_key` never leaves the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub provider: KeyProvider,
    pub encrypted_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Public view of a configured provider (no key material).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredProvider {
    pub provider: KeyProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKeyRecord> for ConfiguredProvider {
    fn from(r: &ApiKeyRecord) -> Self {
        Self {
            provider: r.provider,
            key_name: r.key_name.clone(),
            is_active: r.is_active,
            last_used_at: r.last_used_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPreference {
    pub user_id: UserId,
    pub provider: KeyProvider,
    pub model_id: String,
    #[serde(default)]
    pub is_custom: bool,
}

/// Build a URL-safe project slug: `<name>-<base36 millis>`, lowercased, with
/// every character outside `[a-z0-9-]` replaced by `-`.
pub fn project_slug(name: &str, now: DateTime<Utc>) -> String {
    let stamp = to_base36(now.timestamp_millis().max(0) as u64);
    format!("{name}-{stamp}")
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
