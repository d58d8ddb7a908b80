//! Gateway shared state.

use std::sync::Arc;

use tracing::{info, warn};

use codegenesis_core::config::Config;
use codegenesis_core::store::{MemoryStore, RecordStore};
use codegenesis_providers::identity::{self, IdentityVerifier};
use codegenesis_providers::{CodeGenerator, HttpGenerator, SupabaseStore};

use crate::rate_limit::RateLimiter;
use crate::vault::KeyVault;

/// Shared gateway state accessible from all handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub generator: Option<Arc<dyn CodeGenerator>>,
    pub vault: Option<Arc<KeyVault>>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let rate_limiter = config
            .gateway
            .as_ref()
            .and_then(|g| g.rate_limit.as_ref())
            .map(|rl| Arc::new(RateLimiter::new(rl.max_requests_per_minute)));

        Self {
            config,
            store,
            identity,
            generator: None,
            vault: None,
            rate_limiter,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_vault(mut self, vault: KeyVault) -> Self {
        self.vault = Some(Arc::new(vault));
        self
    }

    /// Wire every collaborator from config.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn RecordStore> = match &config.supabase {
            Some(sb) => {
                let store = SupabaseStore::from_config(sb)?;
                info!(url = %store.base_url(), "Using Supabase record store");
                Arc::new(store)
            }
            None => {
                warn!("No Supabase configured; records are kept in memory and lost on exit");
                Arc::new(MemoryStore::new())
            }
        };

        let identity = identity::from_config(&config.auth())?;

        let generator = match &config.generation {
            Some(g) => {
                let generator = HttpGenerator::from_config(g)?;
                info!(endpoint = %generator.endpoint(), "Generation endpoint configured");
                Some(Arc::new(generator) as Arc<dyn CodeGenerator>)
            }
            None => None,
        };

        let vault = config
            .keys
            .as_ref()
            .and_then(|k| k.resolve_encryption_secret())
            .map(|secret| Arc::new(KeyVault::new(&secret)));

        let mut state = Self::new(Arc::new(config), store, identity);
        state.generator = generator;
        state.vault = vault;
        Ok(state)
    }

    /// The vault, or 503 when no encryption secret is configured.
    pub fn vault(&self) -> crate::error::ApiResult<&KeyVault> {
        self.vault.as_deref().ok_or_else(|| {
            crate::error::ApiError::Unavailable("API key storage is not configured".into())
        })
    }
}
