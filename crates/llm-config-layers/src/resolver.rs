//! Layered configuration resolver
//!
//! Walks the tiers in fixed precedence order:
//!
//! 1. credential store (secrets are provisioned per deployment)
//! 2. feature flags (intentionally mutable at runtime)
//! 3. environment
//! 4. caller-supplied default
//!
//! The first tier with a value wins. Each tier is asked through its
//! tier-only `lookup`, so a client's own environment fallback can never
//! shadow a lower-precedence tier out of order.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_config_layers::{ConfigResolver, EnvSnapshot, GetConfigOptions};
//!
//! let resolver = ConfigResolver::from_env(EnvSnapshot::from_process())?;
//! resolver.initialize().await?;
//!
//! let url = resolver
//!     .get_config("DATABASE_URL", GetConfigOptions::default())
//!     .await?;
//! println!("{:?} from {:?}", url.value, url.source);
//! ```

use crate::config::SubsystemSettings;
use crate::flags::FeatureFlagClient;
use crate::providers::{
    ConfigProvider, ConfigSource, EnvSnapshot, ProviderError, ProviderHealth, ProviderResult,
    ResolvedValue,
};
use crate::secrets::CredentialStoreClient;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Options for [`ConfigResolver::get_config`]
#[derive(Debug, Clone, Default)]
pub struct GetConfigOptions {
    /// Returned with source `Default` when no tier has the key
    pub default_value: Option<String>,
}

impl GetConfigOptions {
    pub fn with_default(value: impl Into<String>) -> Self {
        Self {
            default_value: Some(value.into()),
        }
    }
}

/// One resolution surface over both backend clients and the environment
#[derive(Clone)]
pub struct ConfigResolver {
    credentials: CredentialStoreClient,
    flags: FeatureFlagClient,
    env: EnvSnapshot,
    tiers: Vec<Arc<dyn ConfigProvider>>,
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("tiers", &self.tier_names())
            .finish()
    }
}

impl ConfigResolver {
    pub fn new(credentials: CredentialStoreClient, flags: FeatureFlagClient, env: EnvSnapshot) -> Self {
        let tiers: Vec<Arc<dyn ConfigProvider>> = vec![
            Arc::new(credentials.clone()),
            Arc::new(flags.clone()),
            Arc::new(env.clone()),
        ];
        Self {
            credentials,
            flags,
            env,
            tiers,
        }
    }

    /// Build both clients against their HTTP backends
    pub fn from_settings(settings: SubsystemSettings, env: EnvSnapshot) -> ProviderResult<Self> {
        let credentials = CredentialStoreClient::from_config(settings.secret_store, env.clone())?;
        let flags = FeatureFlagClient::from_config(settings.feature_flags, credentials.clone(), env.clone())?;
        Ok(Self::new(credentials, flags, env))
    }

    /// Build from `INFISICAL_*` and `UNLEASH_*` variables in `env`
    pub fn from_env(env: EnvSnapshot) -> ProviderResult<Self> {
        let settings = SubsystemSettings::from_env(&env)?;
        Self::from_settings(settings, env)
    }

    pub fn credentials(&self) -> &CredentialStoreClient {
        &self.credentials
    }

    pub fn flags(&self) -> &FeatureFlagClient {
        &self.flags
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Tier names in precedence order
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Initialize the credential store, then the flag client
    ///
    /// Degraded backends are tolerated; only failures of a backend with
    /// fallback disabled are returned.
    pub async fn initialize(&self) -> ProviderResult<()> {
        self.credentials.initialize().await?;
        self.flags.initialize().await?;
        info!(
            secrets_operational = self.credentials.is_operational(),
            flags_operational = self.flags.is_operational(),
            "Configuration resolver initialized"
        );
        Ok(())
    }

    /// Wait for both backends, sharing one deadline
    pub async fn wait_for_ready(&self, timeout: Duration, retry_interval: Duration) -> ProviderResult<()> {
        let deadline = Instant::now() + timeout;
        self.credentials
            .wait_for_ready(timeout, retry_interval)
            .await?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.flags.wait_for_ready(remaining, retry_interval).await
    }

    /// Resolve one key across every tier
    pub async fn get_config(&self, key: &str, options: GetConfigOptions) -> ProviderResult<ResolvedValue> {
        for tier in &self.tiers {
            if let Some(hit) = tier.lookup(key).await? {
                debug!(key, source = %hit.source, cached = hit.cached, "Resolved configuration value");
                return Ok(ResolvedValue::from_tier_hit(hit));
            }
        }
        Ok(resolve_default(key, options.default_value))
    }

    /// [`Self::get_config`] without a default
    pub async fn get_config_with_metadata(&self, key: &str) -> ProviderResult<ResolvedValue> {
        self.get_config(key, GetConfigOptions::default()).await
    }

    /// Resolve several keys; absent keys map to `None`
    pub async fn get_configs(&self, keys: &[String]) -> ProviderResult<HashMap<String, Option<String>>> {
        self.get_configs_with_defaults(keys, &HashMap::new()).await
    }

    /// Resolve several keys with per-key defaults
    pub async fn get_configs_with_defaults(
        &self,
        keys: &[String],
        defaults: &HashMap<String, String>,
    ) -> ProviderResult<HashMap<String, Option<String>>> {
        Ok(self
            .get_configs_with_metadata(keys, defaults)
            .await?
            .into_iter()
            .map(|(key, resolved)| (key, resolved.value))
            .collect())
    }

    /// Batch resolution keeping source and cache metadata
    ///
    /// Each tier is asked once for every key still unresolved.
    pub async fn get_configs_with_metadata(
        &self,
        keys: &[String],
        defaults: &HashMap<String, String>,
    ) -> ProviderResult<HashMap<String, ResolvedValue>> {
        let mut remaining: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            if !remaining.contains(key) {
                remaining.push(key.clone());
            }
        }

        let mut resolved = HashMap::with_capacity(remaining.len());
        for tier in &self.tiers {
            if remaining.is_empty() {
                break;
            }
            let mut hits = tier.lookup_many(&remaining).await?;
            remaining.retain(|key| match hits.remove(key) {
                Some(hit) => {
                    resolved.insert(key.clone(), ResolvedValue::from_tier_hit(hit));
                    false
                }
                None => true,
            });
        }

        for key in remaining {
            let value = resolve_default(&key, defaults.get(&key).cloned());
            resolved.insert(key, value);
        }

        Ok(resolved)
    }

    /// Resolve every key or fail listing all that are missing
    pub async fn require(&self, keys: &[String]) -> ProviderResult<HashMap<String, String>> {
        let mut resolved = self.get_configs_with_metadata(keys, &HashMap::new()).await?;
        let mut values = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();

        for key in keys {
            match resolved.remove(key).and_then(ResolvedValue::into_value) {
                Some(value) => {
                    values.insert(key.clone(), value);
                }
                None if !missing.contains(key) && !values.contains_key(key) => missing.push(key.clone()),
                None => {}
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            Err(ProviderError::missing(missing))
        }
    }

    pub fn health_check_all(&self) -> Vec<ProviderHealth> {
        self.tiers.iter().map(|t| t.health_check()).collect()
    }

    pub fn health_summary(&self) -> ResolverHealthSummary {
        let providers = self.health_check_all();
        let total = providers.len();
        let healthy = providers.iter().filter(|h| h.healthy).count();

        ResolverHealthSummary {
            total_providers: total,
            healthy_providers: healthy,
            unhealthy_providers: total - healthy,
            providers,
        }
    }

    /// Clear both backend caches
    pub fn clear_caches(&self) {
        self.credentials.clear_cache();
        self.flags.clear_cache();
    }
}

fn resolve_default(key: &str, default: Option<String>) -> ResolvedValue {
    match default {
        Some(value) => {
            debug!(key, "Using default value");
            ResolvedValue::found(value, ConfigSource::Default)
        }
        None => {
            debug!(key, "No tier has a value and no default was given");
            ResolvedValue::not_found()
        }
    }
}

/// Health of every tier
#[derive(Debug, Clone, Serialize)]
pub struct ResolverHealthSummary {
    pub total_providers: usize,
    pub healthy_providers: usize,
    pub unhealthy_providers: usize,
    pub providers: Vec<ProviderHealth>,
}

impl ResolverHealthSummary {
    pub fn all_healthy(&self) -> bool {
        self.unhealthy_providers == 0
    }

    /// The environment tier keeps this true in practice
    pub fn any_healthy(&self) -> bool {
        self.healthy_providers > 0
    }
}
