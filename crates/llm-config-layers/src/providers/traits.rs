//! Core types shared by every configuration tier
//!
//! This module defines the error taxonomy, the resolution result contract,
//! and the `ConfigProvider` trait that lets the resolver walk the tiers in
//! a fixed order.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while initializing a backend or resolving a value
///
/// The type is `Clone` so that every caller sharing a single-flight
/// initialization observes the same settled failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The requested key was not found in this provider
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// The provider is not available or not configured
    #[error("Provider not available: {0}")]
    Unavailable(String),

    /// Authentication or authorization failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Configuration or parsing error, fatal at construction time
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Required values resolved to nothing across every tier
    #[error("Missing required configuration: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    /// A specific backend call failed
    #[error("Failed to fetch '{key}' from {backend}: {cause}")]
    Fetch {
        backend: &'static str,
        key: String,
        cause: Box<ProviderError>,
    },

    /// `wait_for_ready` exceeded its deadline
    #[error("{backend} did not become ready within {timeout_ms}ms")]
    InitializationTimeout {
        backend: &'static str,
        timeout_ms: u64,
    },

    /// Backend settled into `Failed` with fallback disabled
    #[error("{backend} initialization failed permanently: {cause}")]
    PermanentFailure {
        backend: &'static str,
        cause: Box<ProviderError>,
    },

    /// Initialization completed in degraded mode; callers should stop waiting
    #[error("{backend} completed initialization but is not operational; environment fallback is available")]
    NotOperational { backend: &'static str },

    /// Rate limiting or throttling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Timeout of a single backend call
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error (for file-based settings)
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ProviderError {
    /// Build a `Validation` error from any list of key names
    pub fn missing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProviderError::Validation {
            missing: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Wrap a backend failure with the key that was being fetched
    pub fn fetch(backend: &'static str, key: impl Into<String>, cause: ProviderError) -> Self {
        ProviderError::Fetch {
            backend,
            key: key.into(),
            cause: Box::new(cause),
        }
    }

    /// Errors that must stop startup rather than be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProviderError::PermanentFailure { .. }
                | ProviderError::ConfigurationError(_)
                | ProviderError::Validation { .. }
        )
    }

    /// Errors that may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::ConnectionError(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimited(_)
            | ProviderError::InitializationTimeout { .. } => true,
            ProviderError::Fetch { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for ProviderError {
    fn from(err: toml::de::Error) -> Self {
        ProviderError::ConfigurationError(format!("TOML error: {}", err))
    }
}

impl From<serde_yaml::Error> for ProviderError {
    fn from(err: serde_yaml::Error) -> Self {
        ProviderError::ConfigurationError(format!("YAML error: {}", err))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::SerializationError(err.to_string())
        } else {
            ProviderError::ConnectionError(err.to_string())
        }
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Which tier answered a lookup
///
/// Used for logging and resolver metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    RemoteSecret,
    RemoteFlag,
    Environment,
    Default,
    Cache,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::RemoteSecret => "remote_secret",
            ConfigSource::RemoteFlag => "remote_flag",
            ConfigSource::Environment => "environment",
            ConfigSource::Default => "default",
            ConfigSource::Cache => "cache",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value produced by one tier, before fallbacks are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierHit {
    /// The raw string value
    pub value: String,
    /// The tier the value originally came from
    pub source: ConfigSource,
    /// Whether it was served from that tier's cache
    pub cached: bool,
}

impl TierHit {
    pub fn fresh(value: impl Into<String>, source: ConfigSource) -> Self {
        Self {
            value: value.into(),
            source,
            cached: false,
        }
    }

    pub fn cached(value: impl Into<String>, source: ConfigSource) -> Self {
        Self {
            value: value.into(),
            source,
            cached: true,
        }
    }
}

/// Return contract of every "get config value" operation
///
/// `found == false` means explicitly absent; a found empty string is a
/// legitimate value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedValue {
    pub value: Option<String>,
    pub source: Option<ConfigSource>,
    pub found: bool,
    pub cached: bool,
}

impl ResolvedValue {
    /// A value resolved by the given tier
    pub fn found(value: impl Into<String>, source: ConfigSource) -> Self {
        Self {
            value: Some(value.into()),
            source: Some(source),
            found: true,
            cached: false,
        }
    }

    /// A value served from a backend client's own cache
    pub fn from_cache(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            source: Some(ConfigSource::Cache),
            found: true,
            cached: true,
        }
    }

    /// Nothing in any tier and no default
    pub fn not_found() -> Self {
        Self {
            value: None,
            source: None,
            found: false,
            cached: false,
        }
    }

    /// Client-level view of a tier hit: cache hits report `Cache`
    pub fn from_client_hit(hit: TierHit) -> Self {
        if hit.cached {
            Self::from_cache(hit.value)
        } else {
            Self::found(hit.value, hit.source)
        }
    }

    /// Resolver-level view of a tier hit: reports the originating tier
    pub fn from_tier_hit(hit: TierHit) -> Self {
        Self {
            value: Some(hit.value),
            source: Some(hit.source),
            found: true,
            cached: hit.cached,
        }
    }

    pub fn into_value(self) -> Option<String> {
        self.value
    }
}

/// A configuration tier the resolver can consult
///
/// `lookup` answers from the tier alone (its cache and its backend) and
/// never applies environment or default fallbacks; the resolver owns the
/// cross-tier precedence.
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync + fmt::Debug {
    /// Returns the unique name of this provider
    fn name(&self) -> &str;

    /// The source reported for fresh values from this tier
    fn source(&self) -> ConfigSource;

    /// Look a single key up in this tier only
    async fn lookup(&self, key: &str) -> ProviderResult<Option<TierHit>>;

    /// Look several keys up in this tier only
    ///
    /// Default implementation issues one `lookup` per key.
    async fn lookup_many(&self, keys: &[String]) -> ProviderResult<HashMap<String, TierHit>> {
        let mut hits = HashMap::new();
        for key in keys {
            if let Some(hit) = self.lookup(key).await? {
                hits.insert(key.clone(), hit);
            }
        }
        Ok(hits)
    }

    /// Get provider-specific health/status information
    fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy(self.name())
    }
}

/// Health status for a provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Provider name
    pub provider: String,
    /// Whether the provider is healthy
    pub healthy: bool,
    /// Optional status message
    pub message: Option<String>,
    /// When the backend last finished initializing
    pub initialized_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ProviderHealth {
    /// Create a healthy status
    pub fn healthy(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: true,
            message: None,
            initialized_at: None,
        }
    }

    /// Create an unhealthy status
    pub fn unhealthy(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: false,
            message: Some(message.into()),
            initialized_at: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_initialized_at(mut self, at: Option<chrono::DateTime<chrono::Utc>>) -> Self {
        self.initialized_at = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_key() {
        let err = ProviderError::missing(["DATABASE_URL", "REDIS_URL"]);
        assert_eq!(
            err.to_string(),
            "Missing required configuration: DATABASE_URL, REDIS_URL"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fetch_error_carries_key_and_cause() {
        let err = ProviderError::fetch(
            "secret_store",
            "API_KEY",
            ProviderError::ConnectionError("reset".into()),
        );
        let text = err.to_string();
        assert!(text.contains("API_KEY"));
        assert!(text.contains("reset"));
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_permanent_failure_is_not_retryable() {
        let err = ProviderError::PermanentFailure {
            backend: "secret_store",
            cause: Box::new(ProviderError::AuthenticationFailed("bad id".into())),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_client_and_tier_views_of_cache_hit() {
        let hit = TierHit::cached("v", ConfigSource::RemoteSecret);

        let client_view = ResolvedValue::from_client_hit(hit.clone());
        assert_eq!(client_view.source, Some(ConfigSource::Cache));
        assert!(client_view.cached);

        let tier_view = ResolvedValue::from_tier_hit(hit);
        assert_eq!(tier_view.source, Some(ConfigSource::RemoteSecret));
        assert!(tier_view.cached);
    }

    #[test]
    fn test_found_empty_string_is_distinct_from_absent() {
        let empty = ResolvedValue::found("", ConfigSource::Environment);
        assert!(empty.found);
        assert_eq!(empty.value.as_deref(), Some(""));

        let absent = ResolvedValue::not_found();
        assert!(!absent.found);
        assert!(absent.value.is_none());
    }

    #[test]
    fn test_provider_health() {
        let health = ProviderHealth::healthy("environment");
        assert!(health.healthy);

        let unhealthy = ProviderHealth::unhealthy("secret_store", "Connection failed");
        assert!(!unhealthy.healthy);
        assert_eq!(unhealthy.message.as_deref(), Some("Connection failed"));
    }
}
