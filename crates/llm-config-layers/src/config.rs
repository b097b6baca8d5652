//! Backend client configuration
//!
//! Both configs are immutable once a client is built. They can be read from
//! an [`EnvSnapshot`], deserialized from a settings file, or assembled with
//! the `with_*` builders. Malformed numbers and booleans are rejected at
//! construction time.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_config_layers::{EnvSnapshot, SecretStoreConfig};
//!
//! let env = EnvSnapshot::from_process();
//! let config = SecretStoreConfig::from_env(&env)?;
//! println!("{}", serde_json::to_string(&config.sanitized())?);
//! ```

use crate::providers::{EnvSnapshot, ProviderError, ProviderResult};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CREDENTIAL_WAIT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CREDENTIAL_RETRY_INTERVAL_MS: u64 = 1_000;

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_site_url() -> String {
    "https://app.infisical.com".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_app_name() -> String {
    "llm-config".to_string()
}

fn default_token_secret_key() -> String {
    "UNLEASH_API_TOKEN".to_string()
}

fn default_credential_wait_timeout_ms() -> u64 {
    DEFAULT_CREDENTIAL_WAIT_TIMEOUT_MS
}

fn default_credential_retry_interval_ms() -> u64 {
    DEFAULT_CREDENTIAL_RETRY_INTERVAL_MS
}

/// Configuration for the remote secret store client
#[derive(Debug, Clone, Deserialize)]
pub struct SecretStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the secret store
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Machine identity client id
    #[serde(default)]
    pub client_id: Option<String>,
    /// Machine identity client secret
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    /// Project (workspace) holding the secrets
    #[serde(default)]
    pub project_id: Option<String>,
    /// Environment slug inside the project
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Degrade to environment/defaults instead of failing
    #[serde(default = "default_true")]
    pub fallback_to_env: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            site_url: default_site_url(),
            client_id: None,
            client_secret: None,
            project_id: None,
            environment: default_environment(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            fallback_to_env: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl SecretStoreConfig {
    /// Load configuration from environment variables
    ///
    /// Reads:
    /// - INFISICAL_ENABLED: enable the remote secret store
    /// - INFISICAL_SITE_URL: base URL
    /// - INFISICAL_CLIENT_ID / INFISICAL_CLIENT_SECRET: machine identity
    /// - INFISICAL_PROJECT_ID: project holding the secrets
    /// - INFISICAL_ENVIRONMENT: environment slug
    /// - INFISICAL_CACHE_TTL: cache TTL in milliseconds
    /// - INFISICAL_FALLBACK_TO_ENV: degrade instead of failing
    /// - INFISICAL_TIMEOUT: request timeout in milliseconds
    pub fn from_env(env: &EnvSnapshot) -> ProviderResult<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: env.parse_bool("INFISICAL_ENABLED")?.unwrap_or(false),
            site_url: env
                .get_non_empty("INFISICAL_SITE_URL")
                .map(str::to_string)
                .unwrap_or(defaults.site_url),
            client_id: env.get_non_empty("INFISICAL_CLIENT_ID").map(str::to_string),
            client_secret: env
                .get_non_empty("INFISICAL_CLIENT_SECRET")
                .map(|s| SecretString::new(s.to_string())),
            project_id: env.get_non_empty("INFISICAL_PROJECT_ID").map(str::to_string),
            environment: env
                .get_non_empty("INFISICAL_ENVIRONMENT")
                .map(str::to_string)
                .unwrap_or(defaults.environment),
            cache_ttl_ms: env
                .parse_u64("INFISICAL_CACHE_TTL")?
                .unwrap_or(DEFAULT_CACHE_TTL_MS),
            fallback_to_env: env
                .parse_bool("INFISICAL_FALLBACK_TO_ENV")?
                .unwrap_or(true),
            timeout_ms: env
                .parse_u64("INFISICAL_TIMEOUT")?
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that cannot be expressed in the types
    pub fn validate(&self) -> ProviderResult<()> {
        if self.enabled && self.project_id.as_deref().map_or(true, str::is_empty) {
            return Err(ProviderError::ConfigurationError(
                "secret store is enabled but no project id is configured".into(),
            ));
        }
        if self.enabled && self.site_url.trim().is_empty() {
            return Err(ProviderError::ConfigurationError(
                "secret store is enabled but its site URL is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = url.into();
        self
    }

    /// Set machine identity credentials
    pub fn with_identity(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>, environment: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self.environment = environment.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = duration_ms(ttl);
        self
    }

    pub fn with_fallback_to_env(mut self, fallback: bool) -> Self {
        self.fallback_to_env = fallback;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Secret-free view for diagnostics
    pub fn sanitized(&self) -> SanitizedSecretStoreConfig {
        SanitizedSecretStoreConfig {
            enabled: self.enabled,
            site_url: self.site_url.clone(),
            project_id: self.project_id.clone(),
            environment: self.environment.clone(),
            has_client_id: self.client_id.is_some(),
            has_client_secret: self.client_secret.is_some(),
            cache_ttl_ms: self.cache_ttl_ms,
            fallback_to_env: self.fallback_to_env,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Diagnostic view of [`SecretStoreConfig`] without credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedSecretStoreConfig {
    pub enabled: bool,
    pub site_url: String,
    pub project_id: Option<String>,
    pub environment: String,
    pub has_client_id: bool,
    pub has_client_secret: bool,
    pub cache_ttl_ms: u64,
    pub fallback_to_env: bool,
    pub timeout_ms: u64,
}

/// Configuration for the remote feature-flag client
#[derive(Debug, Clone, Deserialize)]
pub struct FlagServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the flag service
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Access token supplied directly; used as the default when the
    /// secret store has no value under `token_secret_key`
    #[serde(default)]
    pub api_token: Option<SecretString>,
    /// Name of the secret holding the access token
    #[serde(default = "default_token_secret_key")]
    pub token_secret_key: String,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_true")]
    pub fallback_to_env: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long to wait for the secret store before initializing
    #[serde(default = "default_credential_wait_timeout_ms")]
    pub credential_wait_timeout_ms: u64,
    #[serde(default = "default_credential_retry_interval_ms")]
    pub credential_retry_interval_ms: u64,
}

impl Default for FlagServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            app_name: default_app_name(),
            environment: default_environment(),
            api_token: None,
            token_secret_key: default_token_secret_key(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            fallback_to_env: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            credential_wait_timeout_ms: DEFAULT_CREDENTIAL_WAIT_TIMEOUT_MS,
            credential_retry_interval_ms: DEFAULT_CREDENTIAL_RETRY_INTERVAL_MS,
        }
    }
}

impl FlagServiceConfig {
    /// Load configuration from environment variables
    ///
    /// Reads the `UNLEASH_*` family: ENABLED, URL, APP_NAME, ENVIRONMENT,
    /// API_TOKEN, TOKEN_SECRET_KEY, CACHE_TTL, FALLBACK_TO_ENV, TIMEOUT,
    /// CREDENTIAL_WAIT_TIMEOUT and CREDENTIAL_RETRY_INTERVAL.
    pub fn from_env(env: &EnvSnapshot) -> ProviderResult<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: env.parse_bool("UNLEASH_ENABLED")?.unwrap_or(false),
            url: env.get_non_empty("UNLEASH_URL").map(str::to_string),
            app_name: env
                .get_non_empty("UNLEASH_APP_NAME")
                .map(str::to_string)
                .unwrap_or(defaults.app_name),
            environment: env
                .get_non_empty("UNLEASH_ENVIRONMENT")
                .map(str::to_string)
                .unwrap_or(defaults.environment),
            api_token: env
                .get_non_empty("UNLEASH_API_TOKEN")
                .map(|s| SecretString::new(s.to_string())),
            token_secret_key: env
                .get_non_empty("UNLEASH_TOKEN_SECRET_KEY")
                .map(str::to_string)
                .unwrap_or(defaults.token_secret_key),
            cache_ttl_ms: env
                .parse_u64("UNLEASH_CACHE_TTL")?
                .unwrap_or(DEFAULT_CACHE_TTL_MS),
            fallback_to_env: env.parse_bool("UNLEASH_FALLBACK_TO_ENV")?.unwrap_or(true),
            timeout_ms: env.parse_u64("UNLEASH_TIMEOUT")?.unwrap_or(DEFAULT_TIMEOUT_MS),
            credential_wait_timeout_ms: env
                .parse_u64("UNLEASH_CREDENTIAL_WAIT_TIMEOUT")?
                .unwrap_or(DEFAULT_CREDENTIAL_WAIT_TIMEOUT_MS),
            credential_retry_interval_ms: env
                .parse_u64("UNLEASH_CREDENTIAL_RETRY_INTERVAL")?
                .unwrap_or(DEFAULT_CREDENTIAL_RETRY_INTERVAL_MS),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ProviderResult<()> {
        if self.enabled && self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(ProviderError::ConfigurationError(
                "flag service is enabled but no URL is configured".into(),
            ));
        }
        if self.token_secret_key.trim().is_empty() {
            return Err(ProviderError::ConfigurationError(
                "flag service token secret key must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_app(mut self, app_name: impl Into<String>, environment: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self.environment = environment.into();
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::new(token.into()));
        self
    }

    pub fn with_token_secret_key(mut self, key: impl Into<String>) -> Self {
        self.token_secret_key = key.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = duration_ms(ttl);
        self
    }

    pub fn with_fallback_to_env(mut self, fallback: bool) -> Self {
        self.fallback_to_env = fallback;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// Bound the wait on the secret store during initialization
    pub fn with_credential_wait(mut self, timeout: Duration, retry_interval: Duration) -> Self {
        self.credential_wait_timeout_ms = duration_ms(timeout);
        self.credential_retry_interval_ms = duration_ms(retry_interval);
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn credential_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.credential_wait_timeout_ms)
    }

    pub fn credential_retry_interval(&self) -> Duration {
        Duration::from_millis(self.credential_retry_interval_ms)
    }

    /// Secret-free view for diagnostics
    pub fn sanitized(&self) -> SanitizedFlagServiceConfig {
        SanitizedFlagServiceConfig {
            enabled: self.enabled,
            url: self.url.clone(),
            app_name: self.app_name.clone(),
            environment: self.environment.clone(),
            has_api_token: self.api_token.is_some(),
            token_secret_key: self.token_secret_key.clone(),
            cache_ttl_ms: self.cache_ttl_ms,
            fallback_to_env: self.fallback_to_env,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Diagnostic view of [`FlagServiceConfig`] without the access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedFlagServiceConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub app_name: String,
    pub environment: String,
    pub has_api_token: bool,
    pub token_secret_key: String,
    pub cache_ttl_ms: u64,
    pub fallback_to_env: bool,
    pub timeout_ms: u64,
}

/// Both backend configs, as loaded from a settings file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubsystemSettings {
    #[serde(default)]
    pub secret_store: SecretStoreConfig,
    #[serde(default)]
    pub feature_flags: FlagServiceConfig,
}

impl SubsystemSettings {
    /// Read both configs from an environment snapshot
    pub fn from_env(env: &EnvSnapshot) -> ProviderResult<Self> {
        Ok(Self {
            secret_store: SecretStoreConfig::from_env(env)?,
            feature_flags: FlagServiceConfig::from_env(env)?,
        })
    }

    pub fn from_toml_str(content: &str) -> ProviderResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_str(content: &str) -> ProviderResult<Self> {
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load a `.toml`, `.yaml` or `.yml` settings file
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(ProviderError::ConfigurationError(format!(
                "unsupported settings file format: {}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        self.secret_store.validate()?;
        self.feature_flags.validate()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
