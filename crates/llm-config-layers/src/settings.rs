//! Typed configuration objects
//!
//! Each builder resolves its keys through [`ConfigResolver`] in one batch.
//! Missing required keys are reported together in a single
//! [`ProviderError::Validation`]; values that fail to parse are a
//! [`ProviderError::ConfigurationError`]. A required key that resolves to a
//! blank string counts as missing.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_config_layers::settings::DatabaseSettings;
//!
//! let database = DatabaseSettings::load(&resolver).await?;
//! let pool = connect(database.url.expose_secret(), database.max_connections).await?;
//! ```

use crate::providers::{ProviderError, ProviderResult};
use crate::resolver::ConfigResolver;
use secrecy::SecretString;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Relational database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// `DATABASE_URL` (required)
    pub url: SecretString,
    /// `DATABASE_MAX_CONNECTIONS`, default 10
    pub max_connections: u32,
    /// `DATABASE_CONNECT_TIMEOUT_MS`, default 5000
    pub connect_timeout: Duration,
}

impl DatabaseSettings {
    pub const REQUIRED: &'static [&'static str] = &["DATABASE_URL"];
    pub const OPTIONAL: &'static [&'static str] =
        &["DATABASE_MAX_CONNECTIONS", "DATABASE_CONNECT_TIMEOUT_MS"];

    pub async fn load(resolver: &ConfigResolver) -> ProviderResult<Self> {
        let values = Resolved::fetch(resolver, Self::REQUIRED, Self::OPTIONAL).await?;
        Ok(Self {
            url: SecretString::new(values.required("DATABASE_URL")?),
            max_connections: values.parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            connect_timeout: Duration::from_millis(values.parse_or("DATABASE_CONNECT_TIMEOUT_MS", 5_000)?),
        })
    }
}

/// Shared cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// `REDIS_URL` (required)
    pub redis_url: String,
    /// `CACHE_TTL_SECONDS`, default 3600
    pub ttl: Duration,
    /// `CACHE_KEY_PREFIX`, default `llm-config:`
    pub key_prefix: String,
}

impl CacheSettings {
    pub const REQUIRED: &'static [&'static str] = &["REDIS_URL"];
    pub const OPTIONAL: &'static [&'static str] = &["CACHE_TTL_SECONDS", "CACHE_KEY_PREFIX"];

    pub async fn load(resolver: &ConfigResolver) -> ProviderResult<Self> {
        let values = Resolved::fetch(resolver, Self::REQUIRED, Self::OPTIONAL).await?;
        Ok(Self {
            redis_url: values.required("REDIS_URL")?,
            ttl: Duration::from_secs(values.parse_or("CACHE_TTL_SECONDS", 3_600)?),
            key_prefix: values
                .optional("CACHE_KEY_PREFIX")
                .unwrap_or("llm-config:")
                .to_string(),
        })
    }
}

/// LLM provider settings
#[derive(Debug, Clone)]
pub struct ModelProviderSettings {
    /// `LLM_PROVIDER`, default `openai`
    pub provider: String,
    /// `LLM_API_KEY` (required)
    pub api_key: SecretString,
    /// `LLM_MODEL` (required)
    pub model: String,
    /// `LLM_BASE_URL`
    pub base_url: Option<String>,
    /// `LLM_MAX_TOKENS`, default 4096
    pub max_tokens: u32,
    /// `LLM_TEMPERATURE`, default 0.7, within `0.0..=2.0`
    pub temperature: f32,
}

impl ModelProviderSettings {
    pub const REQUIRED: &'static [&'static str] = &["LLM_API_KEY", "LLM_MODEL"];
    pub const OPTIONAL: &'static [&'static str] =
        &["LLM_PROVIDER", "LLM_BASE_URL", "LLM_MAX_TOKENS", "LLM_TEMPERATURE"];

    pub async fn load(resolver: &ConfigResolver) -> ProviderResult<Self> {
        let values = Resolved::fetch(resolver, Self::REQUIRED, Self::OPTIONAL).await?;
        let temperature: f32 = values.parse_or("LLM_TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ProviderError::ConfigurationError(format!(
                "LLM_TEMPERATURE must be between 0.0 and 2.0, got {}",
                temperature
            )));
        }
        Ok(Self {
            provider: values.optional("LLM_PROVIDER").unwrap_or("openai").to_string(),
            api_key: SecretString::new(values.required("LLM_API_KEY")?),
            model: values.required("LLM_MODEL")?,
            base_url: values.optional("LLM_BASE_URL").map(str::to_string),
            max_tokens: values.parse_or("LLM_MAX_TOKENS", 4_096)?,
            temperature,
        })
    }
}

/// One batch of resolved values
struct Resolved {
    values: HashMap<String, Option<String>>,
}

impl Resolved {
    async fn fetch(
        resolver: &ConfigResolver,
        required: &[&str],
        optional: &[&str],
    ) -> ProviderResult<Self> {
        let keys: Vec<String> = required
            .iter()
            .chain(optional)
            .map(|k| k.to_string())
            .collect();
        let resolved = Self {
            values: resolver.get_configs(&keys).await?,
        };

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| resolved.optional(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ProviderError::missing(missing));
        }
        Ok(resolved)
    }

    /// A non-blank value, trimmed
    fn optional(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> ProviderResult<String> {
        self.optional(key)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::missing([key]))
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> ProviderResult<T> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                ProviderError::ConfigurationError(format!("{} has an invalid value '{}'", key, raw))
            }),
        }
    }
}
