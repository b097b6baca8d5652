//! Layered runtime configuration for LLM services.
//!
//! Values are resolved by logical name from, in order of precedence:
//!
//! ```text
//! CredentialStoreClient   remote secret store (Infisical)
//!   > FeatureFlagClient   variant payloads of the flag service (Unleash)
//!     > EnvSnapshot       process environment, optionally over a .env file
//!       > default         supplied by the caller
//! ```
//!
//! # Startup
//!
//! 1. `CredentialStoreClient::initialize` authenticates and probes the store.
//! 2. `FeatureFlagClient::initialize` waits for the credential store, reads
//!    its own access token from it, then connects.
//! 3. `ConfigResolver::initialize` drives both and tolerates degraded
//!    backends whose fallback is enabled.
//!
//! Each backend initializes at most once at a time; concurrent callers share
//! the outcome. See [`readiness`].

pub mod config;
pub mod flags;
pub mod providers;
pub mod readiness;
pub mod resolver;
pub mod secrets;
pub mod settings;

pub use config::{
    FlagServiceConfig, SanitizedFlagServiceConfig, SanitizedSecretStoreConfig, SecretStoreConfig,
    SubsystemSettings,
};
pub use flags::{FeatureFlagClient, FlagContext, Variant};
pub use providers::{
    ConfigProvider, ConfigSource, EnvSnapshot, ProviderError, ProviderHealth, ProviderResult,
    ResolvedValue, TierHit,
};
pub use readiness::{wait_for_ready, InitializationState, Readiness, ReadinessCoordinator};
pub use resolver::{ConfigResolver, GetConfigOptions, ResolverHealthSummary};
pub use secrets::CredentialStoreClient;
pub use settings::{CacheSettings, DatabaseSettings, ModelProviderSettings};
