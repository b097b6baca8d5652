//! Credential store client
//!
//! Wraps the remote secret store behind a TTL cache, a single-flight
//! initialization barrier and the fallback chain
//! `cache → remote store → environment → default`.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_config_layers::{CredentialStoreClient, EnvSnapshot, SecretStoreConfig};
//!
//! let env = EnvSnapshot::from_process();
//! let secrets = CredentialStoreClient::from_config(SecretStoreConfig::from_env(&env)?, env)?;
//! secrets.initialize().await?;
//! let url = secrets.get_secret("DATABASE_URL", None).await?;
//! ```

pub mod api;
pub mod infisical;

pub use api::{RemoteSecret, SecretListing, SecretStoreApi, SecretStoreIdentity, SessionToken};
pub use infisical::InfisicalApi;

use crate::config::{SanitizedSecretStoreConfig, SecretStoreConfig};
use crate::providers::{
    ConfigProvider, ConfigSource, EnvSnapshot, ProviderError, ProviderHealth, ProviderResult,
    ResolvedValue, TierHit, TtlCache,
};
use crate::readiness::{
    self, InitializationState, Readiness, ReadinessCoordinator, DEFAULT_READY_TIMEOUT,
    DEFAULT_RETRY_INTERVAL,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backend name used in errors, logs and health reports
pub const BACKEND: &str = "secret_store";

/// Client for the remote secret store
///
/// Cheap to clone; clones share cache, session and readiness.
#[derive(Debug, Clone)]
pub struct CredentialStoreClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: SecretStoreConfig,
    api: Arc<dyn SecretStoreApi>,
    env: EnvSnapshot,
    cache: TtlCache,
    session: RwLock<Option<SessionToken>>,
    operational: AtomicBool,
    readiness: ReadinessCoordinator,
}

impl CredentialStoreClient {
    /// Create a client over an explicit API implementation
    pub fn new(
        config: SecretStoreConfig,
        api: Arc<dyn SecretStoreApi>,
        env: EnvSnapshot,
    ) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                cache: TtlCache::new(config.cache_ttl()),
                config,
                api,
                env,
                session: RwLock::new(None),
                operational: AtomicBool::new(false),
                readiness: ReadinessCoordinator::new(BACKEND),
            }),
        })
    }

    /// Create a client talking to Infisical over HTTP
    pub fn from_config(config: SecretStoreConfig, env: EnvSnapshot) -> ProviderResult<Self> {
        let api = InfisicalApi::new(config.site_url.clone(), config.timeout())?;
        Self::new(config, Arc::new(api), env)
    }

    /// Authenticate and probe the store, once
    ///
    /// No-op when disabled. With `fallback_to_env` an authentication or
    /// probe failure leaves the client degraded and returns `Ok(())`;
    /// otherwise the failure is returned and the client settles `Failed`.
    pub async fn initialize(&self) -> ProviderResult<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .readiness
            .ensure_initialized(move || inner.run_initialize())
            .await
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    pub fn state(&self) -> InitializationState {
        self.inner.readiness.state()
    }

    /// Disabled, or initialized with a live session
    pub fn is_ready(&self) -> bool {
        !self.is_enabled()
            || (self.state() == InitializationState::Initialized && self.inner.has_session())
    }

    /// Initialized, probed successfully and holding a session
    pub fn is_operational(&self) -> bool {
        self.inner.operational_session().is_some()
    }

    /// Wait until ready; see [`readiness::wait_for_ready`]
    pub async fn wait_for_ready(&self, timeout: Duration, retry_interval: Duration) -> ProviderResult<()> {
        readiness::wait_for_ready(self, timeout, retry_interval).await
    }

    /// [`Self::wait_for_ready`] with the default deadline and interval
    pub async fn wait_until_ready(&self) -> ProviderResult<()> {
        self.wait_for_ready(DEFAULT_READY_TIMEOUT, DEFAULT_RETRY_INTERVAL)
            .await
    }

    /// Resolve one secret: cache, remote store, environment, `default`
    pub async fn get_secret(&self, key: &str, default: Option<&str>) -> ProviderResult<ResolvedValue> {
        if let Some(hit) = self.lookup(key).await? {
            return Ok(ResolvedValue::from_client_hit(hit));
        }
        Ok(self.inner.env.resolve_fallback(key, default))
    }

    /// Resolve several secrets with a single remote list call
    ///
    /// Misses fall back to the environment. Without a live store every key
    /// goes through [`Self::get_secret`].
    pub async fn get_secrets(&self, keys: &[String]) -> ProviderResult<HashMap<String, Option<String>>> {
        let mut resolved = HashMap::with_capacity(keys.len());

        match self.inner.fetch_all().await? {
            Some(remote) => {
                for key in keys {
                    let value = remote
                        .get(key)
                        .cloned()
                        .or_else(|| self.inner.env.get(key).map(str::to_string));
                    resolved.insert(key.clone(), value);
                }
            }
            None => {
                for key in keys {
                    let value = self.get_secret(key, None).await?.into_value();
                    resolved.insert(key.clone(), value);
                }
            }
        }

        Ok(resolved)
    }

    /// Cache and remote store only, no environment or default
    pub async fn lookup(&self, key: &str) -> ProviderResult<Option<TierHit>> {
        if let Some(entry) = self.inner.cache.get(key) {
            debug!(backend = BACKEND, key, "Cache hit");
            return Ok(Some(TierHit::cached(entry.value, entry.source)));
        }

        let Some(session) = self.inner.operational_session() else {
            return Ok(None);
        };

        let config = &self.inner.config;
        let project = config.project_id.as_deref().unwrap_or_default();
        let fetched = self
            .inner
            .call(
                self.inner
                    .api
                    .get_secret(&session, project, &config.environment, key),
            )
            .await;

        match fetched {
            Ok(Some(secret)) => {
                self.inner
                    .cache
                    .insert(key, secret.value.clone(), ConfigSource::RemoteSecret);
                Ok(Some(TierHit::fresh(secret.value, ConfigSource::RemoteSecret)))
            }
            Ok(None) => {
                debug!(backend = BACKEND, key, "Secret not found in store");
                Ok(None)
            }
            Err(err) if config.fallback_to_env => {
                warn!(backend = BACKEND, key, error = %err, "Secret fetch failed, falling back");
                Ok(None)
            }
            Err(err) => Err(ProviderError::fetch(BACKEND, key, err)),
        }
    }

    /// Batch form of [`Self::lookup`] backed by one list call
    pub async fn lookup_many(&self, keys: &[String]) -> ProviderResult<HashMap<String, TierHit>> {
        let mut hits = HashMap::new();
        match self.inner.fetch_all().await? {
            Some(mut remote) => {
                for key in keys {
                    if let Some(value) = remote.remove(key) {
                        hits.insert(key.clone(), TierHit::fresh(value, ConfigSource::RemoteSecret));
                    }
                }
            }
            None => {
                for key in keys {
                    if let Some(hit) = self.lookup(key).await? {
                        hits.insert(key.clone(), hit);
                    }
                }
            }
        }
        Ok(hits)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop session and cache and return to `Idle`
    ///
    /// Refused while an initialization is in flight.
    pub fn reset(&self) -> bool {
        if !self.inner.readiness.reset() {
            return false;
        }
        self.inner.operational.store(false, Ordering::SeqCst);
        self.inner.set_session(None);
        self.inner.cache.clear();
        true
    }

    /// Secret-free view of the configuration
    pub fn sanitized_config(&self) -> SanitizedSecretStoreConfig {
        self.inner.config.sanitized()
    }

    pub fn health_check(&self) -> ProviderHealth {
        let initialized_at = self.inner.readiness.initialized_at();
        let health = if !self.is_enabled() {
            ProviderHealth::healthy(BACKEND).with_message("disabled; environment and defaults only")
        } else if self.is_operational() {
            ProviderHealth::healthy(BACKEND)
        } else {
            match self.state() {
                InitializationState::Initialized => {
                    ProviderHealth::unhealthy(BACKEND, "degraded; using environment fallback")
                }
                InitializationState::Failed => ProviderHealth::unhealthy(BACKEND, "initialization failed"),
                state => ProviderHealth::unhealthy(BACKEND, format!("not ready ({})", state)),
            }
        };
        health.with_initialized_at(initialized_at)
    }
}

impl Inner {
    async fn run_initialize(self: Arc<Self>) -> ProviderResult<()> {
        if !self.config.enabled {
            info!(backend = BACKEND, "Secret store disabled; using environment and defaults");
            return Ok(());
        }

        match self.connect().await {
            Ok(secret_count) => {
                self.operational.store(true, Ordering::SeqCst);
                info!(backend = BACKEND, secret_count, "Secret store initialized");
                Ok(())
            }
            Err(err) => {
                self.operational.store(false, Ordering::SeqCst);
                self.set_session(None);
                if self.config.fallback_to_env {
                    warn!(backend = BACKEND, error = %err, "Secret store unavailable; continuing with environment fallback");
                    Ok(())
                } else {
                    error!(backend = BACKEND, error = %err, "Secret store initialization failed");
                    Err(err)
                }
            }
        }
    }

    /// Authenticate, then probe with one list call; returns the secret count
    async fn connect(&self) -> ProviderResult<usize> {
        let identity = self.identity()?;
        let session = self.call(self.api.authenticate(&identity)).await?;
        self.set_session(Some(session.clone()));

        let project = self.config.project_id.as_deref().unwrap_or_default();
        let listing = self
            .call(
                self.api
                    .list_secrets(&session, project, &self.config.environment),
            )
            .await?;
        Ok(listing.into_secrets().len())
    }

    fn identity(&self) -> ProviderResult<SecretStoreIdentity> {
        match (&self.config.client_id, &self.config.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(SecretStoreIdentity {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => Err(ProviderError::AuthenticationFailed(
                "machine identity (client id and secret) is not configured".into(),
            )),
        }
    }

    /// One list call, caching every secret; `None` when not operational
    /// or when the call failed and fallback is enabled
    async fn fetch_all(&self) -> ProviderResult<Option<HashMap<String, String>>> {
        let Some(session) = self.operational_session() else {
            return Ok(None);
        };

        let project = self.config.project_id.as_deref().unwrap_or_default();
        let listed = self
            .call(
                self.api
                    .list_secrets(&session, project, &self.config.environment),
            )
            .await;

        match listed {
            Ok(listing) => {
                let remote: HashMap<String, String> = listing
                    .into_secrets()
                    .into_iter()
                    .map(|s| (s.key, s.value))
                    .collect();
                for (key, value) in &remote {
                    self.cache
                        .insert(key.clone(), value.clone(), ConfigSource::RemoteSecret);
                }
                debug!(backend = BACKEND, secret_count = remote.len(), "Listed secrets");
                Ok(Some(remote))
            }
            Err(err) if self.config.fallback_to_env => {
                warn!(backend = BACKEND, error = %err, "Secret listing failed, falling back per key");
                Ok(None)
            }
            Err(err) => Err(ProviderError::fetch(BACKEND, "*", err)),
        }
    }

    /// Bound a backend call by the configured timeout
    async fn call<T>(&self, fut: impl Future<Output = ProviderResult<T>>) -> ProviderResult<T> {
        tokio::time::timeout(self.config.timeout(), fut)
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "secret store call exceeded {}ms",
                    self.config.timeout_ms
                ))
            })?
    }

    fn has_session(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set_session(&self, session: Option<SessionToken>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn operational_session(&self) -> Option<SessionToken> {
        if !self.config.enabled
            || !self.operational.load(Ordering::SeqCst)
            || self.readiness.state() != InitializationState::Initialized
        {
            return None;
        }
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Readiness for CredentialStoreClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn is_enabled(&self) -> bool {
        CredentialStoreClient::is_enabled(self)
    }

    fn is_ready(&self) -> bool {
        CredentialStoreClient::is_ready(self)
    }

    fn state(&self) -> InitializationState {
        CredentialStoreClient::state(self)
    }

    async fn ensure_initialized(&self) -> ProviderResult<()> {
        self.initialize().await
    }
}

#[async_trait::async_trait]
impl ConfigProvider for CredentialStoreClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn source(&self) -> ConfigSource {
        ConfigSource::RemoteSecret
    }

    async fn lookup(&self, key: &str) -> ProviderResult<Option<TierHit>> {
        CredentialStoreClient::lookup(self, key).await
    }

    async fn lookup_many(&self, keys: &[String]) -> ProviderResult<HashMap<String, TierHit>> {
        CredentialStoreClient::lookup_many(self, keys).await
    }

    fn health_check(&self) -> ProviderHealth {
        CredentialStoreClient::health_check(self)
    }
}

#[cfg(test)]
mod tests {
    use super::api::MockSecretStoreApi;
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn enabled_config() -> SecretStoreConfig {
        SecretStoreConfig::default()
            .with_enabled(true)
            .with_identity("machine-id", "machine-secret")
            .with_project("proj-1", "prod")
            .with_cache_ttl(Duration::from_millis(1_000))
    }

    fn listing(pairs: &[(&str, &str)]) -> SecretListing {
        SecretListing::Bare(pairs.iter().map(|(k, v)| RemoteSecret::new(*k, *v)).collect())
    }

    fn healthy_api() -> MockSecretStoreApi {
        let mut api = MockSecretStoreApi::new();
        api.expect_authenticate()
            .times(1)
            .returning(|_| Ok(SessionToken::new("st.session")));
        api
    }

    fn client(config: SecretStoreConfig, api: MockSecretStoreApi, env: EnvSnapshot) -> CredentialStoreClient {
        CredentialStoreClient::new(config, Arc::new(api), env).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_fallback_chain() {
        let secrets = client(
            SecretStoreConfig::default(),
            MockSecretStoreApi::new(),
            EnvSnapshot::from_pairs([("K", "v")]),
        );
        secrets.initialize().await.unwrap();
        assert!(secrets.is_ready());
        assert!(!secrets.is_operational());

        let value = secrets.get_secret("K", Some("d")).await.unwrap();
        assert_eq!(value, ResolvedValue::found("v", ConfigSource::Environment));

        let value = secrets.get_secret("OTHER", Some("d")).await.unwrap();
        assert_eq!(value, ResolvedValue::found("d", ConfigSource::Default));

        let value = secrets.get_secret("OTHER", None).await.unwrap();
        assert!(!value.found);
        assert!(value.value.is_none());
    }

    #[tokio::test]
    async fn test_initialize_probes_once_and_becomes_operational() {
        let mut api = healthy_api();
        api.expect_list_secrets()
            .times(1)
            .withf(|_, project, environment| project == "proj-1" && environment == "prod")
            .returning(|_, _, _| Ok(listing(&[("DATABASE_URL", "postgresql://db")])));

        let secrets = client(enabled_config(), api, EnvSnapshot::empty());
        secrets.initialize().await.unwrap();
        secrets.initialize().await.unwrap();

        assert!(secrets.is_ready());
        assert!(secrets.is_operational());
        assert!(secrets.health_check().healthy);
        secrets
            .wait_for_ready(Duration::from_secs(1), Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_initialize_authenticates_once() {
        let mut api = healthy_api();
        api.expect_list_secrets()
            .times(1)
            .returning(|_, _, _| Ok(listing(&[])));
        let secrets = client(enabled_config(), api, EnvSnapshot::empty());

        let results = futures::future::join_all((0..10).map(|_| secrets.initialize())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(secrets.is_operational());
    }

    #[tokio::test]
    async fn test_unrecognized_probe_shape_counts_as_empty() {
        let mut api = healthy_api();
        api.expect_list_secrets().returning(|_, _, _| {
            Ok(SecretListing::Unrecognized(serde_json::json!({"unexpected": true})))
        });
        let secrets = client(enabled_config(), api, EnvSnapshot::empty());
        secrets.initialize().await.unwrap();
        assert!(secrets.is_operational());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_avoids_second_remote_call_until_ttl() {
        let remote_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&remote_calls);

        let mut api = healthy_api();
        api.expect_list_secrets().returning(|_, _, _| Ok(listing(&[])));
        api.expect_get_secret().returning(move |_, _, _, name| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(RemoteSecret::new(name, "s3cr3t")))
        });

        let secrets = client(enabled_config(), api, EnvSnapshot::empty());
        secrets.initialize().await.unwrap();

        let first = secrets.get_secret("API_KEY", None).await.unwrap();
        assert_eq!(first, ResolvedValue::found("s3cr3t", ConfigSource::RemoteSecret));

        tokio::time::advance(Duration::from_millis(500)).await;
        let second = secrets.get_secret("API_KEY", None).await.unwrap();
        assert_eq!(second, ResolvedValue::from_cache("s3cr3t"));
        assert_eq!(remote_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        let third = secrets.get_secret("API_KEY", None).await.unwrap();
        assert!(!third.cached);
        assert_eq!(remote_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_with_fallback_degrades() {
        let mut api = MockSecretStoreApi::new();
        api.expect_authenticate()
            .times(1)
            .returning(|_| Err(ProviderError::AuthenticationFailed("bad identity".into())));
        api.expect_get_secret().never();

        let secrets = client(
            enabled_config(),
            api,
            EnvSnapshot::from_pairs([("DATABASE_URL", "postgresql://env")]),
        );
        secrets.initialize().await.unwrap();

        assert_eq!(secrets.state(), InitializationState::Initialized);
        assert!(!secrets.is_ready());
        assert!(!secrets.is_operational());
        assert!(!secrets.health_check().healthy);

        let value = secrets.get_secret("DATABASE_URL", None).await.unwrap();
        assert_eq!(value.source, Some(ConfigSource::Environment));

        let err = secrets
            .wait_for_ready(Duration::from_secs(1), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NotOperational { backend: BACKEND });
    }

    #[tokio::test]
    async fn test_auth_failure_without_fallback_is_permanent() {
        let mut api = MockSecretStoreApi::new();
        api.expect_authenticate()
            .times(1)
            .returning(|_| Err(ProviderError::AuthenticationFailed("bad identity".into())));

        let secrets = client(enabled_config().with_fallback_to_env(false), api, EnvSnapshot::empty());
        let err = secrets.initialize().await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(secrets.state(), InitializationState::Failed);

        let err = secrets
            .wait_for_ready(Duration::from_secs(1), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::PermanentFailure { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_identity_degrades() {
        let mut api = MockSecretStoreApi::new();
        api.expect_authenticate().never();
        let config = SecretStoreConfig::default()
            .with_enabled(true)
            .with_project("proj-1", "prod");

        let secrets = client(config, api, EnvSnapshot::empty());
        secrets.initialize().await.unwrap();
        assert!(!secrets.is_operational());
    }

    #[tokio::test]
    async fn test_fetch_error_without_fallback_surfaces() {
        let mut api = healthy_api();
        api.expect_list_secrets().returning(|_, _, _| Ok(listing(&[])));
        api.expect_get_secret()
            .returning(|_, _, _, _| Err(ProviderError::ConnectionError("reset by peer".into())));

        let secrets = client(
            enabled_config().with_fallback_to_env(false),
            api,
            EnvSnapshot::from_pairs([("API_KEY", "env")]),
        );
        secrets.initialize().await.unwrap();

        let err = secrets.get_secret("API_KEY", None).await.unwrap_err();
        match err {
            ProviderError::Fetch { backend, key, .. } => {
                assert_eq!(backend, BACKEND);
                assert_eq!(key, "API_KEY");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_error_with_fallback_uses_environment() {
        let mut api = healthy_api();
        api.expect_list_secrets().returning(|_, _, _| Ok(listing(&[])));
        api.expect_get_secret()
            .returning(|_, _, _, _| Err(ProviderError::Timeout("slow".into())));

        let secrets = client(enabled_config(), api, EnvSnapshot::from_pairs([("API_KEY", "env")]));
        secrets.initialize().await.unwrap();

        let value = secrets.get_secret("API_KEY", None).await.unwrap();
        assert_eq!(value, ResolvedValue::found("env", ConfigSource::Environment));
    }

    #[tokio::test]
    async fn test_get_secrets_uses_one_list_call() {
        let mut api = healthy_api();
        api.expect_list_secrets().times(2).returning(|_, _, _| {
            Ok(SecretListing::Wrapped {
                secrets: vec![
                    RemoteSecret::new("DATABASE_URL", "postgresql://db"),
                    RemoteSecret::new("REDIS_URL", "redis://cache"),
                ],
            })
        });
        api.expect_get_secret().never();

        let secrets = client(
            enabled_config(),
            api,
            EnvSnapshot::from_pairs([("LOG_LEVEL", "debug")]),
        );
        secrets.initialize().await.unwrap();

        let keys = vec![
            "DATABASE_URL".to_string(),
            "LOG_LEVEL".to_string(),
            "MISSING".to_string(),
        ];
        let values = secrets.get_secrets(&keys).await.unwrap();

        assert_eq!(values["DATABASE_URL"].as_deref(), Some("postgresql://db"));
        assert_eq!(values["LOG_LEVEL"].as_deref(), Some("debug"));
        assert_eq!(values["MISSING"], None);

        // Every listed secret was cached, requested or not
        let cached = secrets.get_secret("REDIS_URL", None).await.unwrap();
        assert_eq!(cached, ResolvedValue::from_cache("redis://cache"));
    }

    #[tokio::test]
    async fn test_failed_listing_falls_back_per_key() {
        let mut api = healthy_api();
        let lists = Arc::new(AtomicUsize::new(0));
        let list_calls = Arc::clone(&lists);
        api.expect_list_secrets().returning(move |_, _, _| {
            if list_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(listing(&[]))
            } else {
                Err(ProviderError::ConnectionError("connection reset".into()))
            }
        });
        api.expect_get_secret()
            .times(3)
            .returning(|_, _, _, name| {
                Ok((name == "DATABASE_URL").then(|| RemoteSecret::new(name, "postgresql://per-key")))
            });

        let secrets = client(
            enabled_config(),
            api,
            EnvSnapshot::from_pairs([("LOG_LEVEL", "debug")]),
        );
        secrets.initialize().await.unwrap();
        assert!(secrets.is_operational());

        let keys = vec!["DATABASE_URL".to_string(), "LOG_LEVEL".to_string()];
        let values = secrets.get_secrets(&keys).await.unwrap();
        assert_eq!(values["DATABASE_URL"].as_deref(), Some("postgresql://per-key"));
        assert_eq!(values["LOG_LEVEL"].as_deref(), Some("debug"));

        // DATABASE_URL is cached now, only LOG_LEVEL reaches the store again
        let hits = secrets.lookup_many(&keys).await.unwrap();
        assert_eq!(
            hits["DATABASE_URL"],
            TierHit::cached("postgresql://per-key", ConfigSource::RemoteSecret)
        );
        assert!(!hits.contains_key("LOG_LEVEL"));
        assert_eq!(lists.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_get_secrets_without_store_goes_per_key() {
        let secrets = client(
            SecretStoreConfig::default(),
            MockSecretStoreApi::new(),
            EnvSnapshot::from_pairs([("A", "1")]),
        );
        let values = secrets
            .get_secrets(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(values["A"].as_deref(), Some("1"));
        assert_eq!(values["B"], None);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let mut api = MockSecretStoreApi::new();
        api.expect_authenticate()
            .times(2)
            .returning(|_| Ok(SessionToken::new("st")));
        api.expect_list_secrets().returning(|_, _, _| Ok(listing(&[("A", "1")])));

        let secrets = client(enabled_config(), api, EnvSnapshot::empty());
        secrets.initialize().await.unwrap();
        secrets.get_secrets(&["A".to_string()]).await.unwrap();

        assert!(secrets.reset());
        assert_eq!(secrets.state(), InitializationState::Idle);
        assert!(!secrets.is_operational());

        secrets.initialize().await.unwrap();
        assert!(secrets.is_operational());
    }

    #[test]
    fn test_sanitized_config() {
        let secrets = client(enabled_config(), MockSecretStoreApi::new(), EnvSnapshot::empty());
        let view = secrets.sanitized_config();
        assert!(view.enabled);
        assert!(view.has_client_secret);
        assert_eq!(view.project_id.as_deref(), Some("proj-1"));
        assert!(!serde_json::to_string(&view).unwrap().contains("machine-secret"));
    }
}
