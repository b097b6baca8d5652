//! Feature-flag client
//!
//! Resolves configuration values carried as variant payloads of the remote
//! flag service, behind a TTL cache and the fallback chain
//! `cache → enabled variant payload → environment → default`.
//!
//! The flag service's own access token is a secret. Initialization
//! therefore waits for the [`CredentialStoreClient`] to settle before any
//! call reaches the flag service.

pub mod api;
pub mod unleash;

pub use api::{
    FlagConnectSettings, FlagContext, FlagEvaluation, FlagServiceApi, FlagSession, Variant,
    VariantPayload,
};
pub use unleash::UnleashFrontendApi;

use crate::config::{FlagServiceConfig, SanitizedFlagServiceConfig};
use crate::providers::{
    ConfigProvider, ConfigSource, EnvSnapshot, ProviderError, ProviderHealth, ProviderResult,
    ResolvedValue, TierHit, TtlCache,
};
use crate::readiness::{
    self, InitializationState, Readiness, ReadinessCoordinator, DEFAULT_READY_TIMEOUT,
    DEFAULT_RETRY_INTERVAL,
};
use crate::secrets::CredentialStoreClient;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backend name used in errors, logs and health reports
pub const BACKEND: &str = "feature_flags";

/// Client for the remote feature-flag service
#[derive(Debug, Clone)]
pub struct FeatureFlagClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: FlagServiceConfig,
    api: Arc<dyn FlagServiceApi>,
    credentials: CredentialStoreClient,
    env: EnvSnapshot,
    cache: TtlCache,
    session: RwLock<Option<Arc<dyn FlagSession>>>,
    instance_id: String,
    readiness: ReadinessCoordinator,
}

impl FeatureFlagClient {
    pub fn new(
        config: FlagServiceConfig,
        api: Arc<dyn FlagServiceApi>,
        credentials: CredentialStoreClient,
        env: EnvSnapshot,
    ) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                cache: TtlCache::new(config.cache_ttl()),
                config,
                api,
                credentials,
                env,
                session: RwLock::new(None),
                instance_id: uuid::Uuid::new_v4().to_string(),
                readiness: ReadinessCoordinator::new(BACKEND),
            }),
        })
    }

    /// Create a client talking to the Unleash frontend API
    pub fn from_config(
        config: FlagServiceConfig,
        credentials: CredentialStoreClient,
        env: EnvSnapshot,
    ) -> ProviderResult<Self> {
        Self::new(config, Arc::new(UnleashFrontendApi::new()), credentials, env)
    }

    /// Wait for the credential store, fetch the access token, connect
    ///
    /// The credential wait is bounded by the configured timeout. When it
    /// fails and `fallback_to_env` is set, the token is still requested
    /// from the credential store, which answers from environment or
    /// default; otherwise the failure aborts initialization.
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

    pub fn is_ready(&self) -> bool {
        !self.is_enabled()
            || (self.state() == InitializationState::Initialized && self.inner.has_session())
    }

    pub fn is_operational(&self) -> bool {
        self.inner.operational_session().is_some()
    }

    pub async fn wait_for_ready(&self, timeout: Duration, retry_interval: Duration) -> ProviderResult<()> {
        readiness::wait_for_ready(self, timeout, retry_interval).await
    }

    pub async fn wait_until_ready(&self) -> ProviderResult<()> {
        self.wait_for_ready(DEFAULT_READY_TIMEOUT, DEFAULT_RETRY_INTERVAL)
            .await
    }

    /// Resolve a value for the default context
    pub async fn get_config_value(&self, key: &str, default: Option<&str>) -> ProviderResult<ResolvedValue> {
        self.get_config_value_with_context(key, &FlagContext::default(), default)
            .await
    }

    /// Resolve a value for `context`
    ///
    /// Only default-context results are cached.
    pub async fn get_config_value_with_context(
        &self,
        key: &str,
        context: &FlagContext,
        default: Option<&str>,
    ) -> ProviderResult<ResolvedValue> {
        if let Some(hit) = self.lookup_with_context(key, context).await? {
            return Ok(ResolvedValue::from_client_hit(hit));
        }
        Ok(self.inner.env.resolve_fallback(key, default))
    }

    /// Resolve several values; the flag service has no batch call
    pub async fn get_config_values(&self, keys: &[String]) -> ProviderResult<HashMap<String, Option<String>>> {
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = self.get_config_value(key, None).await?.into_value();
            values.insert(key.clone(), value);
        }
        Ok(values)
    }

    /// Cache and flag service only, default context
    pub async fn lookup(&self, key: &str) -> ProviderResult<Option<TierHit>> {
        self.lookup_with_context(key, &FlagContext::default()).await
    }

    async fn lookup_with_context(&self, key: &str, context: &FlagContext) -> ProviderResult<Option<TierHit>> {
        let cacheable = context.is_default();
        if cacheable {
            if let Some(entry) = self.inner.cache.get(key) {
                debug!(backend = BACKEND, key, "Cache hit");
                return Ok(Some(TierHit::cached(entry.value, entry.source)));
            }
        }

        let Some(session) = self.inner.operational_session() else {
            return Ok(None);
        };

        match self.inner.fetch_payload(&session, key, context).await {
            Ok(Some(value)) => {
                if cacheable {
                    self.inner
                        .cache
                        .insert(key, value.clone(), ConfigSource::RemoteFlag);
                }
                Ok(Some(TierHit::fresh(value, ConfigSource::RemoteFlag)))
            }
            Ok(None) => {
                debug!(backend = BACKEND, key, "No enabled variant payload");
                Ok(None)
            }
            Err(err) if self.inner.config.fallback_to_env => {
                warn!(backend = BACKEND, key, error = %err, "Flag evaluation failed, falling back");
                Ok(None)
            }
            Err(err) => Err(ProviderError::fetch(BACKEND, key, err)),
        }
    }

    /// The variant the service assigns to `flag`; `None` when not operational
    pub async fn get_variant(&self, flag: &str, context: &FlagContext) -> ProviderResult<Option<Variant>> {
        let Some(session) = self.inner.operational_session() else {
            return Ok(None);
        };
        match self.inner.call(session.get_variant(flag, context)).await {
            Ok(variant) => Ok(variant),
            Err(err) if self.inner.config.fallback_to_env => {
                warn!(backend = BACKEND, flag, error = %err, "Variant lookup failed");
                Ok(None)
            }
            Err(err) => Err(ProviderError::fetch(BACKEND, flag, err)),
        }
    }

    /// Boolean flag read; `false` unless operational
    pub async fn is_feature_enabled(&self, flag: &str) -> bool {
        self.is_feature_enabled_for(flag, &FlagContext::default())
            .await
    }

    pub async fn is_feature_enabled_for(&self, flag: &str, context: &FlagContext) -> bool {
        let Some(session) = self.inner.operational_session() else {
            return false;
        };
        match self.inner.call(session.is_enabled(flag, context)).await {
            Ok(enabled) => enabled,
            Err(err) => {
                warn!(backend = BACKEND, flag, error = %err, "Flag check failed, treating as off");
                false
            }
        }
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop session and cache and return to `Idle`
    pub fn reset(&self) -> bool {
        if !self.inner.readiness.reset() {
            return false;
        }
        self.inner.set_session(None);
        self.inner.cache.clear();
        true
    }

    pub fn sanitized_config(&self) -> SanitizedFlagServiceConfig {
        self.inner.config.sanitized()
    }

    pub fn health_check(&self) -> ProviderHealth {
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
        health.with_initialized_at(self.inner.readiness.initialized_at())
    }
}

impl Inner {
    async fn run_initialize(self: Arc<Self>) -> ProviderResult<()> {
        if !self.config.enabled {
            info!(backend = BACKEND, "Flag service disabled; using environment and defaults");
            return Ok(());
        }

        match self
            .credentials
            .wait_for_ready(
                self.config.credential_wait_timeout(),
                self.config.credential_retry_interval(),
            )
            .await
        {
            Ok(()) => {}
            // Settled degraded: the token lookup below falls back on its own
            Err(ProviderError::NotOperational { .. }) => {
                info!(
                    backend = BACKEND,
                    "Secret store degraded; requesting flag token through its fallback chain"
                );
            }
            Err(err) if self.config.fallback_to_env => {
                warn!(
                    backend = BACKEND,
                    error = %err,
                    "Secret store not ready; requesting flag token through its fallback chain"
                );
            }
            Err(err) => {
                error!(backend = BACKEND, error = %err, "Secret store not ready; aborting flag service initialization");
                return Err(err);
            }
        }

        match self.connect().await {
            Ok(()) => {
                info!(backend = BACKEND, app_name = %self.config.app_name, "Flag service initialized");
                Ok(())
            }
            Err(err) => {
                self.set_session(None);
                if self.config.fallback_to_env {
                    warn!(backend = BACKEND, error = %err, "Flag service unavailable; continuing with environment fallback");
                    Ok(())
                } else {
                    error!(backend = BACKEND, error = %err, "Flag service initialization failed");
                    Err(err)
                }
            }
        }
    }

    async fn connect(&self) -> ProviderResult<()> {
        let configured = self
            .config
            .api_token
            .as_ref()
            .map(|t| t.expose_secret().as_str());
        let token = self
            .credentials
            .get_secret(&self.config.token_secret_key, configured)
            .await?;
        match token.source {
            Some(source) => debug!(backend = BACKEND, token_source = %source, "Resolved flag service token"),
            None => warn!(
                backend = BACKEND,
                key = %self.config.token_secret_key,
                "No flag service token found; connecting without one"
            ),
        }

        let settings = FlagConnectSettings {
            url: self.config.url.clone().unwrap_or_default(),
            app_name: self.config.app_name.clone(),
            environment: self.config.environment.clone(),
            instance_id: self.instance_id.clone(),
            api_token: token.into_value().map(SecretString::new),
            timeout: self.config.timeout(),
        };

        let session = self.call(self.api.connect(&settings)).await?;
        self.set_session(Some(session));
        Ok(())
    }

    /// Enabled state gating the variant, both from one evaluation; the payload is the value
    async fn fetch_payload(
        &self,
        session: &Arc<dyn FlagSession>,
        key: &str,
        context: &FlagContext,
    ) -> ProviderResult<Option<String>> {
        let evaluation = self.call(session.evaluate(key, context)).await?;
        Ok(evaluation.payload_value().map(str::to_string))
    }

    async fn call<T>(&self, fut: impl Future<Output = ProviderResult<T>>) -> ProviderResult<T> {
        tokio::time::timeout(self.config.timeout(), fut)
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "flag service call exceeded {}ms",
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

    fn set_session(&self, session: Option<Arc<dyn FlagSession>>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn operational_session(&self) -> Option<Arc<dyn FlagSession>> {
        if !self.config.enabled || self.readiness.state() != InitializationState::Initialized {
            return None;
        }
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Readiness for FeatureFlagClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn is_enabled(&self) -> bool {
        FeatureFlagClient::is_enabled(self)
    }

    fn is_ready(&self) -> bool {
        FeatureFlagClient::is_ready(self)
    }

    fn state(&self) -> InitializationState {
        FeatureFlagClient::state(self)
    }

    async fn ensure_initialized(&self) -> ProviderResult<()> {
        self.initialize().await
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FeatureFlagClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn source(&self) -> ConfigSource {
        ConfigSource::RemoteFlag
    }

    async fn lookup(&self, key: &str) -> ProviderResult<Option<TierHit>> {
        FeatureFlagClient::lookup(self, key).await
    }

    fn health_check(&self) -> ProviderHealth {
        FeatureFlagClient::health_check(self)
    }
}
