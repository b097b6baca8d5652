//! HTTP implementation of [`FlagServiceApi`] for the Unleash frontend API
//!
//! `GET {url}/frontend` returns every toggle enabled for the given context,
//! with its evaluated variant. The session keeps the default-context
//! response as a snapshot and refreshes it periodically; other contexts are
//! evaluated by the service on each call.

use super::api::{
    FlagConnectSettings, FlagContext, FlagEvaluation, FlagServiceApi, FlagSession, Variant,
};
use crate::providers::{ProviderError, ProviderResult};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a default-context snapshot is served before refreshing
pub const SNAPSHOT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Unleash frontend API connector
#[derive(Debug, Clone, Default)]
pub struct UnleashFrontendApi;

impl UnleashFrontendApi {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FrontendResponse {
    #[serde(default)]
    toggles: Vec<FrontendToggle>,
}

#[derive(Debug, Clone, Deserialize)]
struct FrontendToggle {
    name: String,
    enabled: bool,
    #[serde(default)]
    variant: Option<Variant>,
}

type ToggleMap = HashMap<String, FrontendToggle>;

#[derive(Debug)]
struct Snapshot {
    toggles: Arc<ToggleMap>,
    fetched_at: Instant,
}

/// Session holding the default-context toggle snapshot
#[derive(Debug)]
pub struct UnleashFrontendSession {
    client: Client,
    endpoint: String,
    app_name: String,
    environment: String,
    instance_id: String,
    api_token: Option<SecretString>,
    snapshot: RwLock<Snapshot>,
}

impl UnleashFrontendSession {
    async fn fetch(&self, context: &FlagContext) -> ProviderResult<ToggleMap> {
        let mut query: Vec<(String, String)> = vec![
            ("appName".into(), self.app_name.clone()),
            ("environment".into(), self.environment.clone()),
        ];
        if let Some(user_id) = &context.user_id {
            query.push(("userId".into(), user_id.clone()));
        }
        if let Some(session_id) = &context.session_id {
            query.push(("sessionId".into(), session_id.clone()));
        }
        if let Some(address) = &context.remote_address {
            query.push(("remoteAddress".into(), address.clone()));
        }
        for (name, value) in &context.properties {
            query.push((format!("properties[{}]", name), value.clone()));
        }

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .header("UNLEASH-APPNAME", &self.app_name)
            .header("UNLEASH-INSTANCEID", &self.instance_id);
        if let Some(token) = &self.api_token {
            request = request.header(reqwest::header::AUTHORIZATION, token.expose_secret().as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ProviderError::AuthenticationFailed(format!("{}: {}", status, body))
                }
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(body),
                _ => ProviderError::ConnectionError(format!(
                    "flag service returned {}: {}",
                    status, body
                )),
            });
        }

        let body: FrontendResponse = response.json().await?;
        Ok(body
            .toggles
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect())
    }

    /// Toggles for `context`, served from the snapshot for the default context
    async fn toggles(&self, context: &FlagContext) -> ProviderResult<Arc<ToggleMap>> {
        if !context.is_default() {
            return self.fetch(context).await.map(Arc::new);
        }

        let (current, stale) = {
            let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            (
                Arc::clone(&snapshot.toggles),
                snapshot.fetched_at.elapsed() >= SNAPSHOT_REFRESH_INTERVAL,
            )
        };
        if !stale {
            return Ok(current);
        }

        match self.fetch(context).await {
            Ok(toggles) => {
                let toggles = Arc::new(toggles);
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Snapshot {
                    toggles: Arc::clone(&toggles),
                    fetched_at: Instant::now(),
                };
                debug!(toggle_count = toggles.len(), "Refreshed flag snapshot");
                Ok(toggles)
            }
            Err(err) => {
                warn!(error = %err, "Flag snapshot refresh failed, serving previous snapshot");
                Ok(current)
            }
        }
    }
}

impl UnleashFrontendSession {
    /// Build the session and load its first default-context snapshot
    async fn open(settings: &FlagConnectSettings) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::ConfigurationError(format!("HTTP client: {}", e)))?;

        let session = UnleashFrontendSession {
            client,
            endpoint: format!("{}/frontend", settings.url.trim_end_matches('/')),
            app_name: settings.app_name.clone(),
            environment: settings.environment.clone(),
            instance_id: settings.instance_id.clone(),
            api_token: settings.api_token.clone(),
            snapshot: RwLock::new(Snapshot {
                toggles: Arc::new(HashMap::new()),
                fetched_at: Instant::now(),
            }),
        };

        let toggles = session.fetch(&FlagContext::default()).await?;
        debug!(toggle_count = toggles.len(), "Connected to flag service");
        *session.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Snapshot {
            toggles: Arc::new(toggles),
            fetched_at: Instant::now(),
        };
        Ok(session)
    }
}

#[async_trait::async_trait]
impl FlagServiceApi for UnleashFrontendApi {
    async fn connect(&self, settings: &FlagConnectSettings) -> ProviderResult<Arc<dyn FlagSession>> {
        Ok(Arc::new(UnleashFrontendSession::open(settings).await?))
    }
}

#[async_trait::async_trait]
impl FlagSession for UnleashFrontendSession {
    async fn is_enabled(&self, flag: &str, context: &FlagContext) -> ProviderResult<bool> {
        let toggles = self.toggles(context).await?;
        Ok(toggles.get(flag).is_some_and(|t| t.enabled))
    }

    async fn get_variant(&self, flag: &str, context: &FlagContext) -> ProviderResult<Option<Variant>> {
        let toggles = self.toggles(context).await?;
        Ok(toggles.get(flag).and_then(|t| t.variant.clone()))
    }

    async fn evaluate(&self, flag: &str, context: &FlagContext) -> ProviderResult<FlagEvaluation> {
        let toggles = self.toggles(context).await?;
        Ok(toggles
            .get(flag)
            .map(|t| FlagEvaluation::new(t.enabled, t.variant.clone()))
            .unwrap_or_default())
    }
}
