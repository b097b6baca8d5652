//! HTTP implementation of [`SecretStoreApi`] for Infisical
//!
//! Uses universal-auth machine identities and the raw secrets API:
//!
//! - `POST {site}/api/v1/auth/universal-auth/login`
//! - `GET  {site}/api/v3/secrets/raw?workspaceId={project}&environment={env}`
//! - `GET  {site}/api/v3/secrets/raw/{name}?workspaceId={project}&environment={env}`

use super::api::{RemoteSecret, SecretListing, SecretStoreApi, SecretStoreIdentity, SessionToken};
use crate::providers::{ProviderError, ProviderResult};
use reqwest::{Client, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Infisical REST client
#[derive(Debug, Clone)]
pub struct InfisicalApi {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SingleSecretResponse {
    secret: RemoteSecret,
}

impl InfisicalApi {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::ConfigurationError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Point-lookup URL with `name` percent-encoded as one path segment
    fn secret_url(&self, name: &str) -> ProviderResult<Url> {
        let mut url = Url::parse(&self.url("/api/v3/secrets/raw"))
            .map_err(|e| ProviderError::ConfigurationError(format!("secret store URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::ConfigurationError("secret store URL cannot carry a path".into()))?
            .push(name);
        Ok(url)
    }
}

/// Map a non-success status onto the provider error taxonomy
async fn status_error(response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::AuthenticationFailed(format!("{}: {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(body),
        _ => ProviderError::ConnectionError(format!("secret store returned {}: {}", status, body)),
    }
}

#[async_trait::async_trait]
impl SecretStoreApi for InfisicalApi {
    async fn authenticate(&self, identity: &SecretStoreIdentity) -> ProviderResult<SessionToken> {
        let response = self
            .client
            .post(self.url("/api/v1/auth/universal-auth/login"))
            .json(&LoginRequest {
                client_id: &identity.client_id,
                client_secret: identity.client_secret.expose_secret(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match status_error(response).await {
                ProviderError::ConnectionError(msg) => ProviderError::AuthenticationFailed(msg),
                other => other,
            });
        }

        let login: LoginResponse = response.json().await?;
        Ok(SessionToken::new(login.access_token))
    }

    async fn list_secrets(
        &self,
        session: &SessionToken,
        project: &str,
        environment: &str,
    ) -> ProviderResult<SecretListing> {
        let response = self
            .client
            .get(self.url("/api/v3/secrets/raw"))
            .bearer_auth(session.secret().expose_secret())
            .query(&[("workspaceId", project), ("environment", environment)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn get_secret(
        &self,
        session: &SessionToken,
        project: &str,
        environment: &str,
        name: &str,
    ) -> ProviderResult<Option<RemoteSecret>> {
        let response = self
            .client
            .get(self.secret_url(name)?)
            .bearer_auth(session.secret().expose_secret())
            .query(&[("workspaceId", project), ("environment", environment)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let body: SingleSecretResponse = response.json().await?;
        Ok(Some(body.secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity() -> SecretStoreIdentity {
        SecretStoreIdentity {
            client_id: "machine-id".into(),
            client_secret: SecretString::new("machine-secret".into()),
        }
    }

    fn api(server: &MockServer) -> InfisicalApi {
        InfisicalApi::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_authenticate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/universal-auth/login"))
            .and(body_json(serde_json::json!({
                "clientId": "machine-id",
                "clientSecret": "machine-secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "st.session",
                "expiresIn": 7200,
                "tokenType": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = api(&server).authenticate(&identity()).await.unwrap();
        assert_eq!(token.secret().expose_secret(), "st.session");
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid identity"))
            .mount(&server)
            .await;

        let err = api(&server).authenticate(&identity()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_list_secrets_wrapped_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/secrets/raw"))
            .and(query_param("workspaceId", "proj-1"))
            .and(query_param("environment", "prod"))
            .and(header("authorization", "Bearer st.session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secrets": [
                    { "secretKey": "DATABASE_URL", "secretValue": "postgresql://db" },
                    { "secretKey": "REDIS_URL", "secretValue": "redis://cache" }
                ]
            })))
            .mount(&server)
            .await;

        let secrets = api(&server)
            .list_secrets(&SessionToken::new("st.session"), "proj-1", "prod")
            .await
            .unwrap()
            .into_secrets();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0], RemoteSecret::new("DATABASE_URL", "postgresql://db"));
    }

    #[tokio::test]
    async fn test_get_secret_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/secrets/raw/MISSING"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let secret = api(&server)
            .get_secret(&SessionToken::new("st"), "proj-1", "prod", "MISSING")
            .await
            .unwrap();
        assert!(secret.is_none());
    }

    #[tokio::test]
    async fn test_get_secret_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/secrets/raw/API_KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secret": { "secretKey": "API_KEY", "secretValue": "k-123" }
            })))
            .mount(&server)
            .await;

        let secret = api(&server)
            .get_secret(&SessionToken::new("st"), "proj-1", "prod", "API_KEY")
            .await
            .unwrap();
        assert_eq!(secret, Some(RemoteSecret::new("API_KEY", "k-123")));
    }

    #[tokio::test]
    async fn test_get_secret_name_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/secrets/raw/team%2Fdb%3Fx%23y"))
            .and(query_param("workspaceId", "proj-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secret": { "secretKey": "team/db?x#y", "secretValue": "v" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let secret = api(&server)
            .get_secret(&SessionToken::new("st"), "proj-1", "prod", "team/db?x#y")
            .await
            .unwrap();
        assert_eq!(secret, Some(RemoteSecret::new("team/db?x#y", "v")));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = api(&server)
            .list_secrets(&SessionToken::new("st"), "proj-1", "prod")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(_)));
        assert!(err.is_retryable());
    }
}
