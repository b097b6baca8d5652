//! Remote secret store collaborator interface

use crate::providers::ProviderResult;
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;

/// Machine identity used to authenticate against the secret store
#[derive(Debug, Clone)]
pub struct SecretStoreIdentity {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Authenticated session handle
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    pub fn secret(&self) -> &SecretString {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// One secret as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteSecret {
    #[serde(alias = "secretKey")]
    pub key: String,
    #[serde(alias = "secretValue")]
    pub value: String,
}

impl RemoteSecret {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response of a list call
///
/// The store answers either with a bare array or with `{ "secrets": [...] }`.
/// Anything else is kept as `Unrecognized` and treated as zero secrets.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SecretListing {
    Bare(Vec<RemoteSecret>),
    Wrapped { secrets: Vec<RemoteSecret> },
    Unrecognized(serde_json::Value),
}

impl SecretListing {
    /// Normalize either shape into a list of secrets
    pub fn into_secrets(self) -> Vec<RemoteSecret> {
        match self {
            SecretListing::Bare(secrets) | SecretListing::Wrapped { secrets } => secrets,
            SecretListing::Unrecognized(value) => {
                tracing::debug!(
                    shape = value_kind(&value),
                    "Unrecognized secret listing shape, treating as empty"
                );
                Vec::new()
            }
        }
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Wire-level operations of the remote secret store
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SecretStoreApi: Send + Sync + fmt::Debug {
    /// Exchange a machine identity for a session token
    async fn authenticate(&self, identity: &SecretStoreIdentity) -> ProviderResult<SessionToken>;

    /// List every secret of a project environment
    async fn list_secrets(
        &self,
        session: &SessionToken,
        project: &str,
        environment: &str,
    ) -> ProviderResult<SecretListing>;

    /// Fetch one secret; `Ok(None)` when it does not exist
    async fn get_secret(
        &self,
        session: &SessionToken,
        project: &str,
        environment: &str,
        name: &str,
    ) -> ProviderResult<Option<RemoteSecret>>;
}
