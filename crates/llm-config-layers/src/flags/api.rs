//! Remote feature-flag service collaborator interface

use crate::providers::ProviderResult;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Evaluation context passed to the flag service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub remote_address: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl FlagContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// True when no field is set
    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// Value attached to a variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Variant of a flag as evaluated for one context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub payload: Option<VariantPayload>,
}

impl Variant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            payload: None,
        }
    }

    pub fn with_payload(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload = Some(VariantPayload {
            kind: kind.into(),
            value: value.into(),
        });
        self
    }

    /// The configuration value carried by an enabled variant
    pub fn payload_value(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.payload.as_ref().map(|p| p.value.as_str())
    }
}

/// Everything needed to open a session with the flag service
#[derive(Debug, Clone)]
pub struct FlagConnectSettings {
    pub url: String,
    pub app_name: String,
    pub environment: String,
    /// Identifies this process to the service
    pub instance_id: String,
    pub api_token: Option<SecretString>,
    pub timeout: Duration,
}

/// Opens sessions against the flag service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FlagServiceApi: Send + Sync + fmt::Debug {
    /// Connect and wait for the first successful sync
    ///
    /// `Ok` is the service's "ready" signal; any error is its "error" signal.
    async fn connect(&self, settings: &FlagConnectSettings) -> ProviderResult<Arc<dyn FlagSession>>;
}

/// Enabled state and variant of one flag, read from a single answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagEvaluation {
    pub enabled: bool,
    pub variant: Option<Variant>,
}

impl FlagEvaluation {
    pub fn new(enabled: bool, variant: Option<Variant>) -> Self {
        Self { enabled, variant }
    }

    /// The variant payload, gated on the flag being enabled
    pub fn payload_value(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.variant.as_ref().and_then(Variant::payload_value)
    }
}

/// A connected flag service session
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FlagSession: Send + Sync + fmt::Debug {
    async fn is_enabled(&self, flag: &str, context: &FlagContext) -> ProviderResult<bool>;

    /// `Ok(None)` when the service knows no variant for the flag
    async fn get_variant(&self, flag: &str, context: &FlagContext) -> ProviderResult<Option<Variant>>;

    /// Enabled state and variant from one evaluation of `flag`
    async fn evaluate(&self, flag: &str, context: &FlagContext) -> ProviderResult<FlagEvaluation>;
}
