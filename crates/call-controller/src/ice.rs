//! ICE/TURN credential retrieval.
//!
//! [`XirsysIceProvider`] requests a fresh server list from a Xirsys-style
//! credential service for every dial. The request is a form POST:
//!
//! ```text
//! room=<room>&application=<app>&domain=<domain>&ident=<ident>&secret=<secret>
//! ```
//!
//! and the reply is `{ "e": null | "<error>", "d": { "iceServers": [...] } }`.
//! Failures are not retried: the dial that asked is aborted instead.
//!
//! # Security
//!
//! - The service secret is a `SecretString` and is never logged
//! - Response bodies are only logged at trace level

use crate::config::Config;
use crate::errors::IceError;
use crate::transport::{IceProvider, IceServer};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Default credential service endpoint.
pub const DEFAULT_ICE_PROVIDER_URL: &str = "https://api.xirsys.com/getIceServers";

/// Default HTTP request timeout.
pub const DEFAULT_ICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Credential service settings.
#[derive(Clone)]
pub struct IceProviderConfig {
    /// Endpoint URL.
    pub url: String,
    pub room: String,
    pub application: String,
    pub domain: String,
    /// Account identifier.
    pub ident: String,
    /// Account secret.
    pub secret: SecretString,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for IceProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceProviderConfig")
            .field("url", &self.url)
            .field("room", &self.room)
            .field("application", &self.application)
            .field("domain", &self.domain)
            .field("ident", &self.ident)
            .field("secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IceProviderConfig {
    /// Settings for `ident`/`secret` against the default endpoint.
    #[must_use]
    pub fn new(ident: impl Into<String>, secret: SecretString) -> Self {
        Self {
            url: DEFAULT_ICE_PROVIDER_URL.to_string(),
            room: "default".to_string(),
            application: "default".to_string(),
            domain: String::new(),
            ident: ident.into(),
            secret,
            timeout: DEFAULT_ICE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    d: Option<CredentialData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialData {
    ice_servers: Vec<IceServer>,
}

/// HTTP client for a Xirsys-style credential service.
pub struct XirsysIceProvider {
    config: IceProviderConfig,
    http_client: reqwest::Client,
}

impl XirsysIceProvider {
    /// Build the provider and its HTTP client.
    ///
    /// # Errors
    ///
    /// `IceError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: IceProviderConfig) -> Result<Self, IceError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| IceError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl IceProvider for XirsysIceProvider {
    #[instrument(skip_all)]
    async fn ice_servers(&self) -> Result<Vec<IceServer>, IceError> {
        debug!(
            target: "cc.ice",
            url = %self.config.url,
            ident = %self.config.ident,
            "Requesting ICE servers"
        );

        let form_body = [
            ("room", self.config.room.as_str()),
            ("application", self.config.application.as_str()),
            ("domain", self.config.domain.as_str()),
            ("ident", self.config.ident.as_str()),
            ("secret", self.config.secret.expose_secret()),
        ];

        let response = self
            .http_client
            .post(&self.config.url)
            .form(&form_body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "cc.ice", error = %e, "ICE credential request failed");
                IceError::Http(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "cc.ice",
                status = %status,
                "Credential service returned error status"
            );
            return Err(IceError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            warn!(target: "cc.ice", error = %e, "Failed to read credential response");
            IceError::Http(e.to_string())
        })?;
        trace!(target: "cc.ice", body = %body, "Credential response body");

        let parsed: CredentialResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(target: "cc.ice", error = %e, "Failed to parse credential response");
            IceError::InvalidResponse(e.to_string())
        })?;

        if let Some(error) = parsed.e {
            warn!(target: "cc.ice", "Credential service rejected request");
            return Err(IceError::Rejected(error));
        }

        let servers = parsed
            .d
            .map(|d| d.ice_servers)
            .ok_or_else(|| IceError::InvalidResponse("missing iceServers".to_string()))?;

        debug!(
            target: "cc.ice",
            server_count = servers.len(),
            "ICE servers acquired"
        );

        Ok(servers)
    }
}

/// Provider returning a fixed server list.
#[derive(Debug, Clone, Default)]
pub struct StaticIceProvider {
    servers: Vec<IceServer>,
}

impl StaticIceProvider {
    #[must_use]
    pub fn new(servers: Vec<IceServer>) -> Self {
        Self { servers }
    }
}

#[async_trait]
impl IceProvider for StaticIceProvider {
    async fn ice_servers(&self) -> Result<Vec<IceServer>, IceError> {
        Ok(self.servers.clone())
    }
}

/// Provider selected by `config`: the credential service when configured,
/// otherwise the static server list (possibly empty).
///
/// # Errors
///
/// `IceError::Configuration` if the HTTP client cannot be built.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn IceProvider>, IceError> {
    match &config.ice_provider {
        Some(settings) => Ok(Arc::new(XirsysIceProvider::new(settings.clone())?)),
        None => Ok(Arc::new(StaticIceProvider::new(
            config.static_ice_servers.clone(),
        ))),
    }
}
