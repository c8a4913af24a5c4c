//! Call controller configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use crate::ice::{IceProviderConfig, DEFAULT_ICE_PROVIDER_URL, DEFAULT_ICE_TIMEOUT};
use crate::protocol::Mode;
use crate::transport::IceServer;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default ICE room and application name.
pub const DEFAULT_ICE_ROOM: &str = "default";

/// Call controller configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Number of the local peer (owner of `<number>-ctrl`).
    pub local_number: String,

    /// Call topology (default: group).
    pub mode: Mode,

    /// Redis connection URL for the pub/sub transport.
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Credential service settings, present when `ICE_IDENT` and
    /// `ICE_SECRET` are both set.
    pub ice_provider: Option<IceProviderConfig>,

    /// Fixed ICE servers used when no credential service is configured.
    pub static_ice_servers: Vec<IceServer>,

    /// Numbers the binary's presence monitor watches.
    pub watch: Vec<String>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("local_number", &self.local_number)
            .field("mode", &self.mode)
            .field("redis_url", &"[REDACTED]")
            .field("ice_provider", &self.ice_provider)
            .field("static_ice_servers", &self.static_ice_servers.len())
            .field("watch", &self.watch)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let local_number = vars
            .get("CALL_LOCAL_NUMBER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("CALL_LOCAL_NUMBER".to_string()))?;

        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let mode = match vars.get("CALL_MODE") {
            Some(value) => value
                .parse::<Mode>()
                .map_err(|e| ConfigError::InvalidValue(format!("CALL_MODE: {e}")))?,
            None => Mode::default(),
        };

        let timeout = match vars.get("ICE_TIMEOUT_SECONDS") {
            Some(value) => value.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                ConfigError::InvalidValue(format!("ICE_TIMEOUT_SECONDS must be an integer: {e}"))
            })?,
            None => DEFAULT_ICE_TIMEOUT,
        };

        let ice_provider = match (vars.get("ICE_IDENT"), vars.get("ICE_SECRET")) {
            (Some(ident), Some(secret)) => Some(IceProviderConfig {
                url: vars
                    .get("ICE_PROVIDER_URL")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_ICE_PROVIDER_URL.to_string()),
                room: vars
                    .get("ICE_ROOM")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_ICE_ROOM.to_string()),
                application: vars
                    .get("ICE_APPLICATION")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_ICE_ROOM.to_string()),
                domain: vars.get("ICE_DOMAIN").cloned().unwrap_or_default(),
                ident: ident.clone(),
                secret: SecretString::from(secret.clone()),
                timeout,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "ICE_IDENT and ICE_SECRET must be set together".to_string(),
                ))
            }
        };

        let static_ice_servers = match vars.get("ICE_SERVERS") {
            Some(json) => serde_json::from_str(json).map_err(|e| {
                ConfigError::InvalidValue(format!("ICE_SERVERS is not a JSON server list: {e}"))
            })?,
            None => Vec::new(),
        };

        let watch = vars
            .get("CALL_WATCH")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            local_number,
            mode,
            redis_url,
            ice_provider,
            static_ice_servers,
            watch,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("CALL_LOCAL_NUMBER".to_string(), "555".to_string()),
            (
                "REDIS_URL".to_string(),
                "redis://:hunter2@localhost:6379".to_string(),
            ),
        ])
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.local_number, "555");
        assert_eq!(config.mode, Mode::Group);
        assert_eq!(
            config.redis_url.expose_secret(),
            "redis://:hunter2@localhost:6379"
        );
        assert!(config.ice_provider.is_none());
        assert!(config.static_ice_servers.is_empty());
        assert!(config.watch.is_empty());
    }

    #[test]
    fn test_missing_required_vars() {
        let mut vars = base_vars();
        vars.remove("CALL_LOCAL_NUMBER");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(ref v)) if v == "CALL_LOCAL_NUMBER"
        ));

        let mut vars = base_vars();
        vars.insert("CALL_LOCAL_NUMBER".to_string(), "   ".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(_))
        ));

        let mut vars = base_vars();
        vars.remove("REDIS_URL");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(ref v)) if v == "REDIS_URL"
        ));
    }

    #[test]
    fn test_mode_parsing() {
        let mut vars = base_vars();
        vars.insert("CALL_MODE".to_string(), "oneway".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().mode, Mode::Oneway);

        vars.insert("CALL_MODE".to_string(), "broadcast".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_ice_provider_settings() {
        let mut vars = base_vars();
        vars.insert("ICE_IDENT".to_string(), "acme".to_string());
        vars.insert("ICE_SECRET".to_string(), "s3cr3t".to_string());
        vars.insert("ICE_DOMAIN".to_string(), "call.example.com".to_string());
        vars.insert("ICE_TIMEOUT_SECONDS".to_string(), "3".to_string());

        let config = Config::from_vars(&vars).unwrap();
        let ice = config.ice_provider.unwrap();
        assert_eq!(ice.url, DEFAULT_ICE_PROVIDER_URL);
        assert_eq!(ice.room, "default");
        assert_eq!(ice.application, "default");
        assert_eq!(ice.domain, "call.example.com");
        assert_eq!(ice.ident, "acme");
        assert_eq!(ice.secret.expose_secret(), "s3cr3t");
        assert_eq!(ice.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_ice_ident_without_secret_is_rejected() {
        let mut vars = base_vars();
        vars.insert("ICE_IDENT".to_string(), "acme".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_timeout() {
        let mut vars = base_vars();
        vars.insert("ICE_TIMEOUT_SECONDS".to_string(), "soon".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_static_ice_servers_and_watch_list() {
        let mut vars = base_vars();
        vars.insert(
            "ICE_SERVERS".to_string(),
            r#"[{"urls": "stun:stun.example.com"}]"#.to_string(),
        );
        vars.insert("CALL_WATCH".to_string(), "777, 888,,999".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(
            config.static_ice_servers,
            vec![IceServer::new("stun:stun.example.com")]
        );
        assert_eq!(config.watch, vec!["777", "888", "999"]);

        vars.insert("ICE_SERVERS".to_string(), "stun:nope".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = base_vars();
        vars.insert("ICE_IDENT".to_string(), "acme".to_string());
        vars.insert("ICE_SECRET".to_string(), "s3cr3t-value".to_string());
        let config = Config::from_vars(&vars).unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("hunter2"));
        assert!(!debug_str.contains("s3cr3t-value"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
