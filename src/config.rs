//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable supplying a gateway token when the config field is absent.
pub const ENV_GATEWAY_TOKEN: &str = "RELAYGATE_GATEWAY_TOKEN";
/// Environment variable supplying a gateway password when the config field is absent.
pub const ENV_GATEWAY_PASSWORD: &str = "RELAYGATE_GATEWAY_PASSWORD";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Identity-proxy integration configuration
    pub identity_proxy: IdentityProxyConfig,
    /// Peer addresses allowed to set forwarding headers
    pub trusted_proxies: Vec<String>,
    /// Control UI configuration
    pub control_ui: ControlUiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind mode (loopback, lan, custom)
    pub bind: BindMode,
    /// Host used when `bind = custom`
    pub custom_bind_host: Option<String>,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::Loopback,
            custom_bind_host: None,
            port: 18789,
        }
    }
}

/// How the gateway binds its listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to 127.0.0.1 (default)
    #[default]
    Loopback,
    /// Bind to all interfaces
    Lan,
    /// Bind to `custom_bind_host`
    Custom,
}

impl BindMode {
    /// Resolve the concrete bind host for this mode.
    pub fn resolve_host(self, custom_bind_host: Option<&str>) -> String {
        match self {
            Self::Loopback => "127.0.0.1".to_string(),
            Self::Lan => "0.0.0.0".to_string(),
            Self::Custom => custom_bind_host.unwrap_or("127.0.0.1").to_string(),
        }
    }
}

/// Authentication configuration for gateway control connections.
///
/// Partial by design: missing fields fall back to environment-sourced
/// values and computed defaults during resolution.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Credential mode (token or password). Defaults to password when a
    /// password is configured, token otherwise.
    pub mode: Option<AuthMode>,
    /// Shared token for token mode
    pub token: Option<String>,
    /// Shared password for password mode
    pub password: Option<String>,
    /// Allow identity-proxy-verified callers to authenticate without a
    /// shared secret. Defaults to true only in serve mode with non-password auth.
    pub allow_identity_proxy: Option<bool>,
}

/// Credential mode for gateway connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Shared token supplied by the connecting caller
    Token,
    /// Shared password supplied by the connecting caller
    Password,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Password => write!(f, "password"),
        }
    }
}

/// Identity-proxy integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProxyConfig {
    /// Exposure mode
    pub mode: IdentityProxyMode,
    /// Host suffix the identity proxy serves under (e.g. ".ts.net").
    /// Requests whose Host header ends with this suffix may still count as
    /// local direct when forwarded by the proxy itself.
    pub host_suffix: Option<String>,
    /// Base URL of the identity proxy's local status API used for
    /// authoritative identity lookups
    pub lookup_url: Option<String>,
    /// Timeout for a single identity lookup, in milliseconds.
    /// Expiry is treated as lookup failure (fail closed).
    pub lookup_timeout_ms: u64,
}

impl Default for IdentityProxyConfig {
    fn default() -> Self {
        Self {
            mode: IdentityProxyMode::Off,
            host_suffix: None,
            lookup_url: None,
            lookup_timeout_ms: 2_000,
        }
    }
}

impl IdentityProxyConfig {
    /// Lookup timeout as a [`Duration`].
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Identity-proxy exposure mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProxyMode {
    /// No identity-proxy integration (default)
    #[default]
    Off,
    /// Private serve tier: the proxy fronts the gateway for the operator's
    /// own network only
    Serve,
    /// Public internet relay. Requires password mode.
    Funnel,
}

impl std::fmt::Display for IdentityProxyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Serve => write!(f, "serve"),
            Self::Funnel => write!(f, "funnel"),
        }
    }
}

/// Control UI configuration (unrelated optional subsystem; pass-through only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlUiConfig {
    /// Enable the control UI
    pub enabled: bool,
}

impl Default for ControlUiConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Environment-sourced credential fallbacks, snapshotted once at bootstrap.
///
/// The resolver never reads ambient process state; this is the only place
/// the credential environment variables are consulted.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Value of `RELAYGATE_GATEWAY_TOKEN`, if set
    pub token: Option<String>,
    /// Value of `RELAYGATE_GATEWAY_PASSWORD`, if set
    pub password: Option<String>,
}

impl EnvOverrides {
    /// Snapshot the credential variables from the process environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self {
            token: env::var(ENV_GATEWAY_TOKEN).ok(),
            password: env::var(ENV_GATEWAY_PASSWORD).ok(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (RELAYGATE_ prefix)
        figment = figment.merge(Env::prefixed("RELAYGATE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before credential snapshot)
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}
