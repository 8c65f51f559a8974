//! Runtime configuration resolution.
//!
//! Merges file/env configuration with CLI overrides into one immutable
//! snapshot, resolves auth, and runs the startup policy gate. Called once at
//! boot (and again on an explicit reload) before the gateway listens.

use std::time::Duration;

use tracing::warn;

use crate::config::{BindMode, Config, EnvOverrides, IdentityProxyMode};
use crate::gateway::auth::{ResolvedAuth, resolve_auth};
use crate::security::enforce_startup_policy;
use crate::Result;

/// CLI-sourced overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Listen port override
    pub port: Option<u16>,
    /// Bind mode override
    pub bind: Option<BindMode>,
    /// Bind host override (wins over the bind mode)
    pub host: Option<String>,
    /// Skip the control UI subsystem
    pub no_control_ui: bool,
}

/// Fully resolved runtime configuration, immutable once built.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Host the listener binds to
    pub bind_host: String,
    /// Port the listener binds to
    pub port: u16,
    /// Whether the control UI subsystem starts
    pub control_ui_enabled: bool,
    /// Resolved authentication snapshot
    pub resolved_auth: ResolvedAuth,
    /// Identity-proxy exposure mode
    pub identity_proxy_mode: IdentityProxyMode,
    /// Peers allowed to set forwarding headers
    pub trusted_proxies: Vec<String>,
    /// Identity-proxy serve host suffix
    pub serve_host_suffix: Option<String>,
    /// Identity lookup endpoint, if configured
    pub lookup_url: Option<String>,
    /// Per-attempt identity lookup timeout
    pub lookup_timeout: Duration,
}

/// Resolve the runtime configuration and enforce the startup policy.
///
/// Advisories from the policy gate are logged here; fatal violations are
/// returned as [`crate::Error::Policy`] and must abort startup.
pub fn resolve_runtime_config(
    config: &Config,
    cli: &CliOverrides,
    env: &EnvOverrides,
) -> Result<RuntimeConfig> {
    let bind_mode = cli.bind.unwrap_or(config.server.bind);
    let bind_host = cli
        .host
        .clone()
        .unwrap_or_else(|| bind_mode.resolve_host(config.server.custom_bind_host.as_deref()));
    let port = cli.port.unwrap_or(config.server.port);
    let control_ui_enabled = !cli.no_control_ui && config.control_ui.enabled;

    let proxy_mode = config.identity_proxy.mode;
    let resolved_auth = resolve_auth(&config.auth, env, proxy_mode);

    let advisories = enforce_startup_policy(&resolved_auth, &bind_host, port, proxy_mode)?;
    for advisory in advisories {
        warn!("SECURITY: {}", advisory.message);
    }

    Ok(RuntimeConfig {
        bind_host,
        port,
        control_ui_enabled,
        resolved_auth,
        identity_proxy_mode: proxy_mode,
        trusted_proxies: config.trusted_proxies.clone(),
        serve_host_suffix: config.identity_proxy.host_suffix.clone(),
        lookup_url: config.identity_proxy.lookup_url.clone(),
        lookup_timeout: config.identity_proxy.lookup_timeout(),
    })
}
