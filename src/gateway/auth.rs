//! Per-connection authorization.
//!
//! Combines trust classification, identity-proxy verification, and
//! constant-time credential checks into a single admit/deny decision.
//! Authorization is stateless: the [`Authorizer`] is built once per
//! (re)configuration and shared read-only across concurrent attempts.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::{AuthConfig, AuthMode, EnvOverrides, IdentityProxyMode};
use crate::gateway::identity::{IdentityLookup, verify_identity_proxy};
use crate::gateway::trust::{RequestMeta, classify_trust};

/// Resolved authentication configuration.
///
/// Computed once per gateway (re)configuration; read-only thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    /// Credential mode; never absent after resolution
    pub mode: AuthMode,
    /// Shared token, if configured
    pub token: Option<String>,
    /// Shared password, if configured
    pub password: Option<String>,
    /// Whether identity-proxy-verified callers may authenticate
    pub allow_identity_proxy: bool,
}

/// Merge config, environment fallbacks, and the identity-proxy exposure mode
/// into a [`ResolvedAuth`].
///
/// Precedence: explicit config > environment fallback > computed default.
/// Idempotent; does not mutate its inputs.
pub fn resolve_auth(
    auth: &AuthConfig,
    env: &EnvOverrides,
    proxy_mode: IdentityProxyMode,
) -> ResolvedAuth {
    let token = auth.token.clone().or_else(|| env.token.clone());
    let password = auth.password.clone().or_else(|| env.password.clone());
    let has_password = password.as_deref().is_some_and(|p| !p.is_empty());
    let mode = auth.mode.unwrap_or(if has_password {
        AuthMode::Password
    } else {
        AuthMode::Token
    });
    let allow_identity_proxy = auth
        .allow_identity_proxy
        .unwrap_or(proxy_mode == IdentityProxyMode::Serve && mode != AuthMode::Password);
    ResolvedAuth {
        mode,
        token,
        password,
        allow_identity_proxy,
    }
}

/// Credential supplied by the connecting caller. Untrusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectCredential {
    /// Provided token
    #[serde(default)]
    pub token: Option<String>,
    /// Provided password
    #[serde(default)]
    pub password: Option<String>,
}

/// How a connection authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Shared token matched
    Token,
    /// Shared password matched
    Password,
    /// Identity-proxy verification succeeded
    IdentityProxy,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Password => write!(f, "password"),
            Self::IdentityProxy => write!(f, "identity-proxy"),
        }
    }
}

/// Why a connection was denied.
///
/// Server-side diagnostics only. The wire response never distinguishes these
/// (see the connect handler), so an unauthenticated caller cannot use them to
/// probe for valid credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Token mode is active but no token is configured
    TokenMissingConfig,
    /// Caller supplied no token
    TokenMissing,
    /// Supplied token did not match
    TokenMismatch,
    /// Password mode is active but no password is configured
    PasswordMissingConfig,
    /// Caller supplied no password
    PasswordMissing,
    /// Supplied password did not match
    PasswordMismatch,
    /// No claimed identity header was present
    IdentityMissing,
    /// Peer is not loopback or the forwarding triad is incomplete
    ProxyMarkersMissing,
    /// Authoritative lookup failed, timed out, or found nobody
    LookupFailed,
    /// Authoritative login did not match the claimed login
    IdentityMismatch,
    /// No authentication method matched
    Unauthorized,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TokenMissingConfig => "token_missing_config",
            Self::TokenMissing => "token_missing",
            Self::TokenMismatch => "token_mismatch",
            Self::PasswordMissingConfig => "password_missing_config",
            Self::PasswordMissing => "password_missing",
            Self::PasswordMismatch => "password_mismatch",
            Self::IdentityMissing => "identity_missing",
            Self::ProxyMarkersMissing => "proxy_markers_missing",
            Self::LookupFailed => "lookup_failed",
            Self::IdentityMismatch => "identity_mismatch",
            Self::Unauthorized => "unauthorized",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one authorization attempt. Created fresh per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    /// Connection admitted
    Granted {
        /// Method that authenticated the caller
        method: AuthMethod,
        /// Verified user, when the method establishes one
        user: Option<String>,
    },
    /// Connection denied
    Denied {
        /// Server-side denial reason
        reason: DenyReason,
    },
}

impl AuthorizationResult {
    /// True when the connection was admitted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Constant-time comparison of a caller-supplied secret against the
/// configured one.
///
/// Short-circuits only on length mismatch; lengths are not secret. The byte
/// comparison itself runs in time independent of where the first mismatch
/// occurs.
pub fn verify_secret(provided: &str, configured: &str) -> bool {
    if provided.len() != configured.len() {
        return false;
    }
    provided
        .as_bytes()
        .ct_eq(configured.as_bytes())
        .into()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Per-connection authorizer.
///
/// Holds the resolved auth snapshot and the injectable identity lookup.
/// Safe to share across arbitrarily many concurrent connection attempts.
pub struct Authorizer {
    auth: ResolvedAuth,
    trusted_proxies: Vec<String>,
    serve_host_suffix: Option<String>,
    lookup: Arc<dyn IdentityLookup>,
    lookup_timeout: Duration,
}

impl Authorizer {
    /// Create an authorizer from a resolved auth snapshot.
    pub fn new(
        auth: ResolvedAuth,
        trusted_proxies: Vec<String>,
        serve_host_suffix: Option<String>,
        lookup: Arc<dyn IdentityLookup>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            trusted_proxies,
            serve_host_suffix,
            lookup,
            lookup_timeout,
        }
    }

    /// The resolved auth snapshot this authorizer decides with.
    pub fn resolved_auth(&self) -> &ResolvedAuth {
        &self.auth
    }

    /// Authorize one connection attempt.
    ///
    /// The identity-proxy path runs first for non-local callers when allowed;
    /// on failure it falls through to the credential mode rather than denying
    /// outright. A local direct caller skips the identity path entirely but
    /// still must satisfy the configured credential mode: loopback is never
    /// implicit trust.
    pub async fn authorize(
        &self,
        meta: &RequestMeta,
        credential: Option<&ConnectCredential>,
    ) -> AuthorizationResult {
        let trust = classify_trust(meta, &self.trusted_proxies, self.serve_host_suffix.as_deref());

        if self.auth.allow_identity_proxy && !trust.is_local_direct {
            match verify_identity_proxy(meta, &*self.lookup, self.lookup_timeout).await {
                Ok(identity) => {
                    return AuthorizationResult::Granted {
                        method: AuthMethod::IdentityProxy,
                        user: Some(identity.login),
                    };
                }
                Err(reason) => {
                    // Fall through to the credential mode.
                    debug!(%reason, "Identity-proxy path did not authenticate");
                }
            }
        }

        match self.auth.mode {
            AuthMode::Token => {
                let Some(configured) = non_empty(self.auth.token.as_deref()) else {
                    return AuthorizationResult::Denied {
                        reason: DenyReason::TokenMissingConfig,
                    };
                };
                let Some(provided) = non_empty(credential.and_then(|c| c.token.as_deref())) else {
                    return AuthorizationResult::Denied {
                        reason: DenyReason::TokenMissing,
                    };
                };
                if !verify_secret(provided, configured) {
                    return AuthorizationResult::Denied {
                        reason: DenyReason::TokenMismatch,
                    };
                }
                AuthorizationResult::Granted {
                    method: AuthMethod::Token,
                    user: None,
                }
            }
            AuthMode::Password => {
                let Some(configured) = non_empty(self.auth.password.as_deref()) else {
                    return AuthorizationResult::Denied {
                        reason: DenyReason::PasswordMissingConfig,
                    };
                };
                let Some(provided) = non_empty(credential.and_then(|c| c.password.as_deref()))
                else {
                    return AuthorizationResult::Denied {
                        reason: DenyReason::PasswordMissing,
                    };
                };
                if !verify_secret(provided, configured) {
                    return AuthorizationResult::Denied {
                        reason: DenyReason::PasswordMismatch,
                    };
                }
                AuthorizationResult::Granted {
                    method: AuthMethod::Password,
                    user: None,
                }
            }
        }
    }
}
