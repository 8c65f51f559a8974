//! Startup policy gate.
//!
//! Validates the resolved auth configuration against the binding mode and
//! identity-proxy exposure before the gateway begins listening. Violations
//! are fatal ([`crate::Error::Policy`]); advisories are surfaced to the
//! operator but never block startup. Checks run in a fixed order because
//! later checks assume the earlier ones passed.

use crate::config::{AuthMode, IdentityProxyMode};
use crate::gateway::auth::ResolvedAuth;
use crate::net;
use crate::{Error, Result};

/// Non-fatal operator advisory produced by the startup gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    /// Human-readable advisory message
    pub message: String,
}

impl Advisory {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

const MIN_TOKEN_LENGTH: usize = 24;

/// Prefixes that mark a token as weak or default, checked case-insensitively.
const WEAK_TOKEN_PREFIXES: &[&str] = &[
    "password", "token", "secret", "test", "demo", "admin", "default", "123", "abc", "qwe", "aaa",
];

enum TokenStrength {
    Strong,
    LowComplexity(String),
    Weak(String),
}

fn check_token_strength(token: &str) -> TokenStrength {
    let trimmed = token.trim();

    let char_count = trimmed.chars().count();
    if char_count < MIN_TOKEN_LENGTH {
        return TokenStrength::Weak(format!(
            "token is too short ({char_count} chars); use at least 32 characters"
        ));
    }

    let lowered = trimmed.to_lowercase();
    if WEAK_TOKEN_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return TokenStrength::Weak(
            "token appears to be weak or default; generate a strong random token, e.g. \
             `openssl rand -base64 32`"
                .to_string(),
        );
    }

    // A single character repeated through the whole token.
    let mut chars = trimmed.chars();
    if let Some(first) = chars.next() {
        if trimmed.chars().count() >= 11 && chars.all(|c| c == first) {
            return TokenStrength::Weak(
                "token is a single repeated character; generate a strong random token, e.g. \
                 `openssl rand -base64 32`"
                    .to_string(),
            );
        }
    }

    let has_lowercase = trimmed.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = trimmed.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = trimmed.chars().any(|c| c.is_ascii_digit());
    let has_symbol = trimmed.chars().any(|c| !c.is_ascii_alphanumeric());
    let class_count = usize::from(has_lowercase)
        + usize::from(has_uppercase)
        + usize::from(has_digit)
        + usize::from(has_symbol);

    if class_count < 2 {
        return TokenStrength::LowComplexity(
            "token has low complexity; consider mixing letters, numbers, and symbols".to_string(),
        );
    }

    TokenStrength::Strong
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Enforce the startup policy. Returns advisories on success.
///
/// # Errors
///
/// Returns [`Error::Policy`] with an actionable message when the
/// configuration is unsafe to serve with:
/// - token mode without a token (unless the identity proxy is the sole
///   authentication path),
/// - password mode without a password,
/// - a weak token,
/// - funnel exposure without password mode,
/// - any identity-proxy exposure on a non-loopback binding,
/// - a non-loopback binding with no usable shared secret.
pub fn enforce_startup_policy(
    auth: &ResolvedAuth,
    bind_host: &str,
    port: u16,
    proxy_mode: IdentityProxyMode,
) -> Result<Vec<Advisory>> {
    let mut advisories = Vec::new();

    let has_token = non_blank(auth.token.as_deref());
    let has_password = non_blank(auth.password.as_deref());

    // 1. Token mode needs a token, unless identity-proxy auth can stand alone.
    if auth.mode == AuthMode::Token && !has_token && !auth.allow_identity_proxy {
        return Err(Error::Policy(
            "auth mode is token, but no token was configured.\n\
             To fix this:\n  \
             1. Generate a token: openssl rand -base64 32\n  \
             2. Set it: export RELAYGATE_GATEWAY_TOKEN=\"<generated-token>\"\n  \
             3. Or add it to the config file under auth.token"
                .to_string(),
        ));
    }

    // 2. Password mode needs a password, unconditionally.
    if auth.mode == AuthMode::Password && !has_password {
        return Err(Error::Policy(
            "auth mode is password, but no password was configured \
             (set auth.password or RELAYGATE_GATEWAY_PASSWORD)"
                .to_string(),
        ));
    }

    // 3. Token strength.
    if auth.mode == AuthMode::Token {
        if let Some(token) = auth.token.as_deref().filter(|t| !t.trim().is_empty()) {
            match check_token_strength(token) {
                TokenStrength::Strong => {}
                TokenStrength::LowComplexity(message) => {
                    advisories.push(Advisory::new(message));
                }
                TokenStrength::Weak(message) => {
                    return Err(Error::Policy(format!(
                        "weak gateway token detected: {message}"
                    )));
                }
            }
        }
    }

    // 4. Funnel exposes the gateway to the public internet.
    if proxy_mode == IdentityProxyMode::Funnel && auth.mode != AuthMode::Password {
        return Err(Error::Policy(
            "identity-proxy funnel requires auth mode=password \
             (set auth.password or RELAYGATE_GATEWAY_PASSWORD)"
                .to_string(),
        ));
    }

    // 5. Any identity-proxy exposure requires a loopback binding; the proxy
    //    is the only intended path in.
    let bind_is_loopback = net::is_loopback_host(bind_host);
    if proxy_mode != IdentityProxyMode::Off && !bind_is_loopback {
        return Err(Error::Policy(format!(
            "identity-proxy {proxy_mode} requires bind=loopback (127.0.0.1), \
             but the gateway is configured to bind {bind_host}"
        )));
    }

    let has_shared_secret = match auth.mode {
        AuthMode::Token => has_token,
        AuthMode::Password => has_password,
    };

    // 6. Never expose an unauthenticated listener beyond loopback.
    if !bind_is_loopback && !has_shared_secret {
        return Err(Error::Policy(format!(
            "refusing to bind the gateway to {bind_host}:{port} without authentication.\n\
             This would expose the gateway to network/internet access without protection.\n\
             To fix this:\n  \
             1. Generate a token: openssl rand -base64 32\n  \
             2. Set it: export RELAYGATE_GATEWAY_TOKEN=\"<generated-token>\"\n  \
             3. Or use a loopback binding: server.bind=loopback (or --bind loopback)"
        )));
    }

    // 7. Non-loopback with a secret is allowed, but worth flagging.
    if !bind_is_loopback && has_shared_secret {
        advisories.push(Advisory::new(format!(
            "gateway exposed on {bind_host}:{port}; ensure your firewall is configured \
             and prefer identity-proxy serve mode for remote access"
        )));
    }

    Ok(advisories)
}
