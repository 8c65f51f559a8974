//! Identity-proxy verification.
//!
//! An identity-aware reverse proxy authenticates the network peer out-of-band
//! and injects a claimed-identity header plus the forwarding triad. The
//! claimed identity is never trusted on its own: it must be corroborated by
//! an authoritative lookup keyed by the forwarded client IP. Any lookup
//! failure or timeout denies the attempt (fail closed).

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::gateway::auth::DenyReason;
use crate::gateway::trust::RequestMeta;
use crate::net;

/// Identity claimed via request headers. Untrusted until corroborated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedIdentity {
    /// Claimed login, non-empty
    pub login: String,
    /// Claimed display name, falls back to the login
    pub name: String,
    /// Cosmetic avatar reference; never trust-bearing
    pub avatar: Option<String>,
}

impl ClaimedIdentity {
    /// Build a claimed identity from raw header values.
    ///
    /// Returns `None` when the login is absent or blank.
    pub fn from_headers(
        login: Option<&str>,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Option<Self> {
        let login = login.map(str::trim).filter(|l| !l.is_empty())?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(login);
        Some(Self {
            login: login.to_string(),
            name: name.to_string(),
            avatar: avatar
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(ToString::to_string),
        })
    }
}

/// Identity returned by the authoritative out-of-band lookup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthoritativeIdentity {
    /// Authoritative login
    pub login: String,
    /// Authoritative display name, if the lookup provides one
    #[serde(default)]
    pub name: Option<String>,
}

/// Verified identity: authoritative login, cosmetic fields merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Authoritative login (never the claimed one)
    pub login: String,
    /// Display name, authoritative first, claimed as fallback
    pub name: String,
    /// Claimed avatar reference, preserved as-is
    pub avatar: Option<String>,
}

/// Authoritative identity lookup keyed by verified client IP.
///
/// Injectable so tests can substitute a deterministic stub. Implementations
/// map their own errors and timeouts to `None`.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Look up the identity behind `ip`, or `None` when unknown.
    async fn lookup(&self, ip: IpAddr) -> Option<AuthoritativeIdentity>;
}

/// Lookup that knows nobody. Used when no identity proxy is configured, so
/// the identity path always fails closed.
#[derive(Debug, Default)]
pub struct NullIdentityLookup;

#[async_trait]
impl IdentityLookup for NullIdentityLookup {
    async fn lookup(&self, _ip: IpAddr) -> Option<AuthoritativeIdentity> {
        None
    }
}

/// Identity lookup against the identity proxy's local status API.
#[derive(Debug, Clone)]
pub struct HttpIdentityLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityLookup {
    /// Create a lookup client against `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl IdentityLookup for HttpIdentityLookup {
    async fn lookup(&self, ip: IpAddr) -> Option<AuthoritativeIdentity> {
        let url = format!("{}/whois?addr={ip}", self.base_url.trim_end_matches('/'));
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, %ip, "Identity lookup request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), %ip, "Identity lookup returned non-success");
            return None;
        }
        match response.json::<AuthoritativeIdentity>().await {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!(error = %e, %ip, "Identity lookup response was not parseable");
                None
            }
        }
    }
}

fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

/// Verify a claimed identity against the authoritative lookup.
///
/// Preconditions are checked in order and the first failure short-circuits:
/// 1. a claimed identity is present,
/// 2. the immediate peer is loopback and presents the full forwarding triad,
/// 3. a client IP is derivable from the forwarding header,
/// 4. the lookup returns an identity with a non-empty login,
/// 5. the authoritative and claimed logins match (trimmed, case-insensitive).
///
/// A lookup that errors or outlives `timeout` counts as not found.
pub async fn verify_identity_proxy(
    meta: &RequestMeta,
    lookup: &dyn IdentityLookup,
    timeout: Duration,
) -> Result<VerifiedIdentity, DenyReason> {
    let Some(claimed) = meta.claimed.as_ref() else {
        return Err(DenyReason::IdentityMissing);
    };

    let peer_is_loopback = meta.remote_addr.is_some_and(net::is_loopback_ip);
    if !peer_is_loopback || !meta.forwarded.full_triad() {
        return Err(DenyReason::ProxyMarkersMissing);
    }

    let client_ip = meta
        .forwarded
        .forwarded_for
        .as_deref()
        .and_then(net::first_forwarded_ip)
        .ok_or(DenyReason::LookupFailed)?;

    let authoritative = match tokio::time::timeout(timeout, lookup.lookup(client_ip)).await {
        Ok(Some(identity)) if !identity.login.trim().is_empty() => identity,
        Ok(_) => return Err(DenyReason::LookupFailed),
        Err(_) => {
            debug!(%client_ip, "Identity lookup timed out");
            return Err(DenyReason::LookupFailed);
        }
    };

    if normalize_login(&authoritative.login) != normalize_login(&claimed.login) {
        return Err(DenyReason::IdentityMismatch);
    }

    Ok(VerifiedIdentity {
        login: authoritative.login,
        name: authoritative.name.unwrap_or_else(|| claimed.name.clone()),
        avatar: claimed.avatar.clone(),
    })
}
