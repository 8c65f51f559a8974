//! End-to-end authorization tests
//!
//! Exercises the full decision path: trust classification, the
//! identity-proxy verification carve-outs, credential modes, and the
//! startup policy gate.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use relaygate::config::{AuthConfig, AuthMode, EnvOverrides, IdentityProxyMode};
use relaygate::gateway::auth::{
    AuthMethod, AuthorizationResult, Authorizer, ConnectCredential, DenyReason, ResolvedAuth,
    resolve_auth,
};
use relaygate::gateway::identity::{AuthoritativeIdentity, IdentityLookup, NullIdentityLookup};
use relaygate::gateway::trust::{ForwardedHeaders, RequestMeta};
use relaygate::security::enforce_startup_policy;

const LOOKUP_TIMEOUT: Duration = Duration::from_millis(200);
const CONFIGURED_TOKEN: &str = "T0p$ecretToken1234567890AB";

/// Deterministic identity lookup backed by a map.
struct MapLookup(HashMap<IpAddr, AuthoritativeIdentity>);

#[async_trait]
impl IdentityLookup for MapLookup {
    async fn lookup(&self, ip: IpAddr) -> Option<AuthoritativeIdentity> {
        self.0.get(&ip).cloned()
    }
}

fn token_auth(allow_identity_proxy: bool) -> ResolvedAuth {
    ResolvedAuth {
        mode: AuthMode::Token,
        token: Some(CONFIGURED_TOKEN.to_string()),
        password: None,
        allow_identity_proxy,
    }
}

fn authorizer_with_lookup(auth: ResolvedAuth, lookup: Arc<dyn IdentityLookup>) -> Authorizer {
    Authorizer::new(auth, Vec::new(), Some(".ts.net".to_string()), lookup, LOOKUP_TIMEOUT)
}

fn remote_peer_meta() -> RequestMeta {
    RequestMeta {
        remote_addr: Some("203.0.113.9".parse().unwrap()),
        host: Some("gateway.example.com".to_string()),
        ..RequestMeta::default()
    }
}

fn identity_proxied_meta(login: &str) -> RequestMeta {
    RequestMeta {
        remote_addr: Some("127.0.0.1".parse().unwrap()),
        host: Some("machine.ts.net".to_string()),
        forwarded: ForwardedHeaders {
            forwarded_for: Some("100.64.0.7".to_string()),
            real_ip: None,
            forwarded_host: Some("machine.ts.net".to_string()),
            forwarded_proto: Some("https".to_string()),
        },
        claimed: relaygate::gateway::identity::ClaimedIdentity::from_headers(
            Some(login),
            None,
            None,
        ),
    }
}

fn alice_lookup() -> Arc<MapLookup> {
    let mut map = HashMap::new();
    map.insert(
        "100.64.0.7".parse().unwrap(),
        AuthoritativeIdentity {
            login: "Alice".to_string(),
            name: None,
        },
    );
    Arc::new(MapLookup(map))
}

/// mode=token, non-loopback peer, identity proxy disabled, matching token.
#[tokio::test]
async fn token_mode_grants_remote_caller_with_matching_token() {
    let authorizer = authorizer_with_lookup(token_auth(false), Arc::new(NullIdentityLookup));
    let credential = ConnectCredential {
        token: Some(CONFIGURED_TOKEN.to_string()),
        password: None,
    };

    let result = authorizer
        .authorize(&remote_peer_meta(), Some(&credential))
        .await;
    assert_eq!(
        result,
        AuthorizationResult::Granted {
            method: AuthMethod::Token,
            user: None
        }
    );
}

/// Same setup, mismatched provided token.
#[tokio::test]
async fn token_mode_denies_remote_caller_with_mismatched_token() {
    let authorizer = authorizer_with_lookup(token_auth(false), Arc::new(NullIdentityLookup));
    let credential = ConnectCredential {
        token: Some("T0p$ecretToken1234567890AX".to_string()),
        password: None,
    };

    let result = authorizer
        .authorize(&remote_peer_meta(), Some(&credential))
        .await;
    assert_eq!(
        result,
        AuthorizationResult::Denied {
            reason: DenyReason::TokenMismatch
        }
    );
}

/// Loopback peer carrying the forwarding triad plus a claimed login that the
/// authoritative lookup corroborates (case-insensitively).
#[tokio::test]
async fn identity_proxy_grants_verified_login() {
    let authorizer = authorizer_with_lookup(token_auth(true), alice_lookup());

    let result = authorizer
        .authorize(&identity_proxied_meta("alice"), None)
        .await;
    assert_eq!(
        result,
        AuthorizationResult::Granted {
            method: AuthMethod::IdentityProxy,
            user: Some("Alice".to_string())
        }
    );
}

/// The claimed header alone never authenticates: without a corroborating
/// lookup the identity path falls through to the credential mode.
#[tokio::test]
async fn identity_proxy_falls_through_to_credentials_on_lookup_miss() {
    let authorizer = authorizer_with_lookup(token_auth(true), Arc::new(NullIdentityLookup));

    // No credential either: the denial comes from the token path, not the
    // identity path.
    let result = authorizer
        .authorize(&identity_proxied_meta("alice"), None)
        .await;
    assert_eq!(
        result,
        AuthorizationResult::Denied {
            reason: DenyReason::TokenMissing
        }
    );

    // A valid token still works on the same request.
    let credential = ConnectCredential {
        token: Some(CONFIGURED_TOKEN.to_string()),
        password: None,
    };
    let result = authorizer
        .authorize(&identity_proxied_meta("alice"), Some(&credential))
        .await;
    assert!(result.is_granted());
}

/// A genuine local direct call skips the identity-proxy path entirely: the
/// unverifiable claimed header is ignored and the result depends solely on
/// the credential mode.
#[tokio::test]
async fn local_direct_call_skips_identity_path() {
    let authorizer = authorizer_with_lookup(token_auth(true), alice_lookup());

    let meta = RequestMeta {
        remote_addr: Some("127.0.0.1".parse().unwrap()),
        host: Some("localhost:18789".to_string()),
        forwarded: ForwardedHeaders::default(),
        claimed: relaygate::gateway::identity::ClaimedIdentity::from_headers(
            Some("alice"),
            None,
            None,
        ),
    };

    // No credential: denied by the token path even though a claimed login
    // is present and the lookup would corroborate it.
    let result = authorizer.authorize(&meta, None).await;
    assert_eq!(
        result,
        AuthorizationResult::Denied {
            reason: DenyReason::TokenMissing
        }
    );

    // Loopback grants nothing by itself; the configured credential still
    // decides.
    let credential = ConnectCredential {
        token: Some(CONFIGURED_TOKEN.to_string()),
        password: None,
    };
    let result = authorizer.authorize(&meta, Some(&credential)).await;
    assert_eq!(
        result,
        AuthorizationResult::Granted {
            method: AuthMethod::Token,
            user: None
        }
    );
}

/// Identity-proxy path is consulted for non-local callers even when the
/// credential would also work; first success is terminal.
#[tokio::test]
async fn identity_proxy_wins_before_credentials_for_non_local_callers() {
    let authorizer = authorizer_with_lookup(token_auth(true), alice_lookup());
    let credential = ConnectCredential {
        token: Some(CONFIGURED_TOKEN.to_string()),
        password: None,
    };

    let result = authorizer
        .authorize(&identity_proxied_meta("ALICE"), Some(&credential))
        .await;
    assert_eq!(
        result,
        AuthorizationResult::Granted {
            method: AuthMethod::IdentityProxy,
            user: Some("Alice".to_string())
        }
    );
}

/// Resolver + gate interplay: password mode with an empty
/// password is fatal; token mode with an empty token passes when the
/// identity proxy may stand alone.
#[test]
fn startup_gate_matrix() {
    let env = EnvOverrides::default();

    let password_auth = resolve_auth(
        &AuthConfig {
            mode: Some(AuthMode::Password),
            password: Some(String::new()),
            ..AuthConfig::default()
        },
        &env,
        IdentityProxyMode::Off,
    );
    assert!(
        enforce_startup_policy(&password_auth, "127.0.0.1", 18789, IdentityProxyMode::Off)
            .is_err()
    );

    let token_auth = resolve_auth(
        &AuthConfig {
            mode: Some(AuthMode::Token),
            token: Some(String::new()),
            allow_identity_proxy: Some(true),
            ..AuthConfig::default()
        },
        &env,
        IdentityProxyMode::Serve,
    );
    assert!(
        enforce_startup_policy(&token_auth, "127.0.0.1", 18789, IdentityProxyMode::Serve).is_ok()
    );
}
