//! Trust classification for inbound control connections.
//!
//! Decides whether a caller is a *local direct* client. The classification
//! combines three signals that must all agree: the effective client IP, the
//! request host, and the forwarding headers. A spoofed `Host` or forwarding
//! header from a non-proxy peer must never make a remote caller look local.

use std::net::IpAddr;

use crate::gateway::identity::ClaimedIdentity;
use crate::net;

/// Forwarding headers as received on the request, unparsed and untrusted.
#[derive(Debug, Clone, Default)]
pub struct ForwardedHeaders {
    /// `X-Forwarded-For` value
    pub forwarded_for: Option<String>,
    /// `X-Real-Ip` value
    pub real_ip: Option<String>,
    /// `X-Forwarded-Host` value
    pub forwarded_host: Option<String>,
    /// `X-Forwarded-Proto` value
    pub forwarded_proto: Option<String>,
}

impl ForwardedHeaders {
    /// True when any forwarding header is present on the request.
    pub fn any_present(&self) -> bool {
        self.forwarded_for.is_some() || self.real_ip.is_some() || self.forwarded_host.is_some()
    }

    /// True when the full forwarding triad (for, proto, host) is present.
    ///
    /// The identity proxy always injects all three; a partial set means the
    /// request did not come through it.
    pub fn full_triad(&self) -> bool {
        self.forwarded_for.is_some()
            && self.forwarded_proto.is_some()
            && self.forwarded_host.is_some()
    }
}

/// Connection metadata for one authorization attempt.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Transport-level peer address. Cannot be forged by headers.
    pub remote_addr: Option<IpAddr>,
    /// `Host` header value
    pub host: Option<String>,
    /// Forwarding headers
    pub forwarded: ForwardedHeaders,
    /// Claimed identity extracted from identity-proxy headers; untrusted
    /// until corroborated by an authoritative lookup
    pub claimed: Option<ClaimedIdentity>,
}

/// Result of trust classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustClassification {
    /// Caller is a genuine local direct client
    pub is_local_direct: bool,
    /// Effective client IP after proxy-trust evaluation
    pub effective_client_ip: Option<IpAddr>,
    /// Immediate peer is an operator-declared trusted proxy
    pub is_behind_known_proxy: bool,
}

/// Classify the trust level of a connection attempt.
///
/// `is_local_direct` requires all of:
/// - the effective client IP is loopback,
/// - the request host is local (`localhost`/`127.0.0.1`/`::1`) or ends with
///   the identity-proxy serve host suffix,
/// - no forwarding headers are present, or the immediate peer is a trusted
///   proxy.
///
/// Pure and deterministic; performs no I/O.
pub fn classify_trust(
    meta: &RequestMeta,
    trusted_proxies: &[String],
    serve_host_suffix: Option<&str>,
) -> TrustClassification {
    let effective_client_ip = net::resolve_client_ip(
        meta.remote_addr,
        meta.forwarded.forwarded_for.as_deref(),
        meta.forwarded.real_ip.as_deref(),
        trusted_proxies,
    );
    let is_behind_known_proxy = net::is_trusted_proxy(meta.remote_addr, trusted_proxies);

    let client_is_loopback = effective_client_ip.is_some_and(net::is_loopback_ip);

    let host = net::host_name(meta.host.as_deref());
    let host_is_local = net::is_local_host_name(&host);
    let host_is_serve = serve_host_suffix
        .filter(|suffix| !suffix.is_empty())
        .is_some_and(|suffix| host.ends_with(suffix));

    let headers_are_plausible = !meta.forwarded.any_present() || is_behind_known_proxy;

    TrustClassification {
        is_local_direct: client_is_loopback
            && (host_is_local || host_is_serve)
            && headers_are_plausible,
        effective_client_ip,
        is_behind_known_proxy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_meta() -> RequestMeta {
        RequestMeta {
            remote_addr: Some("127.0.0.1".parse().unwrap()),
            host: Some("localhost:18789".to_string()),
            ..RequestMeta::default()
        }
    }

    #[test]
    fn direct_loopback_is_local() {
        let trust = classify_trust(&loopback_meta(), &[], None);
        assert!(trust.is_local_direct);
        assert_eq!(trust.effective_client_ip, "127.0.0.1".parse().ok());
        assert!(!trust.is_behind_known_proxy);
    }

    #[test]
    fn non_loopback_peer_is_never_local() {
        // Headers cannot fake the transport-level peer address.
        let meta = RequestMeta {
            remote_addr: Some("203.0.113.9".parse().unwrap()),
            host: Some("localhost".to_string()),
            forwarded: ForwardedHeaders {
                forwarded_for: Some("127.0.0.1".to_string()),
                ..ForwardedHeaders::default()
            },
            ..RequestMeta::default()
        };
        let trust = classify_trust(&meta, &[], None);
        assert!(!trust.is_local_direct);
        assert_eq!(trust.effective_client_ip, "203.0.113.9".parse().ok());
    }

    #[test]
    fn forwarding_headers_from_untrusted_peer_break_localness() {
        // Loopback peer, local host, but a forged forwarding header and the
        // peer is not a declared proxy.
        let mut meta = loopback_meta();
        meta.forwarded.forwarded_for = Some("127.0.0.1".to_string());
        let trust = classify_trust(&meta, &[], None);
        assert!(!trust.is_local_direct);
    }

    #[test]
    fn forwarding_headers_from_trusted_proxy_keep_localness() {
        let mut meta = loopback_meta();
        meta.forwarded.forwarded_for = Some("127.0.0.1".to_string());
        let trust = classify_trust(&meta, &["127.0.0.1".to_string()], None);
        assert!(trust.is_local_direct);
        assert!(trust.is_behind_known_proxy);
    }

    #[test]
    fn trusted_proxy_forwarding_remote_client_is_not_local() {
        let mut meta = loopback_meta();
        meta.forwarded.forwarded_for = Some("203.0.113.9".to_string());
        let trust = classify_trust(&meta, &["127.0.0.1".to_string()], None);
        // Effective client is the forwarded address, which is not loopback.
        assert!(!trust.is_local_direct);
        assert_eq!(trust.effective_client_ip, "203.0.113.9".parse().ok());
    }

    #[test]
    fn non_local_host_breaks_localness() {
        let mut meta = loopback_meta();
        meta.host = Some("gateway.example.com".to_string());
        let trust = classify_trust(&meta, &[], None);
        assert!(!trust.is_local_direct);
    }

    #[test]
    fn serve_host_suffix_counts_as_local() {
        let mut meta = loopback_meta();
        meta.host = Some("machine.tail1234.ts.net".to_string());
        assert!(!classify_trust(&meta, &[], None).is_local_direct);
        assert!(classify_trust(&meta, &[], Some(".ts.net")).is_local_direct);
    }

    #[test]
    fn ipv4_mapped_loopback_peer_is_local() {
        let mut meta = loopback_meta();
        meta.remote_addr = Some("::ffff:127.0.0.1".parse().unwrap());
        assert!(classify_trust(&meta, &[], None).is_local_direct);
    }

    #[test]
    fn missing_peer_address_is_not_local() {
        let meta = RequestMeta {
            host: Some("localhost".to_string()),
            ..RequestMeta::default()
        };
        assert!(!classify_trust(&meta, &[], None).is_local_direct);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let mut meta = loopback_meta();
        meta.forwarded.forwarded_for = Some("203.0.113.9".to_string());
        let trusted = vec!["127.0.0.1".to_string()];
        let first = classify_trust(&meta, &trusted, Some(".ts.net"));
        let second = classify_trust(&meta, &trusted, Some(".ts.net"));
        assert_eq!(first, second);
    }
}
