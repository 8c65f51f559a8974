//! Network primitives for client-IP resolution and proxy-trust matching.
//!
//! Forwarded headers (`X-Forwarded-For`, `X-Real-Ip`) are only honored when
//! the immediate transport-level peer is an operator-declared trusted proxy;
//! any other peer could forge them.

use std::net::IpAddr;

/// Parse an IP address from header or config text.
///
/// Accepts bracket-enclosed IPv6 literals (`[::1]`) and strips a trailing
/// `%zone` identifier.
pub fn parse_ip(value: &str) -> Option<IpAddr> {
    let trimmed = value.trim();
    let unbracketed = trimmed.trim_start_matches('[').trim_end_matches(']');
    let no_zone = unbracketed.split('%').next().unwrap_or(unbracketed);
    no_zone.parse::<IpAddr>().ok()
}

/// Check whether an address is loopback, including IPv4-mapped IPv6
/// loopback (`::ffff:127.x.x.x`) which would otherwise slip past a naive
/// `Ipv6Addr::is_loopback` check.
pub fn is_loopback_ip(addr: IpAddr) -> bool {
    addr.to_canonical().is_loopback()
}

/// First client IP from an `X-Forwarded-For`-style header.
///
/// The header is a comma-separated chain; the leftmost entry is the
/// originating client as reported by the first proxy.
pub fn first_forwarded_ip(forwarded_for: &str) -> Option<IpAddr> {
    forwarded_for.split(',').next().and_then(parse_ip)
}

/// Check whether the immediate peer matches the trusted-proxy allow-list.
///
/// Entries are compared as canonicalized addresses, so `::ffff:10.0.0.1`
/// and `10.0.0.1` match each other.
pub fn is_trusted_proxy(remote_addr: Option<IpAddr>, trusted_proxies: &[String]) -> bool {
    let Some(remote) = remote_addr else {
        return false;
    };
    let remote = remote.to_canonical();
    trusted_proxies
        .iter()
        .filter_map(|entry| parse_ip(entry))
        .any(|proxy| proxy.to_canonical() == remote)
}

/// Resolve the effective client IP for a request.
///
/// Returns the forwarded-header-derived IP only when the immediate peer is a
/// trusted proxy; otherwise returns the peer address unchanged.
pub fn resolve_client_ip(
    remote_addr: Option<IpAddr>,
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    trusted_proxies: &[String],
) -> Option<IpAddr> {
    if is_trusted_proxy(remote_addr, trusted_proxies) {
        let forwarded = forwarded_for
            .and_then(first_forwarded_ip)
            .or_else(|| real_ip.and_then(parse_ip));
        if let Some(ip) = forwarded {
            return Some(ip);
        }
    }
    remote_addr
}

/// Extract the bare host name from a `Host` header value.
///
/// Lowercases, strips the port, and unwraps bracketed IPv6 literals.
pub fn host_name(host_header: Option<&str>) -> String {
    let host = host_header.unwrap_or("").trim().to_ascii_lowercase();
    if host.is_empty() {
        return String::new();
    }
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
    }
    host.split(':').next().unwrap_or("").to_string()
}

/// Check whether a host name refers to the local machine.
pub fn is_local_host_name(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "::1"
}

/// Check whether a bind host keeps the listener loopback-only.
pub fn is_loopback_host(bind_host: &str) -> bool {
    if bind_host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    parse_ip(bind_host).is_some_and(is_loopback_ip)
}
