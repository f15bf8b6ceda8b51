//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Append the peer IP to X-Forwarded-For
//! - Record the original Host in X-Forwarded-Host
//! - Point Host at the selected backend
//!
//! # Design Decisions
//! - Existing X-Forwarded-For chains are extended, not replaced
//! - Headers named by `Connection` are treated as hop-by-hop too

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Prepare inbound headers for forwarding to `authority`.
pub fn apply_forwarding_headers(headers: &mut HeaderMap, peer_ip: IpAddr, authority: &str) {
    strip_hop_by_hop(headers);

    let peer = peer_ip.to_string();
    let mut forwarded_for = Vec::new();
    if let Some(chain) = headers.get(X_FORWARDED_FOR) {
        let chain = chain.as_bytes();
        if !chain.trim_ascii().is_empty() {
            forwarded_for.extend_from_slice(chain);
            forwarded_for.extend_from_slice(b", ");
        }
    }
    forwarded_for.extend_from_slice(peer.as_bytes());

    match HeaderValue::from_bytes(&forwarded_for) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        Err(_) => {
            tracing::warn!(peer = %peer, "Unusable X-Forwarded-For chain replaced by peer address");
            if let Ok(value) = HeaderValue::from_str(&peer) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
    }

    if let Some(host) = headers.get(header::HOST).cloned() {
        headers.insert(X_FORWARDED_HOST, host);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

    if let Ok(value) = HeaderValue::from_str(authority) {
        headers.insert(header::HOST, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    #[test]
    fn test_forwarding_headers_fresh() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.example.com"));

        apply_forwarding_headers(&mut headers, ip(), "127.0.0.1:8081");

        assert_eq!(headers[X_FORWARDED_FOR], "192.0.2.10");
        assert_eq!(headers[X_FORWARDED_HOST], "gateway.example.com");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert_eq!(headers[header::HOST], "127.0.0.1:8081");
    }

    #[test]
    fn test_forwarded_for_chain_is_extended() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.1"));

        apply_forwarding_headers(&mut headers, ip(), "backend:80");

        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.1, 192.0.2.10");
        assert!(headers.get(X_FORWARDED_HOST).is_none());
    }

    #[test]
    fn test_non_ascii_chain_is_extended() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_bytes(b"203.0.113.1, caf\xc3\xa9").unwrap(),
        );

        apply_forwarding_headers(&mut headers, ip(), "backend:80");

        assert_eq!(
            headers[X_FORWARDED_FOR].as_bytes(),
            b"203.0.113.1, caf\xc3\xa9, 192.0.2.10"
        );
    }

    #[test]
    fn test_strips_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-session-hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::ACCEPT], "*/*");
    }
}
