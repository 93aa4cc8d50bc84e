//! Client identification and PII hashing
//!
//! Each request is attributed to a best-effort client identity, picked from
//! the strongest signal available:
//!
//! 1. An explicit identification header (`x-client-id`, `x-api-key`, ...)
//! 2. The leading characters of a bearer token (an opaque grouping key; the
//!    token is never decoded or verified)
//! 3. The authenticated user id
//! 4. The resolved client IP
//!
//! The raw identity is hashed before it reaches the store, as are the IP,
//! user agent and user id recorded alongside it.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;

/// Stored in place of an IP that could not be resolved. Never hashed.
pub const UNKNOWN_IP: &str = "unknown";

/// Headers that explicitly name the calling client, in priority order
pub const CLIENT_ID_HEADERS: &[&str] = &[
    "x-client-id",
    "x-api-key",
    "x-app-id",
    "x-consumer-id",
    "x-tenant-id",
    "client-id",
    "api-key",
];

/// Proxy/CDN headers carrying the originating IP, in priority order
const IP_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
    "true-client-ip",
];

const TOKEN_PREFIX_LEN: usize = 32;
const HASH_LEN: usize = 16;

/// The signal a client was identified by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIdentity {
    Header { name: &'static str, value: String },
    Token(String),
    User(String),
    Ip(String),
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { name, value } => write!(f, "header:{}:{}", name, value),
            Self::Token(prefix) => write!(f, "jwt:{}", prefix),
            Self::User(id) => write!(f, "user:{}", id),
            Self::Ip(addr) => write!(f, "ip:{}", addr),
        }
    }
}

impl ClientIdentity {
    /// Hashed form stored as `client_identifier_hash`
    pub fn hash(&self) -> Option<String> {
        hash_identifier(&self.to_string())
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Originating client IP, or [`UNKNOWN_IP`]
///
/// Only the first entry of `x-forwarded-for` is used; later entries are proxies.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    for name in IP_HEADERS {
        let Some(value) = header_value(headers, name) else {
            continue;
        };
        let candidate = if *name == "x-forwarded-for" {
            value.split(',').next().unwrap_or_default().trim()
        } else {
            value
        };
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Pick the strongest identity signal present on a request
pub fn identify_client(
    headers: &HeaderMap,
    user_id: Option<&str>,
    client_ip: &str,
) -> Option<ClientIdentity> {
    for &name in CLIENT_ID_HEADERS {
        if let Some(value) = header_value(headers, name) {
            return Some(ClientIdentity::Header {
                name,
                value: value.to_string(),
            });
        }
    }

    if let Some(token) = header_value(headers, header::AUTHORIZATION.as_str())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        let prefix: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
        return Some(ClientIdentity::Token(prefix));
    }

    if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
        return Some(ClientIdentity::User(user_id.to_string()));
    }

    if !client_ip.is_empty() && client_ip != UNKNOWN_IP {
        return Some(ClientIdentity::Ip(client_ip.to_string()));
    }

    None
}

/// Truncated SHA-256 hex digest. Empty input and the unknown-IP sentinel yield `None`.
pub fn hash_identifier(value: &str) -> Option<String> {
    if value.is_empty() || value == UNKNOWN_IP {
        return None;
    }

    let digest = Sha256::digest(value.as_bytes());
    let mut hex = String::with_capacity(HASH_LEN);
    for byte in digest.iter().take(HASH_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    Some(hex)
}

/// Hash an IP for storage, keeping the unknown sentinel readable
pub fn hash_client_ip(client_ip: &str) -> String {
    hash_identifier(client_ip).unwrap_or_else(|| UNKNOWN_IP.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_hash_identifier() {
        let hash = hash_identifier("header:x-client-id:mobile-app").unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(Some(hash), hash_identifier("header:x-client-id:mobile-app"));

        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(hash_identifier("abc").as_deref(), Some("ba7816bf8f01cfea"));

        assert_eq!(hash_identifier(""), None);
        assert_eq!(hash_identifier(UNKNOWN_IP), None);
        assert_eq!(hash_client_ip(UNKNOWN_IP), UNKNOWN_IP);
    }

    #[test]
    fn test_header_priority() {
        let map = headers(&[("x-app-id", "app"), ("x-api-key", "key-1"), ("api-key", "other")]);
        let identity = identify_client(&map, Some("42"), "10.0.0.1").unwrap();
        assert_eq!(
            identity,
            ClientIdentity::Header { name: "x-api-key", value: "key-1".to_string() }
        );
        assert_eq!(identity.to_string(), "header:x-api-key:key-1");
    }

    #[test]
    fn test_same_header_same_hash() {
        let a = identify_client(&headers(&[("x-client-id", "svc")]), None, "10.0.0.1");
        let b = identify_client(&headers(&[("x-client-id", "svc")]), Some("7"), "10.0.0.2");
        assert_eq!(a.unwrap().hash(), b.unwrap().hash());
    }

    #[test]
    fn test_bearer_token_prefix() {
        let token = "Bearer abcdefghijklmnopqrstuvwxyz0123456789TAIL";
        let map = headers(&[("authorization", token)]);
        let identity = identify_client(&map, Some("42"), "10.0.0.1").unwrap();
        assert_eq!(identity.to_string(), "jwt:abcdefghijklmnopqrstuvwxyz012345");

        // Non-bearer schemes are ignored
        let map = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        let identity = identify_client(&map, Some("42"), "10.0.0.1").unwrap();
        assert_eq!(identity, ClientIdentity::User("42".to_string()));
    }

    #[test]
    fn test_ip_fallback_and_unknown() {
        let identity = identify_client(&HeaderMap::new(), None, "10.0.0.1").unwrap();
        assert_eq!(identity.to_string(), "ip:10.0.0.1");

        assert_eq!(identify_client(&HeaderMap::new(), None, UNKNOWN_IP), None);
        assert_eq!(identify_client(&HeaderMap::new(), Some(""), ""), None);
    }

    #[test]
    fn test_resolve_client_ip_precedence() {
        let map = headers(&[
            ("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"),
            ("x-real-ip", "198.51.100.1"),
        ]);
        assert_eq!(resolve_client_ip(&map, None), "203.0.113.7");

        let map = headers(&[("cf-connecting-ip", "198.51.100.9"), ("true-client-ip", "1.1.1.1")]);
        assert_eq!(resolve_client_ip(&map, None), "198.51.100.9");

        // An empty first forwarded entry falls through to the next header
        let map = headers(&[("x-forwarded-for", ", 10.0.0.1"), ("x-client-ip", "192.0.2.4")]);
        assert_eq!(resolve_client_ip(&map, None), "192.0.2.4");

        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(resolve_client_ip(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), UNKNOWN_IP);
    }
}
