//! Client IP extraction from forwarding headers
//!
//! The address recorded for a visit comes from:
//! - `CF-Connecting-IP` in Cloudflare mode
//! - RFC 7239 `Forwarded`, then `X-Forwarded-For`, in standard mode
//! - the socket peer otherwise, and whenever the headers carry nothing usable

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{TrackingConfig, TrustedProxyMode};

/// Resolve the client address of a request according to the trust settings
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<IpAddr>,
    config: &TrackingConfig,
) -> Option<IpAddr> {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

/// Stored form of a resolved address; `unknown` when nothing could be resolved
pub fn ip_label(ip: Option<IpAddr>) -> String {
    ip.map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn extract_standard_ip(headers: &HeaderMap, config: &TrackingConfig) -> Option<IpAddr> {
    let forwarded = parse_forwarded(headers);
    if !forwarded.is_empty() {
        return pick_client(&forwarded, config);
    }

    let xff = parse_x_forwarded_for(headers);
    if !xff.is_empty() {
        return pick_client(&xff, config);
    }

    None
}

/// `for=` addresses of a `Forwarded` header, in hop order
fn parse_forwarded(headers: &HeaderMap) -> Vec<IpAddr> {
    let Some(forwarded) = headers.get("forwarded").and_then(|h| h.to_str().ok()) else {
        return Vec::new();
    };

    forwarded
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let param = param.trim();
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("for") {
                return None;
            }
            parse_node(value.trim().trim_matches('"'))
        })
        .collect()
}

/// Forwarded node: `1.2.3.4`, `1.2.3.4:80`, `[::1]` or `[::1]:80`
fn parse_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        let (addr, _) = rest.split_once(']')?;
        return addr.parse().ok();
    }
    if let Ok(ip) = node.parse::<IpAddr>() {
        return Some(ip);
    }
    let (addr, _port) = node.rsplit_once(':')?;
    addr.parse().ok()
}

fn parse_x_forwarded_for(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect()
}

/// Walk a hop chain right to left and return the first untrusted address.
/// With no trust settings that is the rightmost hop, the one appended by the
/// proxy directly in front of us.
fn pick_client(chain: &[IpAddr], config: &TrackingConfig) -> Option<IpAddr> {
    if let Some(num_trusted) = config.num_trusted_proxies {
        if chain.len() > num_trusted {
            return Some(chain[chain.len() - num_trusted - 1]);
        }
        return chain.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(mode: TrustedProxyMode) -> TrackingConfig {
        TrackingConfig {
            trusted_proxy_mode: mode,
            ..Default::default()
        }
    }

    fn socket() -> Option<IpAddr> {
        Some("192.168.1.1".parse().unwrap())
    }

    #[test]
    fn test_none_mode_uses_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let result = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::None));
        assert_eq!(result, socket());
    }

    #[test]
    fn test_cloudflare_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let result = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::Cloudflare));
        assert_eq!(result, Some("203.0.113.1".parse().unwrap()));
    }

    #[test]
    fn test_x_forwarded_for_rightmost_without_trust_list() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let result = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::Standard));
        assert_eq!(result, Some("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_cidrs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.7, 10.0.0.8"),
        );
        let config = TrackingConfig {
            trusted_proxies: vec!["10.0.0.0/8".parse().unwrap()],
            ..config(TrustedProxyMode::Standard)
        };
        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, Some("203.0.113.1".parse().unwrap()));
    }

    #[test]
    fn test_num_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1, 10.0.0.1"),
        );
        let config = TrackingConfig {
            num_trusted_proxies: Some(1),
            ..config(TrustedProxyMode::Standard)
        };
        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, Some("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_header_with_port_and_ipv6() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"[2001:db8::1]:4711\";proto=https"),
        );
        let result = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::Standard));
        assert_eq!(result, Some("2001:db8::1".parse().unwrap()));

        let mut headers = HeaderMap::new();
        headers.insert("forwarded", HeaderValue::from_static("for=192.0.2.60:8080"));
        let result = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::Standard));
        assert_eq!(result, Some("192.0.2.60".parse().unwrap()));
    }

    #[test]
    fn test_missing_everything_is_unknown() {
        let headers = HeaderMap::new();
        let result = extract_client_ip(&headers, None, &config(TrustedProxyMode::Standard));
        assert_eq!(ip_label(result), "unknown");
    }
}
