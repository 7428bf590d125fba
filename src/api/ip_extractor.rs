//! Client IP extraction from HTTP headers with trust validation
//!
//! - Cloudflare mode reads `CF-Connecting-IP`
//! - Standard mode walks `Forwarded` / `X-Forwarded-For` right to left,
//!   skipping hops that belong to trusted proxies
//! - Without a trusted mode only the socket address is used

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{NetworkConfig, TrustedProxyMode};

/// Extract the client IP address according to the trust configuration,
/// falling back to the socket address when headers are absent or untrusted.
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &NetworkConfig) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            // Forwarding headers only count when the peer is itself a proxy we trust
            if !config.trusted_proxies.is_empty() && !is_trusted(socket_addr, config) {
                return socket_addr;
            }
            extract_standard_ip(headers, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn extract_standard_ip(headers: &HeaderMap, config: &NetworkConfig) -> Option<IpAddr> {
    let chain = forwarded_chain(headers).or_else(|| x_forwarded_for_chain(headers))?;
    select_from_chain(&chain, config)
}

fn is_trusted(ip: IpAddr, config: &NetworkConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(&ip))
}

/// Pick the client out of a proxy chain (leftmost = original client).
fn select_from_chain(chain: &[IpAddr], config: &NetworkConfig) -> Option<IpAddr> {
    if chain.is_empty() {
        return None;
    }

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
            .find(|ip| !is_trusted(**ip, config))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

/// `for=` values of an RFC 7239 Forwarded header, in order
fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let param = param.trim();
            let (key, value) = param.split_once('=')?;
            key.eq_ignore_ascii_case("for").then(|| parse_forwarded_node(value))?
        })
        .collect();

    (!chain.is_empty()).then_some(chain)
}

/// Forwarded node: `192.0.2.60`, `"192.0.2.60:4711"` or `"[2001:db8::1]:4711"`
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }

    value
        .parse()
        .ok()
        .or_else(|| value.rsplit_once(':').and_then(|(host, _)| host.parse().ok()))
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    (!chain.is_empty()).then_some(chain)
}
