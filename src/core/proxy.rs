//! Client address and scheme resolution behind reverse proxies.
//!
//! The trusted hop count decides how far into `X-Forwarded-For` the server
//! looks. With one trusted hop (the default) the socket peer is taken to be
//! the proxy and the right-most forwarded address is the client.

use crate::config::TrustProxy;
use crate::domain::model::{ClientInfo, Protocol};
use crate::utils::error::AppError;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use std::net::{IpAddr, SocketAddr};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

pub fn resolve_client(trust: TrustProxy, peer: Option<SocketAddr>, headers: &HeaderMap) -> ClientInfo {
    let Some(peer) = peer else {
        return ClientInfo {
            ip: None,
            protocol: Protocol::Http,
            host: header_value(headers, &HOST),
            forwarded_chain: Vec::new(),
        };
    };

    let mut chain = vec![peer.ip()];
    chain.extend(forwarded_addresses(headers));

    let hops = trust.hops();
    let ip = chain[hops.min(chain.len() - 1)];
    let peer_trusted = hops >= 1;

    let protocol = match peer_trusted
        .then(|| first_value(headers, &X_FORWARDED_PROTO))
        .flatten()
    {
        Some(proto) if proto.eq_ignore_ascii_case("https") => Protocol::Https,
        _ => Protocol::Http,
    };

    let host = peer_trusted
        .then(|| first_value(headers, &X_FORWARDED_HOST))
        .flatten()
        .or_else(|| header_value(headers, &HOST));

    ClientInfo {
        ip: Some(ip),
        protocol,
        host,
        forwarded_chain: chain,
    }
}

/// `X-Forwarded-For` entries from right (nearest proxy) to left, stopping at
/// the first entry that is not an address.
fn forwarded_addresses(headers: &HeaderMap) -> Vec<IpAddr> {
    let joined = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");

    if joined.trim().is_empty() {
        return Vec::new();
    }

    joined
        .split(',')
        .rev()
        .map(str::trim)
        .map_while(parse_forwarded_address)
        .collect()
}

fn parse_forwarded_address(entry: &str) -> Option<IpAddr> {
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    entry
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|inner| inner.parse::<IpAddr>().ok())
}

fn first_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves the client once per request and stores it as an extension.
pub async fn client_info_middleware(
    State(trust): State<TrustProxy>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let client = resolve_client(trust, peer, request.headers());
    tracing::trace!(
        "Resolved client {:?} via {} ({:?})",
        client.ip,
        client.protocol.as_str(),
        client.forwarded_chain
    );

    request.extensions_mut().insert(client);
    next.run(request).await
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClientInfo>()
            .cloned()
            .ok_or_else(|| AppError::InternalError {
                message: "ClientInfo requested but client_info_middleware is not installed"
                    .to_string(),
            })
    }
}
