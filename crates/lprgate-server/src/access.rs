//! Frontend IP allow-list
//!
//! Guards the records API and the capture images. Entries are single
//! addresses or CIDR ranges; an empty list allows everyone.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IpRule {
    network: IpAddr,
    prefix: u8,
}

impl IpRule {
    fn parse(raw: &str) -> Option<Self> {
        let (addr, prefix) = match raw.split_once('/') {
            Some((addr, prefix)) => (addr.trim(), Some(prefix.trim())),
            None => (raw.trim(), None),
        };
        let network: IpAddr = addr.parse().ok()?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max)?,
            None => max,
        };
        Some(Self { network, prefix })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

/// Parsed `FRONTEND_ALLOWED_IPS`
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    rules: Vec<IpRule>,
}

impl AllowList {
    /// Parse entries, returning the list and the entries that were invalid
    pub fn parse<S: AsRef<str>>(items: &[S]) -> (Self, Vec<String>) {
        let mut rules = Vec::new();
        let mut rejected = Vec::new();
        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() {
                continue;
            }
            match IpRule::parse(item) {
                Some(rule) => rules.push(rule),
                None => rejected.push(item.to_string()),
            }
        }
        (Self { rules }, rejected)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether a client address (as extracted by [`client_ip`]) may pass
    pub fn allows(&self, client: Option<&str>) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let Some(ip) = client.and_then(|c| c.parse::<IpAddr>().ok()) else {
            return false;
        };
        self.rules.iter().any(|rule| rule.contains(ip))
    }
}

/// Client address: first `X-Forwarded-For` entry, else the socket peer,
/// with any `::ffff:` prefix stripped
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let ip = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))?;
    Some(ip.strip_prefix("::ffff:").map(str::to_string).unwrap_or(ip))
}

/// Middleware rejecting clients outside the allow-list with 403
pub async fn require_allowed_ip(
    State(allow_list): State<Arc<AllowList>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_ip(req.headers(), peer);

    if allow_list.allows(client.as_deref()) {
        next.run(req).await
    } else {
        tracing::warn!(
            "Frontend access denied for {}",
            client.as_deref().unwrap_or("unknown client")
        );
        (StatusCode::FORBIDDEN, "Acesso negado.").into_response()
    }
}
