//! Client identity resolution.
//!
//! The identity is the client IP used as the rate-limiting key and in logs.
//! It is resolved once, by the outermost pipeline stage, and stored in the
//! request extensions as [`ClientIdentity`].
//!
//! # Resolution Order
//!
//! 1. If trusted proxies are configured and the peer address is known but
//!    outside every trusted range, the peer address is used and forwarding
//!    headers are ignored.
//! 2. `X-Forwarded-For` (first non-empty entry)
//! 3. `X-Real-IP`
//! 4. The peer address from `ConnectInfo`
//! 5. [`UNKNOWN_IP`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Without `TRUSTED_PROXIES`, forwarding headers are trusted from any peer.
//! A client that reaches the service directly can then pick its own
//! identity, rotate it to dodge rate limits, or exhaust another client's
//! quota. Deploy behind a reverse proxy that overwrites these headers:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! ## The "unknown" Fallback
//!
//! Requests with no headers and no peer address (only possible when the
//! server is not run with connect info) share the `"unknown"` key and are
//! rate-limited collectively.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::Request;
use tracing::{debug, warn};

/// Fallback identity when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Resolved client identity, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity already attached to the request, or a fresh resolution.
    pub fn of<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> Self {
        req.extensions()
            .get::<ClientIdentity>()
            .cloned()
            .unwrap_or_else(|| Self(resolve_client_ip(req, trusted_proxies).into_owned()))
    }
}

/// Handler extractor; falls back to [`UNKNOWN_IP`] outside the pipeline.
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientIdentity>()
            .cloned()
            .unwrap_or_else(|| ClientIdentity(UNKNOWN_IP.to_string())))
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is treated as a single-host range.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok()?,
            None => max_prefix,
        };
        if prefix_len > max_prefix {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Trusted proxy ranges.
///
/// Empty means forwarding headers are accepted from any peer.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether `ip` may set forwarding headers. Always true when no ranges
    /// are configured.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Extraction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp<'a> {
    FromXff(&'a str),
    FromRealIp(&'a str),
    NotFound,
}

/// Read the client IP from forwarding headers without allocating.
#[inline]
fn extract_ip_from_headers<B>(req: &Request<B>) -> ExtractedIp<'_> {
    // Format: "client, proxy1, proxy2"; the first entry is the client
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').map(str::trim).find(|ip| !ip.is_empty())
    {
        return ExtractedIp::FromXff(first_ip);
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return ExtractedIp::FromRealIp(value.trim());
    }

    ExtractedIp::NotFound
}

fn peer_addr<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Resolve the client IP for a request.
///
/// Borrowed for the "unknown" fallback, owned otherwise.
pub fn resolve_client_ip<B>(
    req: &Request<B>,
    trusted_proxies: &TrustedProxyConfig,
) -> Cow<'static, str> {
    let peer = peer_addr(req);

    if let Some(peer) = peer
        && !trusted_proxies.is_trusted(&peer)
    {
        if !matches!(extract_ip_from_headers(req), ExtractedIp::NotFound) {
            debug!(peer = %peer, "Ignoring forwarding headers from untrusted peer");
        }
        return Cow::Owned(peer.to_string());
    }

    match extract_ip_from_headers(req) {
        ExtractedIp::FromXff(ip) | ExtractedIp::FromRealIp(ip) => Cow::Owned(ip.to_string()),
        ExtractedIp::NotFound => match peer {
            Some(peer) => Cow::Owned(peer.to_string()),
            None => Cow::Borrowed(UNKNOWN_IP),
        },
    }
}
