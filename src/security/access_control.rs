//! Per-location network access control.
//!
//! A location without `deny` admits everyone. With `deny = "all"` only
//! callers listed in `allow` get through. The caller is identified by the
//! peer address, or by a configured header when the proxy sits behind
//! another proxy.

use axum::http::{HeaderMap, HeaderName};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessPolicyError {
    #[error("invalid CIDR range in allow list: {0}")]
    InvalidCidr(String),

    #[error("invalid IP address in allow list: {0}")]
    InvalidAddress(String),

    #[error("unsupported deny value '{0}', only 'all' is allowed")]
    InvalidDeny(String),

    #[error("invalid source IP header name: {0}")]
    InvalidHeader(String),
}

/// One entry of an allow list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowEntry {
    /// Compared as an exact string against the caller address.
    Exact(String),
    Cidr(IpNet),
}

impl AllowEntry {
    pub fn parse(raw: &str) -> Result<Self, AccessPolicyError> {
        let raw = raw.trim();
        if raw.contains('/') {
            raw.parse::<IpNet>()
                .map(AllowEntry::Cidr)
                .map_err(|_| AccessPolicyError::InvalidCidr(raw.to_string()))
        } else {
            raw.parse::<IpAddr>()
                .map(|_| AllowEntry::Exact(raw.to_string()))
                .map_err(|_| AccessPolicyError::InvalidAddress(raw.to_string()))
        }
    }

    fn admits(&self, caller: &str, caller_ip: Option<IpAddr>) -> bool {
        match self {
            AllowEntry::Exact(addr) => addr == caller,
            AllowEntry::Cidr(net) => caller_ip.map(|ip| net.contains(&ip)).unwrap_or(false),
        }
    }
}

/// Allow/deny rules attached to a location.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allow: Vec<AllowEntry>,
    deny_all: bool,
    src_ip_header: Option<HeaderName>,
}

impl AccessPolicy {
    /// Build a policy from raw location settings.
    pub fn from_config(
        allow: &[String],
        deny: Option<&str>,
        src_ip_header: Option<&str>,
    ) -> Result<Self, AccessPolicyError> {
        let deny_all = match deny.map(str::trim) {
            None | Some("") => false,
            Some(value) if value.eq_ignore_ascii_case("all") => true,
            Some(value) => return Err(AccessPolicyError::InvalidDeny(value.to_string())),
        };

        let allow = allow
            .iter()
            .map(|entry| AllowEntry::parse(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let src_ip_header = match src_ip_header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(name) => Some(
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| AccessPolicyError::InvalidHeader(name.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            allow,
            deny_all,
            src_ip_header,
        })
    }

    /// Decide whether the caller may use the location.
    pub fn is_allowed(&self, remote_addr: SocketAddr, headers: &HeaderMap) -> bool {
        if !self.deny_all {
            return true;
        }
        if self.allow.is_empty() {
            return false;
        }

        let caller = match &self.src_ip_header {
            Some(name) => {
                let value = headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .unwrap_or_default();
                if value.is_empty() {
                    // A missing header must not fall back to the peer address.
                    tracing::warn!(header = %name, "Source IP header is empty, denying");
                    return false;
                }
                strip_port(value)
            }
            None => remote_addr.ip().to_canonical().to_string(),
        };

        let caller_ip = caller.parse::<IpAddr>().ok().map(|ip| ip.to_canonical());
        self.allow.iter().any(|entry| entry.admits(&caller, caller_ip))
    }
}

/// Remove a `:port` suffix from an address, handling bracketed IPv6.
fn strip_port(addr: &str) -> String {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }
    if addr.parse::<IpAddr>().is_ok() {
        return addr.to_string();
    }
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest).to_string();
    }
    addr.split(':').next().unwrap_or(addr).to_string()
}
