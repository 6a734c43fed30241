//! Listen addresses
//!
//! An address is what a `listen` statement (or a `VirtualHost` parameter)
//! binds to: an optional host part and an optional port. Both parts may be
//! empty or `*`, which means "any".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv6Addr;

/// A host/port pair as written in the configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    /// Host part, IPv6 hosts keep their brackets
    pub host: String,
    /// Port part, empty when absent
    pub port: String,
    /// Whether the host part is an IPv6 literal
    pub is_ipv6: bool,
}

impl Address {
    /// Create an address from separate host and port parts
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        let host = host.into();
        let is_ipv6 = host.starts_with('[') || host.parse::<Ipv6Addr>().is_ok();
        Self {
            host,
            port: port.into(),
            is_ipv6,
        }
    }

    /// Parse `host:port`, `[v6]:port`, `host`, or a bare port
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if let Some(rest) = text.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').unwrap_or("");
                return Self {
                    host: format!("[{}]", host),
                    port: port.to_string(),
                    is_ipv6: true,
                };
            }
        }

        // Unbracketed IPv6 literals cannot carry a port
        if text.matches(':').count() > 1 {
            return Self {
                host: text.to_string(),
                port: String::new(),
                is_ipv6: true,
            };
        }

        match text.split_once(':') {
            Some((host, port)) => Self::new(host, port),
            None if is_port(text) => Self::new("", text),
            None => Self::new(text, ""),
        }
    }

    /// Host part with IPv6 literals expanded, used for comparisons
    pub fn normalized_host(&self) -> String {
        normalize_host(&self.host)
    }

    /// Whether the host part matches any interface
    pub fn is_wildcard(&self) -> bool {
        self.host.is_empty() || self.host == "*"
    }

    /// Whether the port part matches any port
    pub fn is_wildcard_port(&self) -> bool {
        self.port.is_empty() || self.port == "*"
    }

    /// Stable key derived from normalized host and port
    pub fn hash_key(&self) -> String {
        format!("{}:{}", self.normalized_host(), self.port)
    }

    /// Copy of this address bound to another port
    pub fn with_port(&self, port: &str) -> Self {
        Self {
            host: self.host.clone(),
            port: port.to_string(),
            is_ipv6: self.is_ipv6,
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.normalized_host() == other.normalized_host()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_key().hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.host.is_empty(), self.port.is_empty()) {
            (true, _) => write!(f, "{}", self.port),
            (false, true) => write!(f, "{}", self.host),
            (false, false) => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Expand an IPv6 literal (with or without brackets) to its 8-group form.
/// Other hosts are only lowercased.
pub fn normalize_host(host: &str) -> String {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    match bare.parse::<Ipv6Addr>() {
        Ok(ip) => ip
            .segments()
            .iter()
            .map(|segment| format!("{:x}", segment))
            .collect::<Vec<_>>()
            .join(":"),
        Err(_) => host.to_ascii_lowercase(),
    }
}

fn is_port(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
