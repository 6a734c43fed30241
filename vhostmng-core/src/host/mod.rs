//! Virtual host model
//!
//! These types describe what the host builder discovers in the parsed
//! configuration and what discovery output exposes.

pub mod address;

pub use address::{normalize_host, Address};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One resolved `listen` statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listen {
    pub address: Address,
    /// TLS is implied by an `ssl` parameter, `ssl on`, or a TLS port
    pub ssl: bool,
    /// `ipv6only=on` was given
    pub ipv6only: bool,
}

/// A virtual host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    /// File the host block lives in
    pub file_path: PathBuf,
    /// First server name, empty when none is declared
    pub server_name: String,
    /// Remaining server names
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Document root, empty when none is declared
    #[serde(default)]
    pub doc_root: String,
    /// Addresses keyed by [`Address::hash_key`]
    #[serde(default)]
    pub addresses: BTreeMap<String, Address>,
    /// Any listen on this host is TLS
    #[serde(default)]
    pub ssl: bool,
    /// The host file is reachable from the root configuration
    #[serde(default)]
    pub enabled: bool,
}

impl Host {
    /// Insert an address, collapsing duplicates
    pub fn add_address(&mut self, address: Address) {
        self.addresses.insert(address.hash_key(), address);
    }

    /// Server name followed by all aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.server_name.as_str())
            .filter(|name| !name.is_empty())
            .chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether the host answers to `name`, case-insensitively
    pub fn matches_name(&self, name: &str) -> bool {
        self.names().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Sorted, comma separated addresses; `hosts_only` drops the ports
    pub fn addresses_string(&self, hosts_only: bool) -> String {
        let mut parts: Vec<String> = self
            .addresses
            .values()
            .map(|a| if hosts_only { a.normalized_host() } else { a.to_string() })
            .collect();
        parts.sort();
        parts.dedup();
        parts.join(",")
    }

    /// Any address is an IPv6 literal
    pub fn is_ipv6_enabled(&self) -> bool {
        self.addresses.values().any(|a| a.is_ipv6)
    }

    /// No address at all, or any non-IPv6 address
    pub fn is_ipv4_enabled(&self) -> bool {
        self.addresses.is_empty() || self.addresses.values().any(|a| !a.is_ipv6)
    }

    /// File name of the host's configuration without its extension
    pub fn config_name(&self) -> String {
        self.file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with(addresses: &[&str]) -> Host {
        let mut host = Host {
            file_path: PathBuf::from("/etc/nginx/sites-available/example.conf"),
            server_name: "example.com".to_string(),
            aliases: vec!["www.example.com".to_string()],
            ..Default::default()
        };
        for a in addresses {
            host.add_address(Address::parse(a));
        }
        host
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let host = host_with(&["80", "80", "[::]:80"]);
        assert_eq!(host.addresses.len(), 2);
        assert!(host.is_ipv6_enabled());
        assert!(host.is_ipv4_enabled());
    }

    #[test]
    fn test_ipv4_enabled_without_addresses() {
        let host = host_with(&[]);
        assert!(host.is_ipv4_enabled());
        assert!(!host.is_ipv6_enabled());
        assert!(!host_with(&["[::]:80"]).is_ipv4_enabled());
    }

    #[test]
    fn test_names() {
        let host = host_with(&["80"]);
        assert!(host.matches_name("WWW.example.com"));
        assert!(!host.matches_name("other.com"));
        assert_eq!(host.config_name(), "example");
    }

    #[test]
    fn test_addresses_string() {
        let host = host_with(&["10.0.0.1:80", "10.0.0.1:443"]);
        assert_eq!(host.addresses_string(false), "10.0.0.1:443,10.0.0.1:80");
        assert_eq!(host.addresses_string(true), "10.0.0.1");
    }
}
