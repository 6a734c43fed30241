//! Virtual host discovery
//!
//! Walks every parsed file for server blocks and derives a [`Host`] from
//! each: names, document root, listen addresses and TLS state.

use crate::locator::Locator;
use crate::parser::BlockDirective;
use crate::store::ConfigStore;
use std::fs;
use std::path::{Path, PathBuf};
use vhostmng_core::{Address, Dialect, Host, Listen};

/// A discovered host together with where its block lives
#[derive(Debug, Clone)]
pub struct VirtualHost {
    pub host: Host,
    pub listens: Vec<Listen>,
    pub locator: Locator,
}

impl VirtualHost {
    /// Whether any listen already carries `ipv6only=on`
    pub fn has_ipv6only(&self) -> bool {
        self.listens.iter().any(|l| l.ipv6only)
    }
}

/// All hosts of the store, sorted by file path, one per real file position
pub fn get_hosts(store: &ConfigStore) -> Vec<VirtualHost> {
    let mut hosts = Vec::new();
    for path in store.paths() {
        for locator in store.server_blocks(path) {
            if let Some(host) = host_at(store, &locator) {
                hosts.push(host);
            }
        }
    }
    dedup_by_real_path(hosts)
}

/// Build the host for the server block at `locator`
pub fn host_at(store: &ConfigStore, locator: &Locator) -> Option<VirtualHost> {
    let block = store.block(locator)?;
    let enabled = store.is_included(&locator.file);
    Some(build_host(store.dialect(), locator, block, enabled))
}

fn build_host(dialect: &Dialect, locator: &Locator, block: &BlockDirective, enabled: bool) -> VirtualHost {
    let mut host = Host {
        file_path: locator.file.clone(),
        enabled,
        ..Default::default()
    };

    if let Some(names) = block.directives_named(&dialect.server_name).next() {
        let mut values = names.value_texts().into_iter();
        host.server_name = values.next().unwrap_or_default();
        host.aliases.extend(values);
    }
    if let Some(alias) = &dialect.server_alias {
        for directive in block.directives_named(alias) {
            host.aliases.extend(directive.value_texts());
        }
    }

    if let Some(root) = block
        .directives_named(&dialect.document_root)
        .next()
        .and_then(|d| d.first_value())
    {
        host.doc_root = root;
    }

    let ssl_on = block
        .directives_named(&dialect.ssl_toggle)
        .any(|d| d.first_value().is_some_and(|v| v.eq_ignore_ascii_case("on")));

    let mut listens: Vec<Listen> = block
        .directives_named(&dialect.listen)
        .filter_map(|d| parse_listen(&d.value_texts(), ssl_on, dialect))
        .collect();

    if dialect.addresses_in_params {
        for param in block.param_texts() {
            let address = Address::parse(&param);
            let ssl = ssl_on || dialect.is_tls_port(&address.port);
            listens.push(Listen {
                address,
                ssl,
                ipv6only: false,
            });
        }
    }

    host.ssl = listens.iter().any(|l| l.ssl);
    for listen in &listens {
        host.add_address(listen.address.clone());
    }

    VirtualHost {
        host,
        listens,
        locator: locator.clone(),
    }
}

/// Resolve one listen statement's values
pub fn parse_listen(values: &[String], ssl_on: bool, dialect: &Dialect) -> Option<Listen> {
    let (first, params) = values.split_first()?;
    let address = Address::parse(first);
    let ssl = ssl_on
        || params.iter().any(|p| p.eq_ignore_ascii_case("ssl"))
        || dialect.is_tls_port(&address.port);
    let ipv6only = params.iter().any(|p| p.eq_ignore_ascii_case("ipv6only=on"));

    Some(Listen {
        address,
        ssl,
        ipv6only,
    })
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Keep one host per (real file, in-file position), preferring the entry
/// reached through the real path over one reached through a symlink
fn dedup_by_real_path(hosts: Vec<VirtualHost>) -> Vec<VirtualHost> {
    let mut kept: Vec<((PathBuf, String), VirtualHost)> = Vec::new();

    for vhost in hosts {
        let file = &vhost.host.file_path;
        let real = fs::canonicalize(file).unwrap_or_else(|_| file.clone());
        let key = (real, vhost.locator.normalized_path());

        match kept.iter_mut().find(|(k, _)| *k == key) {
            None => kept.push((key, vhost)),
            Some((_, existing)) => {
                let enabled = existing.host.enabled || vhost.host.enabled;
                if is_symlink(&existing.host.file_path) && !is_symlink(&vhost.host.file_path) {
                    tracing::debug!(
                        "Preferring {:?} over symlink {:?}",
                        vhost.host.file_path,
                        existing.host.file_path
                    );
                    *existing = vhost;
                }
                existing.host.enabled = enabled;
            }
        }
    }

    kept.into_iter().map(|(_, vhost)| vhost).collect()
}

/// Hosts answering to `name`: TLS hosts first, then plaintext hosts that
/// have no TLS counterpart on the same addresses
pub fn get_hosts_by_server_name(store: &ConfigStore, name: &str) -> Vec<VirtualHost> {
    let (tls, plain): (Vec<VirtualHost>, Vec<VirtualHost>) = get_hosts(store)
        .into_iter()
        .filter(|vhost| vhost.host.matches_name(name))
        .partition(|vhost| vhost.host.ssl);

    let mut selected = tls;
    for vhost in plain {
        let addresses = vhost.host.addresses_string(true);
        let covered = selected
            .iter()
            .any(|t| t.host.ssl && t.host.addresses_string(true) == addresses);
        if !covered {
            selected.push(vhost);
        }
    }
    selected
}
