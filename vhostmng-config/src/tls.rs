//! TLS host creation
//!
//! 🔒 Two ways to give a plaintext host a TLS counterpart:
//!
//! - [`make_tls_clone`] copies the host block into a sibling file, moves
//!   its addresses to the TLS port and comments out rewrite rules that
//!   would redirect to `https://` (they would loop on the TLS host).
//! - [`make_tls_in_place`] adds TLS listens to the existing block.

use crate::dumper::dump_entry;
use crate::edit::DirectiveSpec;
use crate::hosts::{get_hosts, host_at, VirtualHost};
use crate::locator::{new_locators, Locator};
use crate::parser::{Config, Entry, EntryKind};
use crate::store::{read_config, ConfigStore};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use vhostmng_core::{Address, Dialect, Error, Result, Reverter, Settings};

/// Result of [`make_tls_clone`]
#[derive(Debug, Clone)]
pub struct TlsClone {
    pub vhost: VirtualHost,
    /// At least one rewrite rule was commented out
    pub suppressed_rewrites: bool,
}

/// Path of the TLS sibling of a host file
pub fn tls_host_path(settings: &Settings, source: &Path) -> PathBuf {
    let base = match (&settings.host_root, source.file_name()) {
        (Some(root), Some(name)) => settings.resolve(root).join(name),
        _ => fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf()),
    };

    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match name.strip_suffix(".conf") {
        Some(stem) => format!("{}{}", stem, settings.ssl_host_suffix),
        None => format!("{}{}", name, settings.ssl_host_suffix),
    };
    base.with_file_name(name)
}

/// 🔒 Clone a plaintext host into its TLS sibling file.
///
/// The target file is registered with the reverter (backup when it
/// exists, deletion when it is new), written and parsed again, so the
/// clone can be located in the fresh tree.
pub fn make_tls_clone(store: &mut ConfigStore, reverter: &mut Reverter, vhost: &VirtualHost) -> Result<TlsClone> {
    let dialect = store.dialect().clone();
    let target = tls_host_path(store.settings(), &vhost.host.file_path);

    let source = store
        .block(&vhost.locator)
        .ok_or_else(|| Error::NotFound(format!("host block {}", vhost.locator)))?;
    let mut block = source.clone();

    let suppressed_rewrites = suppress_https_rewrites(&mut block.entries, &dialect);
    if suppressed_rewrites {
        tracing::warn!(
            "⚠️ Commented out https rewrite rules in the TLS copy of {}",
            vhost.locator
        );
    }

    if target.exists() {
        reverter.backup_file(&target)?;
    } else {
        reverter.add_file_to_deletion(&target)?;
    }

    if !store.contains(&target) {
        let config = if target.exists() {
            read_config(&target)?
        } else {
            Config::new(&target)
        };
        store.insert(config);
    }
    let before = store.server_blocks(&target);

    let mut entry = Entry {
        leading: String::new(),
        kind: EntryKind::Block(block),
        trailing: String::new(),
        position: None,
    };
    if let Some(module) = &dialect.tls_module {
        entry.leading = "\n".to_string();
        let mut guard = Entry::block(&dialect.module_guard, &[module.clone()], vec![entry]);
        if let Some(block) = guard.as_block_mut() {
            block.before_close = "\n".to_string();
        }
        entry = guard;
    }

    let config = store
        .get_mut(&target)
        .ok_or_else(|| Error::Internal(format!("{} missing from store", target.display())))?;
    if !config.entries.is_empty() {
        entry.leading.insert_str(0, "\n\n");
    }
    if !config.trailing.ends_with('\n') {
        config.trailing.push('\n');
    }
    config.entries.push(entry);

    store.dump_file(&target)?;
    store.reparse(&target)?;

    let locator = reconcile(store, &target, &before)?;
    retarget_addresses(store, &locator, &dialect)?;
    store.mark_changed(&target);

    let vhost = host_at(store, &locator)
        .ok_or_else(|| Error::NotFound(format!("cloned host {}", locator)))?;
    tracing::info!("🔒 Created TLS host {} from {:?}", locator, vhost.host.server_name);

    Ok(TlsClone {
        vhost,
        suppressed_rewrites,
    })
}

/// Find the one server block of `target` that was not there before,
/// reparsing once more when none shows up
fn reconcile(store: &mut ConfigStore, target: &Path, before: &[Locator]) -> Result<Locator> {
    let mut added = new_locators(before, &store.server_blocks(target));

    if added.is_empty() {
        tracing::debug!("No new host block in {:?}, reparsing", target);
        store.reparse(target)?;
        added = new_locators(before, &store.server_blocks(target));
    }

    match added.len() {
        1 => Ok(added.remove(0)),
        candidates => Err(Error::AmbiguousClone {
            path: target.to_path_buf(),
            candidates,
        }),
    }
}

/// Move every address of the block to the TLS port and mark listens `ssl`
fn retarget_addresses(store: &mut ConfigStore, locator: &Locator, dialect: &Dialect) -> Result<()> {
    let port = store.settings().https_port.clone();
    let block = store
        .block_mut(locator)
        .ok_or_else(|| Error::NotFound(format!("host block {}", locator)))?;

    if dialect.addresses_in_params {
        let mut seen = BTreeSet::new();
        let params: Vec<String> = block
            .param_texts()
            .iter()
            .map(|p| Address::parse(p).with_port(&port))
            .filter(|a| seen.insert(a.hash_key()))
            .map(|a| a.to_string())
            .collect();
        block.params.truncate(params.len());
        for (value, text) in block.params.iter_mut().zip(&params) {
            value.raw = text.clone();
        }
    }

    let mut seen = BTreeSet::new();
    let mut has_listen = false;
    block.entries.retain_mut(|entry| {
        if !entry.is_named(&dialect.listen) {
            return true;
        }
        let Some(directive) = entry.as_directive_mut() else {
            return true;
        };
        let values = directive.value_texts();
        let Some((first, params)) = values.split_first() else {
            return true;
        };

        let address = Address::parse(first).with_port(&port);
        if !seen.insert(address.hash_key()) {
            return false;
        }

        let mut rewritten = vec![address.to_string()];
        rewritten.extend(params.iter().cloned());
        if !params.iter().any(|p| p.eq_ignore_ascii_case(&dialect.ssl_toggle)) {
            rewritten.push(dialect.ssl_toggle.clone());
        }
        directive.set_values(&rewritten);
        has_listen = true;
        true
    });

    if dialect.addresses_in_params {
        return store.update_or_add_directives(
            locator,
            &[DirectiveSpec::new(&dialect.ssl_toggle, &["on"])],
            false,
        );
    }
    if !has_listen {
        return store.add_directives(
            locator,
            &[DirectiveSpec::new(&dialect.listen, &[&port, &dialect.ssl_toggle])],
            true,
        );
    }
    Ok(())
}

/// Comment out rewrite rules and redirects targeting `https://`, each rule
/// together with the conditions leading up to it. Returns whether anything
/// was commented.
pub fn suppress_https_rewrites(entries: &mut [Entry], dialect: &Dialect) -> bool {
    let mut suppressed = false;
    let mut i = 0;

    while i < entries.len() {
        if let Some(block) = entries[i].as_block_mut() {
            suppressed |= suppress_https_rewrites(&mut block.entries, dialect);
            i += 1;
            continue;
        }

        let name = entries[i].name().unwrap_or_default().to_string();
        if dialect.is_redirect(&name) {
            if is_https_redirect(&entries[i]) {
                comment_out(&mut entries[i]);
                suppressed = true;
            }
            i += 1;
        } else if dialect.is_rewrite_rule(&name) {
            if is_https_rule(&entries[i]) {
                comment_out(&mut entries[i]);
                suppressed = true;
            }
            i += 1;
        } else if dialect.is_rewrite_condition(&name) {
            let rule = (i + 1..entries.len()).find(|&j| entries[j].name().is_some_and(|n| dialect.is_rewrite_rule(n)));
            match rule {
                Some(j) if is_https_rule(&entries[j]) => {
                    for entry in &mut entries[i..=j] {
                        comment_out(entry);
                    }
                    suppressed = true;
                    i = j + 1;
                }
                Some(j) => i = j + 1,
                None => i += 1,
            }
        } else {
            i += 1;
        }
    }

    suppressed
}

/// Whether a rewrite rule redirects to `https://`
fn is_https_rule(entry: &Entry) -> bool {
    entry.as_directive().is_some() && entry.values().get(1).is_some_and(|target| is_https(&target.text()))
}

/// Whether a redirect (`return 301 URL`, `return URL`) targets `https://`
fn is_https_redirect(entry: &Entry) -> bool {
    entry.as_directive().is_some() && entry.values().last().is_some_and(|target| is_https(&target.text()))
}

fn is_https(target: &str) -> bool {
    target.to_ascii_lowercase().starts_with("https://")
}

/// Turn an entry into a comment, one `# ` per line, keeping its position
fn comment_out(entry: &mut Entry) {
    let split = entry.leading.rfind('\n').map_or(0, |i| i + 1);
    let indent = entry.leading.split_off(split);
    let leading = std::mem::replace(&mut entry.leading, indent);
    let trailing = std::mem::take(&mut entry.trailing);

    let commented = dump_entry(entry)
        .lines()
        .map(|line| format!("# {}", line))
        .collect::<Vec<_>>()
        .join("\n");

    entry.leading = leading;
    entry.trailing = trailing;
    entry.kind = EntryKind::Comment(commented);
}

/// 🔒 Enable TLS on the host block itself
pub fn make_tls_in_place(store: &mut ConfigStore, vhost: &VirtualHost) -> Result<VirtualHost> {
    let settings = store.settings();
    let listen = settings.dialect.listen.clone();
    let ssl = settings.dialect.ssl_toggle.clone();
    let http_port = settings.http_port.clone();
    let https_port = settings.https_port.clone();
    let host = &vhost.host;

    if host.addresses.is_empty() {
        store.add_directives(&vhost.locator, &[DirectiveSpec::new(&listen, &[&http_port])], true)?;
    }

    let mut specs = Vec::new();
    if host.is_ipv6_enabled() {
        let address = format!("[::]:{}", https_port);
        let ipv6only_taken = get_hosts(store).iter().any(|other| {
            other
                .listens
                .iter()
                .any(|l| l.ipv6only && l.address.port == https_port)
        });
        let mut values = vec![address.as_str(), ssl.as_str()];
        if !ipv6only_taken {
            values.push("ipv6only=on");
        }
        specs.push(DirectiveSpec::new(&listen, &values));
    }
    if host.is_ipv4_enabled() {
        specs.push(DirectiveSpec::new(&listen, &[&https_port, &ssl]));
    }
    store.add_directives(&vhost.locator, &specs, false)?;

    tracing::info!("🔒 Enabled TLS in place for {}", vhost.locator);
    host_at(store, &vhost.locator).ok_or_else(|| Error::NotFound(format!("host block {}", vhost.locator)))
}
