//! Global listen statements
//!
//! Servers that declare ports outside host blocks (`Listen 443` in
//! `ports.conf`) need the port added there before a host can use it.

use crate::edit::DirectiveSpec;
use crate::locator::{child_blocks, Locator};
use crate::query::{find_directives, module_alias, Guard};
use crate::store::ConfigStore;
use vhostmng_core::{Address, Error, Result};

const DEFAULT_TLS_PORT: &str = "443";

/// Whether any listen statement binds `port`
pub fn is_port_listened(listens: &[String], port: &str) -> bool {
    listens.iter().any(|listen| {
        let text = listen.split_whitespace().next().unwrap_or_default();
        Address::parse(text).port == port
    })
}

/// Interface part of a listen statement, empty for a bare port
pub fn ip_from_listen(listen: &str) -> String {
    let text = listen.split_whitespace().next().unwrap_or_default();
    Address::parse(text).host
}

/// 🔌 Make sure `port` is listened on, adding listen statements to the
/// listen config file when it is not. Returns whether anything was added.
///
/// HTTPS listens go into the TLS module guard block, which is created when
/// missing. A non-default HTTPS port carries an `https` protocol marker.
pub fn ensure_port_listening(store: &mut ConfigStore, port: &str, https: bool) -> Result<bool> {
    let dialect = store.dialect().clone();
    if !dialect.global_listen {
        return Err(Error::Unsupported(
            "listen statements are part of host blocks in this dialect".to_string(),
        ));
    }

    let listens: Vec<String> = find_directives(store, &dialect.listen, None, true)
        .into_iter()
        .map(|m| m.values.join(" "))
        .collect();

    if is_port_listened(&listens, port) {
        tracing::debug!("Port {} is already listened", port);
        return Ok(false);
    }

    let mut service = vec![port.to_string()];
    if https && port != DEFAULT_TLS_PORT {
        service.push("https".to_string());
    }

    let path = store.settings().listen_config_path()?;
    if !store.contains(&path) {
        store.parse_recursively(&path.to_string_lossy());
    }
    if !store.contains(&path) {
        return Err(Error::NotFound(format!("listen config {}", path.display())));
    }
    let file = Locator::file(&path);

    if !https {
        store.add_directives(&file, &[DirectiveSpec::new(&dialect.listen, &[port])], false)?;
        tracing::info!("🔌 Listening on port {}", port);
        return Ok(true);
    }

    // One statement per interface, a single wildcard one when any listen
    // already covers all interfaces
    let mut statements: Vec<Vec<String>> = Vec::new();
    let wildcard = listens.is_empty() || listens.iter().any(|l| ip_from_listen(l).is_empty());
    if wildcard {
        statements.push(service.clone());
    } else {
        for listen in &listens {
            let mut statement = vec![Address::parse(&ip_from_listen(listen)).with_port(port).to_string()];
            statement.extend(service.iter().skip(1).cloned());
            if !statements.contains(&statement) {
                statements.push(statement);
            }
        }
    }

    let target = match &dialect.tls_module {
        Some(module) => tls_guard(store, &file, module)?,
        None => file,
    };
    let specs: Vec<DirectiveSpec> = statements
        .iter()
        .map(|values| {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            DirectiveSpec::new(&dialect.listen, &values)
        })
        .collect();
    store.add_directives(&target, &specs, false)?;

    tracing::info!("🔌 Listening on port {} for HTTPS", port);
    Ok(true)
}

/// Locator of the TLS module guard at the top of `file`, created if missing
fn tls_guard(store: &mut ConfigStore, file: &Locator, module: &str) -> Result<Locator> {
    let existing = {
        let dialect = store.dialect();
        let entries = store
            .entries(file)
            .ok_or_else(|| Error::NotFound(format!("{} is not parsed", file)))?;
        child_blocks(entries).into_iter().find_map(|(segment, block)| {
            let guard = Guard::from_block(block, dialect)?;
            let matches = !guard.negated
                && (guard.name == module || module_alias(&guard.name).as_deref() == Some(module));
            matches.then(|| file.child(segment))
        })
    };

    match existing {
        Some(locator) => Ok(locator),
        None => {
            let name = store.dialect().module_guard.clone();
            store.add_block(file, &name, &[module])
        }
    }
}
