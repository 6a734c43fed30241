//! Deploy Manager
//!
//! 🚀 Coordinates host discovery, TLS enabling, certificate directives, host
//! enabling and the server, all inside one reverter transaction.

use crate::control::{BinaryControl, ServerControl};
use crate::site::SymlinkSites;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vhostmng_config::locator::child_blocks;
use vhostmng_config::{
    ensure_port_listening, get_hosts, get_hosts_by_server_name, host_at, make_tls_clone, make_tls_in_place,
    ConfigStore, DirectiveSpec, Locator, VirtualHost,
};
use vhostmng_core::{Dialect, Error, Host, HostSwitch, Result, Reverter, Settings, TlsStrategy};

/// Certificate files to deploy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificatePaths {
    /// Leaf certificate only
    pub certificate: Option<String>,
    /// Private key
    pub key: Option<String>,
    /// Intermediate chain only
    pub chain: Option<String>,
    /// Leaf certificate followed by the chain
    pub fullchain: Option<String>,
}

impl CertificatePaths {
    /// Paths for a full chain and its key
    pub fn fullchain(fullchain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            fullchain: Some(fullchain.into()),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Certificate directive value and, when the dialect has a separate
    /// chain directive and no full chain was given, the chain value
    pub fn certificate_files(&self, dialect: &Dialect) -> Result<(&str, Option<&str>)> {
        match (&self.fullchain, &self.certificate, &self.chain, &dialect.certificate_chain) {
            (Some(fullchain), ..) => Ok((fullchain, None)),
            (None, Some(certificate), Some(chain), Some(_)) => Ok((certificate, Some(chain))),
            _ => Err(Error::Config("a fullchain certificate path is required".to_string())),
        }
    }

    fn key(&self) -> Result<&str> {
        self.key
            .as_deref()
            .ok_or_else(|| Error::Config("a certificate key path is required".to_string()))
    }
}

/// 🚀 Deploys certificates to the hosts of one server
pub struct Manager {
    store: ConfigStore,
    reverter: Reverter,
    control: Box<dyn ServerControl>,
    switch: Arc<dyn HostSwitch>,
}

impl Manager {
    pub fn new(store: ConfigStore, control: Box<dyn ServerControl>, switch: Arc<dyn HostSwitch>) -> Self {
        Self {
            store,
            reverter: Reverter::new(switch.clone()),
            control,
            switch,
        }
    }

    /// Parse the server configuration and control the server through its
    /// binary, enabling hosts with symlinks
    pub fn open(settings: Settings) -> Result<Self> {
        let control = Box::new(BinaryControl::new(settings.control_bin.clone()));
        let switch: Arc<dyn HostSwitch> = Arc::new(SymlinkSites::new(settings.enabled_hosts_path()));
        let store = ConfigStore::open(settings)?;
        Ok(Self::new(store, control, switch))
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn reverter(&self) -> &Reverter {
        &self.reverter
    }

    // ========================================
    // Discovery and server
    // ========================================

    /// 🔍 All hosts
    pub fn hosts(&self) -> Vec<Host> {
        get_hosts(&self.store).into_iter().map(|v| v.host).collect()
    }

    /// 🔍 Hosts answering to `name`
    pub fn hosts_by_server_name(&self, name: &str) -> Vec<Host> {
        get_hosts_by_server_name(&self.store, name)
            .into_iter()
            .map(|v| v.host)
            .collect()
    }

    pub fn version(&self) -> Result<String> {
        self.control.version()
    }

    pub fn check_configuration(&self) -> Result<()> {
        self.control.test_configuration()
    }

    pub fn restart(&self) -> Result<()> {
        self.control.restart()
    }

    /// 🔌 Make sure the server listens on `port`
    pub fn ensure_port(&mut self, port: &str, https: bool) -> Result<bool> {
        ensure_port_listening(&mut self.store, port, https)
    }

    // ========================================
    // Changes
    // ========================================

    /// 🔐 Point every host answering to `server_name` at the certificate,
    /// turning plaintext hosts into TLS hosts first. Changes stay in memory
    /// until [`Manager::save_changes`].
    pub fn deploy_certificate(&mut self, server_name: &str, paths: &CertificatePaths) -> Result<Vec<Host>> {
        let settings = self.store.settings().clone();
        let (certificate, chain) = paths.certificate_files(&settings.dialect)?;
        let key = paths.key()?;

        let vhosts = get_hosts_by_server_name(&self.store, server_name);
        if vhosts.is_empty() {
            return Err(Error::NotFound(format!("host {}", server_name)));
        }

        if settings.dialect.global_listen {
            ensure_port_listening(&mut self.store, &settings.https_port, true)?;
        }

        let mut deployed = Vec::new();
        for vhost in vhosts {
            let vhost = if vhost.host.ssl {
                vhost
            } else {
                match settings.tls_strategy() {
                    TlsStrategy::Clone => make_tls_clone(&mut self.store, &mut self.reverter, &vhost)?.vhost,
                    TlsStrategy::InPlace => make_tls_in_place(&mut self.store, &vhost)?,
                }
            };

            self.install_certificate(&vhost, certificate, key, chain)?;

            let mut host = host_at(&self.store, &vhost.locator)
                .map(|v| v.host)
                .unwrap_or(vhost.host);
            if !host.enabled {
                self.enable_host(&host)?;
                host.enabled = true;
            }

            tracing::info!("🔐 Certificate deployed to {:?} in {:?}", host.server_name, host.file_path);
            deployed.push(host);
        }

        Ok(deployed)
    }

    fn install_certificate(
        &mut self,
        vhost: &VirtualHost,
        certificate: &str,
        key: &str,
        chain: Option<&str>,
    ) -> Result<()> {
        let dialect = self.store.dialect().clone();

        if let Some(chain_name) = &dialect.certificate_chain {
            if chain.is_none() {
                self.store.remove_directives(&vhost.locator, &[chain_name.as_str()])?;
            }
        }

        let mut specs = vec![
            DirectiveSpec::new(&dialect.certificate_key, &[key]).blank_line_before(),
            DirectiveSpec::new(&dialect.certificate, &[certificate]),
        ];
        if let (Some(name), Some(chain)) = (&dialect.certificate_chain, chain) {
            specs.push(DirectiveSpec::new(name, &[chain]));
        }
        self.store.update_or_add_directives(&vhost.locator, &specs, false)
    }

    /// ✅ Make a disabled host active: link it into the enabled-hosts
    /// directory, or include it from the root configuration when linking
    /// is not possible
    pub fn enable_host(&mut self, host: &Host) -> Result<()> {
        let path = &host.file_path;
        if host.enabled {
            tracing::debug!("Host {:?} is already enabled", path);
            return Ok(());
        }

        let enabled_dir = self.store.settings().enabled_hosts_path();
        if path.parent().is_some_and(|dir| same_dir(dir, &enabled_dir)) {
            tracing::debug!("Host {:?} lives in the enabled hosts directory", path);
            return Ok(());
        }

        match self.switch.enable(path) {
            Ok(true) => {
                self.reverter.add_host_config_to_disable(path)?;
                return Ok(());
            }
            Ok(false) => {
                tracing::debug!("Host {:?} was already linked", path);
                return Ok(());
            }
            Err(e) => tracing::debug!("Could not link {:?}: {}", path, e),
        }

        if self.store.is_included(path) {
            return Ok(());
        }

        let target = self.include_target();
        if self.store.add_include(&target, &path.to_string_lossy())? {
            tracing::info!("✅ Enabled {:?} through an include in {}", path, target);
        }
        Ok(())
    }

    /// Where host includes go: the first top-level include context of the
    /// root configuration that is neither a guard nor a host block
    fn include_target(&self) -> Locator {
        let root = Locator::file(self.store.root());
        let dialect = self.store.dialect();
        self.store
            .entries(&root)
            .and_then(|entries| {
                child_blocks(entries).into_iter().find_map(|(segment, block)| {
                    let context = dialect.is_include_context(&block.name)
                        && !dialect.is_guard(&block.name)
                        && !dialect.is_server_block(&block.name);
                    context.then(|| root.child(segment))
                })
            })
            .unwrap_or(root)
    }

    /// 💾 Back up every changed file, then write the changes
    pub fn save_changes(&mut self) -> Result<Vec<PathBuf>> {
        let changed = self.store.changed_files();
        self.reverter.backup_files(&changed)?;
        self.store.dump()
    }

    /// Keep all saved changes and start a new transaction
    pub fn commit_changes(&mut self) -> Result<()> {
        self.reverter.commit()?;
        self.reverter = Reverter::new(self.switch.clone());
        Ok(())
    }

    /// ↩️ Undo all saved changes, start a new transaction and parse the
    /// configuration again
    pub fn rollback_changes(&mut self) -> Result<()> {
        let result = self.reverter.rollback();
        self.reverter = Reverter::new(self.switch.clone());
        self.store.parse();
        result
    }

    /// 🚀 Deploy, save, test, commit and reload. Any failure before the
    /// commit rolls everything back.
    pub fn deploy(&mut self, server_name: &str, paths: &CertificatePaths) -> Result<Vec<Host>> {
        match self.apply(server_name, paths) {
            Ok(hosts) => {
                self.commit_changes()?;
                self.restart()?;
                tracing::info!("✅ Deployed certificate for {}", server_name);
                Ok(hosts)
            }
            Err(err) => {
                tracing::error!("❌ Deploy for {} failed: {}", server_name, err);
                let rollback = self.rollback_changes();
                Err(err.with_rollback(rollback))
            }
        }
    }

    fn apply(&mut self, server_name: &str, paths: &CertificatePaths) -> Result<Vec<Host>> {
        let hosts = self.deploy_certificate(server_name, paths)?;
        self.save_changes()?;
        self.check_configuration()?;
        Ok(hosts)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
