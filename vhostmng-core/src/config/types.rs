//! Settings type definitions
//!
//! These types describe where the web server keeps its configuration and
//! which keywords its configuration language uses.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Root file names looked up in the server root when none is configured
pub const ROOT_CONFIG_CANDIDATES: &[&str] = &["nginx.conf", "apache2.conf", "httpd.conf"];

/// Root settings for vhostmng
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory relative include paths are resolved against
    pub server_root: PathBuf,

    /// Root configuration file, looked up in `server_root` when absent
    pub config_root: Option<PathBuf>,

    /// Listen config file for dialects with global listen statements
    pub listen_config: Option<PathBuf>,

    /// Plain HTTP port
    pub http_port: String,

    /// TLS port used for cloned and upgraded hosts
    pub https_port: String,

    /// How plaintext hosts are turned into TLS hosts, picked from the
    /// dialect when unset
    pub tls_strategy: Option<TlsStrategy>,

    /// Suffix replacing `.conf` on cloned TLS host files
    pub ssl_host_suffix: String,

    /// Directory holding available (not necessarily enabled) host files
    pub host_root: Option<PathBuf>,

    /// Glob of host files inside `host_root`
    pub host_files: String,

    /// Directory enabled hosts are symlinked into
    pub enabled_hosts_dir: Option<PathBuf>,

    /// Server binary used for version, config test and reload
    pub control_bin: PathBuf,

    /// Modules and defines conditional blocks are checked against
    pub facts: RuntimeFacts,

    /// Keywords of the configuration language
    pub dialect: Dialect,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_root: PathBuf::from("/etc/nginx"),
            config_root: None,
            listen_config: None,
            http_port: "80".to_string(),
            https_port: "443".to_string(),
            tls_strategy: None,
            ssl_host_suffix: "-ssl.conf".to_string(),
            host_root: None,
            host_files: "*".to_string(),
            enabled_hosts_dir: None,
            control_bin: PathBuf::from("nginx"),
            facts: RuntimeFacts::default(),
            dialect: Dialect::default(),
        }
    }
}

impl Settings {
    /// Settings for an nginx installation rooted at `server_root`
    pub fn nginx(server_root: impl Into<PathBuf>) -> Self {
        Self {
            server_root: server_root.into(),
            ..Default::default()
        }
    }

    /// Resolve `path` against the server root unless it is absolute
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.server_root.join(path)
        }
    }

    /// The root configuration file
    pub fn config_root_path(&self) -> Result<PathBuf> {
        if let Some(root) = &self.config_root {
            return Ok(self.resolve(root));
        }

        ROOT_CONFIG_CANDIDATES
            .iter()
            .map(|name| self.server_root.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no root configuration in {}",
                    self.server_root.display()
                ))
            })
    }

    /// The file global listen statements are added to: the configured one,
    /// `ports.conf` when present, otherwise the root configuration
    pub fn listen_config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.listen_config {
            return Ok(self.resolve(path));
        }
        let ports = self.server_root.join("ports.conf");
        if ports.is_file() {
            return Ok(ports);
        }
        self.config_root_path()
    }

    /// The configured TLS strategy, else cloning for languages whose host
    /// blocks carry their addresses and in-place upgrades otherwise
    pub fn tls_strategy(&self) -> TlsStrategy {
        match self.tls_strategy {
            Some(strategy) => strategy,
            None if self.dialect.addresses_in_params => TlsStrategy::Clone,
            None => TlsStrategy::InPlace,
        }
    }

    /// Enabled-hosts directory, resolved against the server root
    pub fn enabled_hosts_path(&self) -> PathBuf {
        self.resolve(
            self.enabled_hosts_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("sites-enabled")),
        )
    }

    /// Default settings file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vhostmng")
            .join("settings.toml")
    }
}

/// How a plaintext host gets TLS
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TlsStrategy {
    /// Copy the host block into a sibling TLS file
    Clone,
    /// Add TLS listens to the existing block
    InPlace,
}

/// Facts about the running server that conditional blocks depend on
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeFacts {
    /// Loaded module identifiers
    pub modules: BTreeSet<String>,
    /// Defined variables
    pub defines: BTreeSet<String>,
}

impl RuntimeFacts {
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    pub fn has_define(&self, name: &str) -> bool {
        self.defines.contains(name)
    }
}

/// Keywords of a block-structured configuration language.
///
/// All comparisons against these keywords are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Block keyword of a virtual host
    pub server_block: String,
    /// Directive whose first value is the server name
    pub server_name: String,
    /// Directive listing extra names, if the language has one
    pub server_alias: Option<String>,
    /// Directive holding the document root
    pub document_root: String,
    /// Listen directive
    pub listen: String,
    /// Block-level TLS switch (`ssl on`) and listen parameter (`ssl`)
    pub ssl_toggle: String,
    /// Include directives
    pub include: Vec<String>,
    /// Blocks whose children are scanned for includes
    pub include_contexts: Vec<String>,
    /// Directives that may appear many times in one block
    pub repeatable: Vec<String>,
    /// Rewrite rules, checked for `https://` targets when cloning
    pub rewrite_rule: Vec<String>,
    /// Conditions preceding a rewrite rule
    pub rewrite_condition: Vec<String>,
    /// Redirects whose last value is the target (`return 301 URL`)
    pub redirect: Vec<String>,
    /// Conditional block on a loaded module
    pub module_guard: String,
    /// Conditional block on a defined variable
    pub define_guard: String,
    /// Module TLS directives are guarded with, if any
    pub tls_module: Option<String>,
    /// Ports implying TLS
    pub tls_ports: Vec<String>,
    /// Certificate file directive
    pub certificate: String,
    /// Private key directive
    pub certificate_key: String,
    /// Chain file directive, if the language separates it
    pub certificate_chain: Option<String>,
    /// Listen statements live outside host blocks
    pub global_listen: bool,
    /// Host blocks carry their addresses as block parameters
    pub addresses_in_params: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::nginx()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Dialect {
    /// nginx keywords
    pub fn nginx() -> Self {
        Self {
            server_block: "server".to_string(),
            server_name: "server_name".to_string(),
            server_alias: None,
            document_root: "root".to_string(),
            listen: "listen".to_string(),
            ssl_toggle: "ssl".to_string(),
            include: strings(&["include"]),
            include_contexts: strings(&["http", "server", "ifmodule", "ifdefine"]),
            repeatable: strings(&["listen", "server_name", "include", "rewrite", "add_header"]),
            rewrite_rule: strings(&["rewrite", "rewriterule"]),
            rewrite_condition: strings(&["rewritecond"]),
            redirect: strings(&["return"]),
            module_guard: "ifmodule".to_string(),
            define_guard: "ifdefine".to_string(),
            tls_module: None,
            tls_ports: strings(&["443"]),
            certificate: "ssl_certificate".to_string(),
            certificate_key: "ssl_certificate_key".to_string(),
            certificate_chain: None,
            global_listen: false,
            addresses_in_params: false,
        }
    }

    /// Apache httpd keywords written in the braced block grammar
    pub fn httpd() -> Self {
        Self {
            server_block: "virtualhost".to_string(),
            server_name: "servername".to_string(),
            server_alias: Some("serveralias".to_string()),
            document_root: "documentroot".to_string(),
            listen: "listen".to_string(),
            ssl_toggle: "sslengine".to_string(),
            include: strings(&["include", "includeoptional"]),
            include_contexts: strings(&["virtualhost", "ifmodule", "ifdefine"]),
            repeatable: strings(&[
                "listen",
                "serveralias",
                "include",
                "includeoptional",
                "rewriterule",
                "rewritecond",
                "header",
            ]),
            rewrite_rule: strings(&["rewriterule"]),
            rewrite_condition: strings(&["rewritecond"]),
            redirect: Vec::new(),
            module_guard: "ifmodule".to_string(),
            define_guard: "ifdefine".to_string(),
            tls_module: Some("ssl_module".to_string()),
            tls_ports: strings(&["443"]),
            certificate: "sslcertificatefile".to_string(),
            certificate_key: "sslcertificatekeyfile".to_string(),
            certificate_chain: Some("sslcertificatechainfile".to_string()),
            global_listen: true,
            addresses_in_params: true,
        }
    }

    fn contains(list: &[String], name: &str) -> bool {
        list.iter().any(|item| item.eq_ignore_ascii_case(name))
    }

    pub fn is_server_block(&self, name: &str) -> bool {
        self.server_block.eq_ignore_ascii_case(name)
    }

    pub fn is_include(&self, name: &str) -> bool {
        Self::contains(&self.include, name)
    }

    pub fn is_include_context(&self, name: &str) -> bool {
        Self::contains(&self.include_contexts, name)
    }

    pub fn is_repeatable(&self, name: &str) -> bool {
        Self::contains(&self.repeatable, name)
    }

    pub fn is_rewrite_rule(&self, name: &str) -> bool {
        Self::contains(&self.rewrite_rule, name)
    }

    pub fn is_rewrite_condition(&self, name: &str) -> bool {
        Self::contains(&self.rewrite_condition, name)
    }

    pub fn is_redirect(&self, name: &str) -> bool {
        Self::contains(&self.redirect, name)
    }

    pub fn is_tls_port(&self, port: &str) -> bool {
        self.tls_ports.iter().any(|p| p == port)
    }

    /// Whether `name` opens a conditional block
    pub fn is_guard(&self, name: &str) -> bool {
        self.module_guard.eq_ignore_ascii_case(name) || self.define_guard.eq_ignore_ascii_case(name)
    }
}
