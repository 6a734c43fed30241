//! vhostmng Configuration Engine
//!
//! This crate reads block-structured web server configuration into lossless
//! trees, finds virtual hosts in them, edits them in place, and writes them
//! back byte-for-byte except where they were changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use vhostmng_config::{get_hosts, ConfigStore, DirectiveSpec};
//! use vhostmng_core::Settings;
//!
//! let mut store = ConfigStore::open(Settings::nginx("/etc/nginx"))?;
//! let host = get_hosts(&store).remove(0);
//! store.add_directives(&host.locator, &[DirectiveSpec::new("ssl_certificate", &["/tls/cert.pem"])], false)?;
//! store.dump()?;
//! ```

pub mod dumper;
pub mod edit;
pub mod hosts;
pub mod listen;
pub mod locator;
pub mod parser;
pub mod query;
pub mod report;
pub mod store;
pub mod tls;

pub use dumper::{dump, dump_entry};
pub use edit::DirectiveSpec;
pub use hosts::{get_hosts, get_hosts_by_server_name, host_at, parse_listen, VirtualHost};
pub use listen::{ensure_port_listening, ip_from_listen, is_port_listened};
pub use locator::{new_locators, Locator, Segment};
pub use parser::{parse, parse_config, Config, Entry, EntryKind, LexError, ParseError, Token};
pub use query::{find_directives, is_active, DirectiveMatch, Guard, GuardKind};
pub use store::{read_config, ConfigStore};
pub use tls::{make_tls_clone, make_tls_in_place, suppress_https_rewrites, tls_host_path, TlsClone};
