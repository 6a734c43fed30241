//! vhostmng Core Library
//!
//! This crate provides the types shared by the vhostmng crates: the virtual
//! host model, settings, the change reverter and error handling.

pub mod config;
pub mod error;
pub mod host;
pub mod reverter;

pub use config::{Dialect, RuntimeFacts, Settings, SettingsLoader, TlsStrategy};
pub use error::{Error, Result};
pub use host::{Address, Host, Listen};
pub use reverter::{backup_path, HostSwitch, Reverter, TransactionState};

/// vhostmng version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
