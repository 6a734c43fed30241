//! vhostmng Deploy Module
//!
//! Puts certificates into virtual hosts and drives the server:
//! - Certificate deployment inside one reversible transaction
//! - Host enabling through the enabled-hosts directory
//! - Configuration testing and reloading through the server binary

pub mod control;
pub mod manager;
pub mod site;

pub use control::{parse_version, BinaryControl, ServerControl};
pub use manager::{CertificatePaths, Manager};
pub use site::SymlinkSites;
