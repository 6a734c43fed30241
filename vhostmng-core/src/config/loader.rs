//! Settings loader

use crate::config::Settings;
use crate::error::{Error, Result};
use std::path::Path;

/// Settings loader for various formats
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&content),
            "toml" | "" => Self::from_toml(&content),
            _ => Err(Error::Config(format!("Unknown settings format: {}", ext))),
        }
    }

    /// Load settings from `path` if given, else from the default location
    /// when it exists, else fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Settings> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Settings::default_path();
                if default.is_file() {
                    tracing::debug!("📄 Using settings from {:?}", default);
                    Self::load(default)
                } else {
                    Ok(Settings::default())
                }
            }
        }
    }

    /// Parse JSON settings
    pub fn from_json(content: &str) -> Result<Settings> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Parse TOML settings
    pub fn from_toml(content: &str) -> Result<Settings> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsStrategy;

    #[test]
    fn test_json_loading() {
        let json = r#"{"server_root": "/srv/nginx", "https_port": "8443"}"#;
        let settings = SettingsLoader::from_json(json).unwrap();
        assert_eq!(settings.server_root, std::path::PathBuf::from("/srv/nginx"));
        assert_eq!(settings.https_port, "8443");
        assert_eq!(settings.http_port, "80");
    }

    #[test]
    fn test_toml_loading() {
        let toml = r#"
            server_root = "/etc/apache2"
            tls_strategy = "in_place"

            [facts]
            modules = ["ssl_module"]

            [dialect]
            server_block = "virtualhost"
            global_listen = true
        "#;
        let settings = SettingsLoader::from_toml(toml).unwrap();
        assert_eq!(settings.tls_strategy, Some(TlsStrategy::InPlace));
        assert!(settings.facts.has_module("ssl_module"));
        assert!(settings.dialect.is_server_block("VirtualHost"));
        assert!(settings.dialect.global_listen);
        // Unset dialect keys keep their defaults
        assert_eq!(settings.dialect.listen, "listen");
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "x: 1").unwrap();
        assert!(matches!(SettingsLoader::load(&path), Err(Error::Config(_))));
    }
}
