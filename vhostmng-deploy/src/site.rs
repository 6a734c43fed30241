//! Host enabling through symlinks
//!
//! 🔗 A host file is enabled by linking it into the enabled-hosts directory
//! (`sites-enabled/`) and disabled by removing that link.

use std::fs;
use std::path::{Path, PathBuf};
use vhostmng_core::{Error, HostSwitch, Result};

/// 🔗 [`HostSwitch`] backed by an enabled-hosts directory
#[derive(Debug, Clone)]
pub struct SymlinkSites {
    enabled_dir: PathBuf,
}

impl SymlinkSites {
    pub fn new(enabled_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled_dir: enabled_dir.into(),
        }
    }

    /// Link path for the host file `path`
    pub fn link_path(&self, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| Error::NotFound(format!("file name of {}", path.display())))?;
        Ok(self.enabled_dir.join(name))
    }
}

impl HostSwitch for SymlinkSites {
    fn enable(&self, path: &Path) -> Result<bool> {
        if !self.enabled_dir.is_dir() {
            return Err(Error::NotFound(format!(
                "enabled hosts directory {}",
                self.enabled_dir.display()
            )));
        }

        let link = self.link_path(path)?;
        if fs::symlink_metadata(&link).is_ok() {
            tracing::debug!("Host {:?} is already linked", path);
            return Ok(false);
        }

        symlink(path, &link)?;
        tracing::info!("🔗 Enabled {:?}", path);
        Ok(true)
    }

    fn disable(&self, path: &Path) -> Result<()> {
        let link = self.link_path(path)?;
        match fs::symlink_metadata(&link) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(&link).map_err(|e| Error::io(&link, e))?;
                tracing::info!("✂️ Disabled {:?}", path);
                Ok(())
            }
            Ok(_) => Err(Error::Unsupported(format!(
                "{} is not a symlink",
                link.display()
            ))),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link, e))
}

#[cfg(not(unix))]
fn symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(Error::Unsupported(format!(
        "cannot link {} on this platform",
        link.display()
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_enable_disable() {
        let dir = tempfile::tempdir().unwrap();
        let available = dir.path().join("sites-available/a.conf");
        fs::create_dir_all(available.parent().unwrap()).unwrap();
        fs::create_dir_all(dir.path().join("sites-enabled")).unwrap();
        fs::write(&available, "server { }\n").unwrap();

        let sites = SymlinkSites::new(dir.path().join("sites-enabled"));
        let link = dir.path().join("sites-enabled/a.conf");

        assert!(sites.enable(&available).unwrap());
        assert_eq!(fs::read_link(&link).unwrap(), available);
        // A second enable finds the link and reports no change
        assert!(!sites.enable(&available).unwrap());

        sites.disable(&available).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
        sites.disable(&available).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sites = SymlinkSites::new(dir.path().join("nope"));
        assert!(matches!(
            sites.enable(&dir.path().join("a.conf")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_refuses_to_remove_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.conf"), "").unwrap();
        let sites = SymlinkSites::new(dir.path());
        assert!(sites.disable(&dir.path().join("a.conf")).is_err());
    }
}
