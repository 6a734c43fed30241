//! Change reverter
//!
//! ↩️ Records every file a multi-step change touches so the whole change can
//! be committed or undone as one unit.
//!
//! A reverter starts *open*. [`Reverter::commit`] and [`Reverter::rollback`]
//! move it to a terminal state; repeating the same terminal call is a no-op,
//! while any other call on a closed reverter fails.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix appended to a file's path to form its backup
pub const BACKUP_SUFFIX: &str = ".back";

/// Enables and disables host configuration files
pub trait HostSwitch {
    /// Make the host file active. Returns `false` when it already was, so
    /// the caller knows there is nothing to undo.
    fn enable(&self, path: &Path) -> Result<bool>;

    /// Make the host file inactive
    fn disable(&self, path: &Path) -> Result<()>;
}

/// Path of the backup copy for `path`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Lifecycle of a reverter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// ↩️ Tracks created files, backed up files and enabled hosts
pub struct Reverter {
    files_to_delete: Vec<PathBuf>,
    /// original path -> backup path
    files_to_restore: BTreeMap<PathBuf, PathBuf>,
    hosts_to_disable: Vec<PathBuf>,
    switch: Arc<dyn HostSwitch>,
    state: TransactionState,
}

impl Reverter {
    /// Create an open reverter disabling hosts through `switch` on rollback
    pub fn new(switch: Arc<dyn HostSwitch>) -> Self {
        Self {
            files_to_delete: Vec::new(),
            files_to_restore: BTreeMap::new(),
            hosts_to_disable: Vec::new(),
            switch,
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Files that will be deleted on rollback
    pub fn files_to_delete(&self) -> &[PathBuf] {
        &self.files_to_delete
    }

    /// Whether `path` has a backup recorded
    pub fn is_backed_up(&self, path: &Path) -> bool {
        self.files_to_restore.contains_key(path)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            state => Err(Error::Transaction(vec![format!(
                "transaction is closed ({:?})",
                state
            )])),
        }
    }

    /// 💾 Copy the current content of `path` to its backup.
    ///
    /// Files already backed up or created by this change are skipped.
    pub fn backup_file(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;

        if self.files_to_restore.contains_key(path) || self.files_to_delete.iter().any(|p| p == path) {
            tracing::debug!("Skipping backup of {:?}", path);
            return Ok(());
        }

        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|e| Error::io(path, e))?;
        tracing::debug!("💾 Backed up {:?} to {:?}", path, backup);
        self.files_to_restore.insert(path.to_path_buf(), backup);
        Ok(())
    }

    /// Back up several files
    pub fn backup_files(&mut self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            self.backup_file(path)?;
        }
        Ok(())
    }

    /// Record a file created by this change
    pub fn add_file_to_deletion(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;
        if !self.files_to_delete.iter().any(|p| p == path) {
            self.files_to_delete.push(path.to_path_buf());
        }
        Ok(())
    }

    /// Record a host file enabled by this change
    pub fn add_host_config_to_disable(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;
        if !self.hosts_to_disable.iter().any(|p| p == path) {
            self.hosts_to_disable.push(path.to_path_buf());
        }
        Ok(())
    }

    /// ✅ Keep the change: drop all backups
    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Committed => return Ok(()),
            TransactionState::RolledBack => return self.ensure_open(),
            TransactionState::Open => {}
        }

        for backup in self.files_to_restore.values() {
            if let Err(e) = fs::remove_file(backup) {
                tracing::error!("Failed to remove backup {:?}: {}", backup, e);
            }
        }

        self.files_to_restore.clear();
        self.files_to_delete.clear();
        self.hosts_to_disable.clear();
        self.state = TransactionState::Committed;
        tracing::info!("✅ Changes committed");
        Ok(())
    }

    /// ↩️ Undo the change.
    ///
    /// Every undo action is attempted; failures are collected into one
    /// [`Error::Transaction`].
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            TransactionState::RolledBack => return Ok(()),
            TransactionState::Committed => return self.ensure_open(),
            TransactionState::Open => {}
        }

        let mut failures = Vec::new();

        for path in std::mem::take(&mut self.hosts_to_disable) {
            if let Err(e) = self.switch.disable(&path) {
                failures.push(format!("disable {}: {}", path.display(), e));
            }
        }

        for path in std::mem::take(&mut self.files_to_delete) {
            if !path.exists() {
                continue;
            }
            if let Err(e) = fs::remove_file(&path) {
                failures.push(format!("delete {}: {}", path.display(), e));
            }
        }

        for (path, backup) in std::mem::take(&mut self.files_to_restore) {
            if let Err(e) = fs::rename(&backup, &path) {
                failures.push(format!("restore {}: {}", path.display(), e));
            }
        }

        self.state = TransactionState::RolledBack;

        if failures.is_empty() {
            tracing::info!("↩️ Changes rolled back");
            Ok(())
        } else {
            tracing::error!("Rollback finished with {} failure(s)", failures.len());
            Err(Error::Transaction(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSwitch {
        disabled: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl HostSwitch for RecordingSwitch {
        fn enable(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }

        fn disable(&self, path: &Path) -> Result<()> {
            if self.fail {
                return Err(Error::Internal("switch broken".to_string()));
            }
            self.disabled.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_backup_and_rollback_restores_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("site.conf");
        fs::write(&file, "server {}\n").unwrap();

        let mut reverter = Reverter::new(Arc::new(RecordingSwitch::default()));
        reverter.backup_file(&file).unwrap();
        assert!(backup_path(&file).exists());

        fs::write(&file, "server { listen 443; }\n").unwrap();
        reverter.rollback().unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "server {}\n");
        assert!(!backup_path(&file).exists());
        assert_eq!(reverter.state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_backup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("site.conf");
        fs::write(&file, "original").unwrap();

        let mut reverter = Reverter::new(Arc::new(RecordingSwitch::default()));
        reverter.backup_file(&file).unwrap();
        fs::write(&file, "modified").unwrap();
        // A second backup must not overwrite the first copy
        reverter.backup_file(&file).unwrap();
        assert_eq!(fs::read_to_string(backup_path(&file)).unwrap(), "original");
    }

    #[test]
    fn test_created_files_are_not_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("new-ssl.conf");

        let mut reverter = Reverter::new(Arc::new(RecordingSwitch::default()));
        reverter.add_file_to_deletion(&file).unwrap();
        fs::write(&file, "server {}").unwrap();
        reverter.backup_file(&file).unwrap();
        assert!(!backup_path(&file).exists());

        reverter.rollback().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_commit_removes_backups() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("site.conf");
        fs::write(&file, "a").unwrap();

        let mut reverter = Reverter::new(Arc::new(RecordingSwitch::default()));
        reverter.backup_file(&file).unwrap();
        reverter.commit().unwrap();
        reverter.commit().unwrap();

        assert!(!backup_path(&file).exists());
        assert!(reverter.rollback().is_err());
        assert!(reverter.backup_file(&file).is_err());
    }

    #[test]
    fn test_rollback_disables_hosts() {
        let switch = Arc::new(RecordingSwitch::default());
        let mut reverter = Reverter::new(switch.clone());
        let path = PathBuf::from("/etc/nginx/sites-available/a.conf");
        reverter.add_host_config_to_disable(&path).unwrap();
        reverter.add_host_config_to_disable(&path).unwrap();
        reverter.rollback().unwrap();

        assert_eq!(*switch.disabled.lock().unwrap(), vec![path]);
    }

    #[test]
    fn test_rollback_aggregates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("site.conf");
        fs::write(&file, "original").unwrap();

        let switch = Arc::new(RecordingSwitch {
            fail: true,
            ..Default::default()
        });
        let mut reverter = Reverter::new(switch);
        reverter.add_host_config_to_disable(&file).unwrap();
        reverter.backup_file(&file).unwrap();
        fs::write(&file, "modified").unwrap();

        match reverter.rollback() {
            Err(Error::Transaction(failures)) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("disable"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // The restore still ran despite the disable failure
        assert_eq!(fs::read_to_string(&file).unwrap(), "original");
    }
}
