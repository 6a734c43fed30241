//! Parsed file set
//!
//! 📚 The store owns one tree per configuration file. It resolves include
//! directives (with glob expansion) starting from the root configuration,
//! remembers which files changed, and writes those files back.

use crate::dumper::dump;
use crate::locator::{find_blocks, Locator};
use crate::parser::{parse_config, BlockDirective, Config, Entry};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use vhostmng_core::{Dialect, Error, Result, Settings};

/// 📚 All parsed configuration files of one server
pub struct ConfigStore {
    settings: Settings,
    root: PathBuf,
    files: BTreeMap<PathBuf, Config>,
    changed: BTreeSet<PathBuf>,
    /// Files reached through includes from the root configuration
    included: BTreeSet<PathBuf>,
}

impl ConfigStore {
    /// Create an empty store for the root configuration `root`
    pub fn new(settings: Settings, root: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            root: root.into(),
            files: BTreeMap::new(),
            changed: BTreeSet::new(),
            included: BTreeSet::new(),
        }
    }

    /// 🚀 Locate the root configuration and parse everything it includes
    pub fn open(settings: Settings) -> Result<Self> {
        let root = settings.config_root_path()?;
        let mut store = Self::new(settings, root);
        store.parse();
        Ok(store)
    }

    /// Drop all trees and parse again from the root configuration,
    /// then scan the host root for hosts that are not included
    pub fn parse(&mut self) {
        self.files.clear();
        self.changed.clear();
        self.included.clear();

        let root = self.root.to_string_lossy().into_owned();
        self.parse_tree(&root, true);

        if let Some(host_root) = &self.settings.host_root {
            let pattern = self.settings.resolve(host_root).join(&self.settings.host_files);
            self.parse_tree(&pattern.to_string_lossy(), false);
        }

        tracing::info!(
            "📚 Parsed {} file(s) from {:?}",
            self.files.len(),
            self.root
        );
    }

    /// Parse every file matching `path` and, recursively, everything those
    /// files include. Files already parsed are skipped.
    pub fn parse_recursively(&mut self, path: &str) {
        self.parse_tree(path, true);
    }

    fn parse_tree(&mut self, pattern: &str, reached_by_include: bool) {
        for path in self.expand(pattern) {
            if reached_by_include {
                self.included.insert(path.clone());
            }
            if !self.load(&path, false) {
                continue;
            }

            let includes = match self.files.get(&path) {
                Some(config) => collect_includes(&config.entries, &self.settings.dialect),
                None => Vec::new(),
            };
            for include in includes {
                self.parse_tree(&include, reached_by_include);
            }
        }
    }

    /// Parse every file matching `pattern` without following includes.
    /// Returns the files that were (re)parsed.
    pub fn parse_files_by_path(&mut self, pattern: &str, override_existing: bool) -> Vec<PathBuf> {
        self.expand(pattern)
            .into_iter()
            .filter(|path| self.load(path, override_existing))
            .collect()
    }

    /// Glob `pattern` relative to the server root; regular files only, sorted
    pub fn expand(&self, pattern: &str) -> Vec<PathBuf> {
        let pattern = self.settings.resolve(pattern);
        let pattern = pattern.to_string_lossy();

        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!("⚠️ Invalid include pattern {:?}: {}", pattern, e);
                return Vec::new();
            }
        };

        let mut matched: Vec<PathBuf> = paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        matched.sort();
        matched
    }

    /// Parse one file into the store. Returns whether it was parsed.
    fn load(&mut self, path: &Path, override_existing: bool) -> bool {
        if self.files.contains_key(path) && !override_existing {
            tracing::debug!("Skipping already parsed {:?}", path);
            return false;
        }

        match read_config(path) {
            Ok(config) => {
                tracing::debug!("📄 Parsed {:?}", path);
                self.files.insert(path.to_path_buf(), config);
                self.changed.remove(path);
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Skipping {:?}: {}", path, e);
                false
            }
        }
    }

    /// Parse `path` again, replacing its tree and discarding unsaved edits
    pub fn reparse(&mut self, path: &Path) -> Result<()> {
        let config = read_config(path)?;
        self.files.insert(path.to_path_buf(), config);
        self.changed.remove(path);
        Ok(())
    }

    // ========================================
    // Access
    // ========================================

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dialect(&self) -> &Dialect {
        &self.settings.dialect
    }

    /// The root configuration file
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, path: &Path) -> Option<&Config> {
        self.files.get(path)
    }

    /// Mutable tree access; callers mark the file with [`ConfigStore::mark_changed`]
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Config> {
        self.files.get_mut(path)
    }

    /// All trees, sorted by path
    pub fn files(&self) -> impl Iterator<Item = &Config> {
        self.files.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Whether `path` (or the file it resolves to) was reached from the
    /// root configuration
    pub fn is_included(&self, path: &Path) -> bool {
        if self.included.contains(path) {
            return true;
        }
        let Ok(real) = fs::canonicalize(path) else {
            return false;
        };
        self.included
            .iter()
            .any(|p| fs::canonicalize(p).is_ok_and(|r| r == real))
    }

    /// The block a locator points at
    pub fn block(&self, locator: &Locator) -> Option<&BlockDirective> {
        locator.resolve(&self.files.get(&locator.file)?.entries)
    }

    /// Mutable variant of [`ConfigStore::block`]
    pub fn block_mut(&mut self, locator: &Locator) -> Option<&mut BlockDirective> {
        locator.resolve_mut(&mut self.files.get_mut(&locator.file)?.entries)
    }

    /// Entries under a locator: a block's children or a file's top level
    pub fn entries(&self, locator: &Locator) -> Option<&[Entry]> {
        let config = self.files.get(&locator.file)?;
        if locator.is_file_root() {
            Some(&config.entries)
        } else {
            locator.resolve(&config.entries).map(|b| b.entries.as_slice())
        }
    }

    /// Mutable variant of [`ConfigStore::entries`]
    pub fn entries_mut(&mut self, locator: &Locator) -> Option<&mut Vec<Entry>> {
        let config = self.files.get_mut(&locator.file)?;
        if locator.is_file_root() {
            Some(&mut config.entries)
        } else {
            locator.resolve_mut(&mut config.entries).map(|b| &mut b.entries)
        }
    }

    /// Locators of all server blocks in `path`
    pub fn server_blocks(&self, path: &Path) -> Vec<Locator> {
        let Some(config) = self.files.get(path) else {
            return Vec::new();
        };
        let dialect = &self.settings.dialect;
        find_blocks(&Locator::file(path), &config.entries, &|name| dialect.is_server_block(name))
    }

    // ========================================
    // Changes
    // ========================================

    /// Put a new or replaced tree into the store and mark it changed
    pub fn insert(&mut self, config: Config) {
        let path = config.path.clone();
        self.files.insert(path.clone(), config);
        self.changed.insert(path);
    }

    pub fn mark_changed(&mut self, path: &Path) {
        self.changed.insert(path.to_path_buf());
    }

    pub fn is_changed(&self, path: &Path) -> bool {
        self.changed.contains(path)
    }

    /// Files with unsaved changes
    pub fn changed_files(&self) -> Vec<PathBuf> {
        self.changed.iter().cloned().collect()
    }

    /// 💾 Write every changed file. Returns the written paths.
    pub fn dump(&mut self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for path in self.changed_files() {
            self.dump_file(&path)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Write one file, changed or not
    pub fn dump_file(&mut self, path: &Path) -> Result<()> {
        let config = self
            .files
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("{} is not parsed", path.display())))?;
        fs::write(path, dump(config)).map_err(|e| Error::io(path, e))?;
        self.changed.remove(path);
        tracing::info!("💾 Saved {:?}", path);
        Ok(())
    }
}

/// Read and parse one file, attaching the path to parse errors
pub fn read_config(path: &Path) -> Result<Config> {
    let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_config(path, &source).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        line: e.line(),
        message: e.to_string(),
    })
}

/// Include targets at the top level and inside include contexts
fn collect_includes(entries: &[Entry], dialect: &Dialect) -> Vec<String> {
    let mut includes = Vec::new();
    for entry in entries {
        if let Some(directive) = entry.as_directive() {
            if dialect.is_include(&directive.name) {
                includes.extend(directive.first_value());
            }
        } else if let Some(block) = entry.as_block() {
            if dialect.is_include_context(&block.name) {
                includes.extend(collect_includes(&block.entries, dialect));
            }
        }
    }
    includes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn open(dir: &TempDir) -> ConfigStore {
        ConfigStore::open(Settings::nginx(dir.path())).unwrap()
    }

    #[test]
    fn test_includes_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "nginx.conf", "http {\n    include conf.d/*.conf;\n    include sites-enabled/*;\n}\n");
        write(&dir, "conf.d/a.conf", "server { listen 80; }\n");
        write(&dir, "conf.d/b.conf", "server { listen 81; include snippets/x.conf; }\n");
        write(&dir, "snippets/x.conf", "add_header X 1;\n");
        write(&dir, "sites-enabled/site", "server { listen 82; }\n");

        let store = open(&dir);
        let paths: Vec<String> = store
            .paths()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            paths,
            vec!["conf.d/a.conf", "conf.d/b.conf", "nginx.conf", "sites-enabled/site", "snippets/x.conf"]
        );
        assert!(store.is_included(&dir.path().join("snippets/x.conf")));
    }

    #[test]
    fn test_missing_include_and_broken_file_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "nginx.conf", "include missing/*.conf;\ninclude broken.conf;\ninclude good.conf;\n");
        write(&dir, "broken.conf", "server {\n");
        write(&dir, "good.conf", "server { }\n");

        let store = open(&dir);
        assert!(store.contains(&dir.path().join("good.conf")));
        assert!(!store.contains(&dir.path().join("broken.conf")));
    }

    #[test]
    fn test_self_include_terminates() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "nginx.conf", "include nginx.conf;\ninclude *.conf;\n");
        let store = open(&dir);
        assert_eq!(store.files().count(), 1);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(&dir, "nginx.conf", "include a.conf;\n");
        let a = write(&dir, "a.conf", "server { listen 80; }\n");

        let mut store = open(&dir);
        let before = store.get(&a).cloned();

        // Change the file on disk; a plain re-parse must not pick it up
        fs::write(&a, "server { listen 81; }\n").unwrap();
        assert!(store.parse_files_by_path("a.conf", false).is_empty());
        store.parse_recursively(&root.to_string_lossy());
        assert_eq!(store.get(&a).cloned(), before);

        assert_eq!(store.parse_files_by_path("a.conf", true), vec![a.clone()]);
        assert_ne!(store.get(&a).cloned(), before);
    }

    #[test]
    fn test_dump_writes_only_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "nginx.conf", "include a.conf;\ninclude b.conf;\n");
        let a = write(&dir, "a.conf", "server {\n    listen 80;\n}\n");
        let b = write(&dir, "b.conf", "server { }\n");

        let mut store = open(&dir);
        let config = store.get_mut(&a).unwrap();
        config.trailing.push_str("# edited\n");
        store.mark_changed(&a);
        // Unsaved edit to b without marking it
        store.get_mut(&b).unwrap().trailing.push_str("# lost\n");

        assert_eq!(store.dump().unwrap(), vec![a.clone()]);
        assert_eq!(fs::read_to_string(&a).unwrap(), "server {\n    listen 80;\n}\n# edited\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "server { }\n");
        assert!(store.changed_files().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_host_root_files_are_not_included() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "nginx.conf", "include sites-enabled/*;\n");
        write(&dir, "sites-available/a.conf", "server { }\n");
        write(&dir, "sites-available/b.conf", "server { }\n");
        fs::create_dir_all(dir.path().join("sites-enabled")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("sites-available/a.conf"),
            dir.path().join("sites-enabled/a.conf"),
        )
        .unwrap();

        let mut settings = Settings::nginx(dir.path());
        settings.host_root = Some(PathBuf::from("sites-available"));
        let store = ConfigStore::open(settings).unwrap();

        assert_eq!(store.files().count(), 4);
        assert!(store.is_included(&dir.path().join("sites-available/a.conf")));
        assert!(!store.is_included(&dir.path().join("sites-available/b.conf")));
    }
}
