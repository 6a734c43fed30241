//! Directive search
//!
//! 🔍 Finds directives across the include graph. Conditional blocks
//! (`ifmodule`, `ifdefine`) are evaluated against the runtime facts when
//! asked to, so directives the server would ignore can be left out.

use crate::locator::{child_blocks, Locator};
use crate::parser::{BlockDirective, Entry, EntryKind};
use crate::store::ConfigStore;
use std::collections::BTreeSet;
use std::path::PathBuf;
use vhostmng_core::{Dialect, RuntimeFacts};

/// What a conditional block tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    Module,
    Define,
}

/// A conditional block's test, e.g. `ifmodule !ssl_module`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub kind: GuardKind,
    pub name: String,
    pub negated: bool,
}

impl Guard {
    /// The guard of `block`, if it is a conditional block with a parameter
    pub fn from_block(block: &BlockDirective, dialect: &Dialect) -> Option<Self> {
        let kind = if block.name.eq_ignore_ascii_case(&dialect.module_guard) {
            GuardKind::Module
        } else if block.name.eq_ignore_ascii_case(&dialect.define_guard) {
            GuardKind::Define
        } else {
            return None;
        };

        let expr = block.params.first()?.text();
        let (negated, name) = match expr.strip_prefix('!') {
            Some(rest) => (true, rest.to_string()),
            None => (false, expr),
        };

        Some(Self { kind, name, negated })
    }

    /// Whether the guarded content is active
    pub fn passes(&self, facts: &RuntimeFacts) -> bool {
        let present = match self.kind {
            GuardKind::Module => {
                facts.has_module(&self.name)
                    || module_alias(&self.name).is_some_and(|alias| facts.has_module(&alias))
            }
            GuardKind::Define => facts.has_define(&self.name),
        };
        present != self.negated
    }
}

/// `mod_ssl.c` <-> `ssl_module`
pub(crate) fn module_alias(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_prefix("mod_").and_then(|n| n.strip_suffix(".c")) {
        return Some(format!("{}_module", stem));
    }
    name.strip_suffix("_module").map(|stem| format!("mod_{}.c", stem))
}

/// Whether the block at `locator` and all blocks around it pass their guards
pub fn is_active(store: &ConfigStore, locator: &Locator, facts: &RuntimeFacts) -> bool {
    let Some(config) = store.get(&locator.file) else {
        return false;
    };
    let Some(chain) = locator.resolve_chain(&config.entries) else {
        return false;
    };
    chain
        .iter()
        .filter_map(|block| Guard::from_block(block, store.dialect()))
        .all(|guard| guard.passes(facts))
}

/// A directive found by [`find_directives`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveMatch {
    /// Block (or file top level) holding the directive
    pub parent: Locator,
    /// Position among the parent's entries
    pub index: usize,
    pub name: String,
    pub values: Vec<String>,
}

impl DirectiveMatch {
    pub fn file(&self) -> &PathBuf {
        &self.parent.file
    }

    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// 🔍 Find every directive called `name` under `start` (default: the root
/// configuration), following includes in order.
///
/// With `exclude`, directives inside conditional blocks whose guards fail
/// against the store's runtime facts are skipped, including everything
/// reached through an include inside such a block.
pub fn find_directives(
    store: &ConfigStore,
    name: &str,
    start: Option<&Locator>,
    exclude: bool,
) -> Vec<DirectiveMatch> {
    let start = start
        .cloned()
        .unwrap_or_else(|| Locator::file(store.root()));
    let facts = &store.settings().facts;

    if exclude && !start.is_file_root() && !is_active(store, &start, facts) {
        return Vec::new();
    }

    let Some(entries) = store.entries(&start) else {
        return Vec::new();
    };

    let mut search = Search {
        store,
        name,
        exclude,
        facts,
        visited: BTreeSet::from([start.file.clone()]),
        found: Vec::new(),
    };
    search.walk(&start, entries);
    search.found
}

struct Search<'a> {
    store: &'a ConfigStore,
    name: &'a str,
    exclude: bool,
    facts: &'a RuntimeFacts,
    visited: BTreeSet<PathBuf>,
    found: Vec<DirectiveMatch>,
}

impl Search<'_> {
    fn walk(&mut self, base: &Locator, entries: &[Entry]) {
        let store = self.store;
        let dialect = store.dialect();
        let mut segments = child_blocks(entries).into_iter().map(|(segment, _)| segment);

        for (index, entry) in entries.iter().enumerate() {
            match &entry.kind {
                EntryKind::Comment(_) => {}
                EntryKind::Directive(directive) => {
                    if directive.name.eq_ignore_ascii_case(self.name) {
                        self.found.push(DirectiveMatch {
                            parent: base.clone(),
                            index,
                            name: directive.name.clone(),
                            values: directive.value_texts(),
                        });
                    }
                    if dialect.is_include(&directive.name) {
                        if let Some(pattern) = directive.first_value() {
                            self.follow(&pattern);
                        }
                    }
                }
                EntryKind::Block(block) => {
                    let Some(segment) = segments.next() else { continue };
                    if self.exclude {
                        if let Some(guard) = Guard::from_block(block, dialect) {
                            if !guard.passes(self.facts) {
                                tracing::debug!("Skipping inactive block {} {:?}", block.name, guard.name);
                                continue;
                            }
                        }
                    }
                    self.walk(&base.child(segment), &block.entries);
                }
            }
        }
    }

    fn follow(&mut self, pattern: &str) {
        let store = self.store;
        for path in store.expand(pattern) {
            if !self.visited.insert(path.clone()) {
                continue;
            }
            if let Some(config) = store.get(&path) {
                self.walk(&Locator::file(&path), &config.entries);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use vhostmng_core::Settings;

    fn store_with(files: &[(&str, &str)], facts: RuntimeFacts) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let mut settings = Settings::nginx(dir.path());
        settings.facts = facts;
        let store = ConfigStore::open(settings).unwrap();
        (dir, store)
    }

    fn facts(modules: &[&str], defines: &[&str]) -> RuntimeFacts {
        RuntimeFacts {
            modules: modules.iter().map(|s| s.to_string()).collect(),
            defines: defines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_guard_parsing() {
        let dialect = Dialect::nginx();
        let config = crate::parser::parse("ifmodule !mod_ssl.c { }\nserver { }").unwrap();
        let guard = Guard::from_block(config.entries[0].as_block().unwrap(), &dialect).unwrap();
        assert_eq!(guard.kind, GuardKind::Module);
        assert_eq!(guard.name, "mod_ssl.c");
        assert!(guard.negated);
        assert!(Guard::from_block(config.entries[1].as_block().unwrap(), &dialect).is_none());

        assert!(!guard.passes(&facts(&["ssl_module"], &[])));
        assert!(guard.passes(&facts(&[], &[])));
    }

    #[test]
    fn test_module_alias() {
        assert_eq!(module_alias("mod_ssl.c").as_deref(), Some("ssl_module"));
        assert_eq!(module_alias("ssl_module").as_deref(), Some("mod_ssl.c"));
        assert_eq!(module_alias("other"), None);
    }

    #[test]
    fn test_find_follows_includes_in_order() {
        let (_dir, store) = store_with(
            &[
                ("nginx.conf", "listen 1;\ninclude ports/*.conf;\nlisten 4;\n"),
                ("ports/a.conf", "listen 2;\n"),
                ("ports/b.conf", "ifmodule x { listen 3; }\n"),
            ],
            RuntimeFacts::default(),
        );
        let values: Vec<String> = find_directives(&store, "LISTEN", None, false)
            .into_iter()
            .map(|m| m.values[0].clone())
            .collect();
        assert_eq!(values, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_find_excludes_failed_guards() {
        let files = [
            (
                "nginx.conf",
                "listen 80;\nifmodule ssl_module {\n    listen 443;\n    include extra.conf;\n}\nifdefine !NO_ALT { listen 8080; }\n",
            ),
            ("extra.conf", "listen 8443;\n"),
        ];

        let (_dir, store) = store_with(&files, facts(&[], &["NO_ALT"]));
        let values: Vec<String> = find_directives(&store, "listen", None, true)
            .into_iter()
            .map(|m| m.values[0].clone())
            .collect();
        assert_eq!(values, vec!["80"]);

        let (_dir, store) = store_with(&files, facts(&["ssl_module"], &[]));
        let values: Vec<String> = find_directives(&store, "listen", None, true)
            .into_iter()
            .map(|m| m.values[0].clone())
            .collect();
        assert_eq!(values, vec!["80", "443", "8443", "8080"]);

        // Without exclusion everything is visible
        assert_eq!(find_directives(&store, "listen", None, false).len(), 4);
    }

    #[test]
    fn test_match_locations() {
        let (_dir, store) = store_with(
            &[("nginx.conf", "http {\n  server {\n    root /a;\n  }\n}\n")],
            RuntimeFacts::default(),
        );
        let found = find_directives(&store, "root", None, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].parent.normalized_path(), "http/server");
        assert_eq!(found[0].index, 0);
        assert_eq!(found[0].first_value(), Some("/a"));
    }
}
