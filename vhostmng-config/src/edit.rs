//! Directive mutations
//!
//! ✏️ Every mutation works on the parsed trees in the store, touches only
//! the entries it adds or rewrites, and marks the file changed. Nothing is
//! written to disk until [`ConfigStore::dump`].

use crate::locator::{child_blocks, Locator};
use crate::parser::Entry;
use crate::store::ConfigStore;
use vhostmng_core::{Error, Result};

const INDENT: &str = "    ";

/// A directive to add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSpec {
    pub name: String,
    pub values: Vec<String>,
    /// Put an empty line before the directive
    pub blank_line_before: bool,
    /// Put an empty line after the directive
    pub blank_line_after: bool,
}

impl DirectiveSpec {
    pub fn new(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            blank_line_before: false,
            blank_line_after: false,
        }
    }

    pub fn blank_line_before(mut self) -> Self {
        self.blank_line_before = true;
        self
    }

    pub fn blank_line_after(mut self) -> Self {
        self.blank_line_after = true;
        self
    }
}

impl ConfigStore {
    /// ✏️ Add directives as the last (or first) children under `locator`.
    ///
    /// A directive identical to an existing one is skipped. A different
    /// directive with the same name is a conflict unless the name is
    /// repeatable.
    pub fn add_directives(&mut self, locator: &Locator, directives: &[DirectiveSpec], at_top: bool) -> Result<()> {
        self.insert_directives(locator, directives, at_top, false)
    }

    /// ✏️ Replace the values of same-named directives under `locator`, or
    /// add the directive when there is none
    pub fn update_or_add_directives(
        &mut self,
        locator: &Locator,
        directives: &[DirectiveSpec],
        at_top: bool,
    ) -> Result<()> {
        self.insert_directives(locator, directives, at_top, true)
    }

    fn insert_directives(
        &mut self,
        locator: &Locator,
        directives: &[DirectiveSpec],
        at_top: bool,
        replace: bool,
    ) -> Result<()> {
        let indent = self.child_indent(locator);
        let file_root = locator.is_file_root();
        let repeatable: Vec<bool> = directives
            .iter()
            .map(|d| self.dialect().is_repeatable(&d.name))
            .collect();

        // Edits go to a copy that replaces the children only once every
        // directive was accepted
        let mut entries = self
            .entries(locator)
            .ok_or_else(|| Error::NotFound(format!("block {}", locator)))?
            .to_vec();

        let mut insert_at = if at_top { 0 } else { entries.len() };
        let mut changed = false;

        for (spec, repeatable) in directives.iter().zip(repeatable) {
            let existing: Vec<usize> = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_named(&spec.name))
                .map(|(i, _)| i)
                .collect();

            if replace && !existing.is_empty() {
                for i in existing {
                    let entry = &mut entries[i];
                    let current = entry.value_texts();
                    let Some(directive) = entry.as_directive_mut() else {
                        return Err(conflict(&spec.name, &current, &spec.values));
                    };
                    if current != spec.values {
                        directive.set_values(&spec.values);
                        changed = true;
                    }
                }
                continue;
            }

            let mut duplicate = false;
            for &i in &existing {
                let same = entries[i].as_directive().is_some() && entries[i].value_texts() == spec.values;
                if same {
                    duplicate = true;
                } else if !repeatable {
                    return Err(conflict(&spec.name, &entries[i].value_texts(), &spec.values));
                }
            }
            if duplicate {
                tracing::debug!("Directive {} {:?} already present", spec.name, spec.values);
                continue;
            }

            let mut entry = Entry::directive(&spec.name, &spec.values);
            entry.leading = if file_root && insert_at == 0 {
                String::new()
            } else {
                let blank = if spec.blank_line_before { "\n" } else { "" };
                format!("{}\n{}", blank, indent)
            };
            if spec.blank_line_after {
                entry.trailing = "\n".to_string();
            }
            if file_root && insert_at == 0 {
                if let Some(next) = entries.first_mut() {
                    if !next.leading.starts_with('\n') {
                        next.leading.insert(0, '\n');
                    }
                }
                if spec.blank_line_before {
                    entry.leading.push('\n');
                }
            }

            entries.insert(insert_at, entry);
            insert_at += 1;
            changed = true;
        }

        if changed {
            let children = self
                .entries_mut(locator)
                .ok_or_else(|| Error::NotFound(format!("block {}", locator)))?;
            *children = entries;
            self.close_on_own_line(locator);
            self.mark_changed(&locator.file);
            tracing::info!("✏️ Updated {}", locator);
        }
        Ok(())
    }

    /// Remove every direct child directive under `locator` with one of
    /// `names`. Returns how many were removed.
    pub fn remove_directives(&mut self, locator: &Locator, names: &[&str]) -> Result<usize> {
        let entries = self
            .entries_mut(locator)
            .ok_or_else(|| Error::NotFound(format!("block {}", locator)))?;

        let before = entries.len();
        entries.retain(|e| !(e.as_directive().is_some() && names.iter().any(|n| e.is_named(n))));
        let removed = before - entries.len();

        if removed > 0 {
            self.mark_changed(&locator.file);
            tracing::info!("🗑️ Removed {} directive(s) from {}", removed, locator);
        }
        Ok(removed)
    }

    /// Append a directive at the top level of a parsed file
    pub fn add_directive_to_file(&mut self, path: &std::path::Path, directive: DirectiveSpec) -> Result<()> {
        self.add_directives(&Locator::file(path), &[directive], false)
    }

    /// Append `include <pattern>` under `locator` unless an identical
    /// include is already there. Returns whether it was added.
    pub fn add_include(&mut self, locator: &Locator, pattern: &str) -> Result<bool> {
        let dialect = self.dialect();
        let name = dialect
            .include
            .first()
            .cloned()
            .ok_or_else(|| Error::Unsupported("dialect has no include directive".to_string()))?;

        let entries = self
            .entries(locator)
            .ok_or_else(|| Error::NotFound(format!("block {}", locator)))?;
        let present = entries.iter().any(|e| {
            e.as_directive().is_some()
                && dialect.is_include(e.name().unwrap_or_default())
                && e.values().first().is_some_and(|v| v.text() == pattern)
        });
        if present {
            return Ok(false);
        }

        self.add_directives(locator, &[DirectiveSpec::new(&name, &[pattern])], false)?;
        Ok(true)
    }

    /// Append an empty block under `locator` and return its locator
    pub fn add_block(&mut self, locator: &Locator, name: &str, params: &[&str]) -> Result<Locator> {
        let indent = self.child_indent(locator);
        let file_root = locator.is_file_root();
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();

        let entries = self
            .entries_mut(locator)
            .ok_or_else(|| Error::NotFound(format!("block {}", locator)))?;

        let mut entry = Entry::block(name, &params, Vec::new());
        entry.leading = if file_root && entries.is_empty() {
            String::new()
        } else {
            format!("\n{}", indent)
        };
        if let Some(block) = entry.as_block_mut() {
            block.before_close = format!("\n{}", indent);
        }
        entries.push(entry);

        let segment = child_blocks(entries)
            .into_iter()
            .map(|(segment, _)| segment)
            .last()
            .ok_or_else(|| Error::Internal("added block not found".to_string()))?;
        let added = locator.child(segment);

        self.mark_changed(&locator.file);
        Ok(added)
    }

    /// Indentation for new children under `locator`, taken from existing
    /// children when there are any, else one level deeper than the block
    fn child_indent(&self, locator: &Locator) -> String {
        if let Some(indent) = self
            .entries(locator)
            .and_then(|entries| entries.iter().find_map(|e| e.indent().map(str::to_string)))
        {
            return indent;
        }
        if locator.is_file_root() {
            return String::new();
        }

        let outer = self.block_indent(locator);
        let unit = if outer.starts_with('\t') { "\t" } else { INDENT };
        format!("{}{}", outer, unit)
    }

    /// Indentation of the line the block under `locator` opens on
    fn block_indent(&self, locator: &Locator) -> String {
        let depth = locator.segments.len().saturating_sub(1);
        let fallback = || INDENT.repeat(depth);

        let (Some(parent), Some(segment)) = (locator.parent(), locator.segments.last()) else {
            return fallback();
        };
        self.entries(&parent)
            .and_then(|entries| {
                entries
                    .iter()
                    .filter(|e| e.as_block().is_some_and(|b| b.name.eq_ignore_ascii_case(&segment.name)))
                    .nth(segment.nth.checked_sub(1)?)
            })
            .map(|entry| entry.indent().unwrap_or(&entry.leading).to_string())
            .unwrap_or_else(fallback)
    }

    /// Move a block's `}` onto its own line after children were added
    fn close_on_own_line(&mut self, locator: &Locator) {
        let indent = self.block_indent(locator);
        if let Some(block) = self.block_mut(locator) {
            if !block.before_close.contains('\n') {
                block.before_close = format!("\n{}", indent);
            }
        }
    }
}

fn conflict(name: &str, existing: &[String], requested: &[String]) -> Error {
    Error::Conflict {
        directive: name.to_string(),
        existing: existing.join(" "),
        requested: requested.join(" "),
    }
}
