//! Structural locators
//!
//! A [`Locator`] names a block by its file and the chain of block names
//! leading to it, each qualified by its position among same-named sibling
//! blocks (`http/server[2]`). Locators are cheap to clone and stay valid
//! until the file they point into is reparsed.

use crate::parser::{BlockDirective, Entry};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// One step of a locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    /// Lowercased block name
    pub name: String,
    /// 1-based index among sibling blocks with the same name
    pub nth: usize,
    /// The block is the only one with this name among its siblings
    pub unique: bool,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.nth)
        }
    }
}

/// Address of a block inside a parsed file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub file: PathBuf,
    pub segments: Vec<Segment>,
}

impl Locator {
    /// The top level of `file`
    pub fn file(file: impl AsRef<Path>) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            segments: Vec::new(),
        }
    }

    /// Whether the locator points at the file's top level
    pub fn is_file_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, segment: Segment) -> Self {
        let mut child = self.clone();
        child.segments.push(segment);
        child
    }

    /// Locator of the enclosing block (or file top level)
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// In-file path where a `[1]` index is the same as no index
    pub fn normalized_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| {
                if s.nth == 1 {
                    s.name.clone()
                } else {
                    format!("{}[{}]", s.name, s.nth)
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Find the block this locator points at
    pub fn resolve<'a>(&self, entries: &'a [Entry]) -> Option<&'a BlockDirective> {
        let (first, rest) = self.segments.split_first()?;
        let block = nth_block(entries, first)?;
        rest.iter()
            .try_fold(block, |block, segment| nth_block(&block.entries, segment))
    }

    /// Mutable variant of [`Locator::resolve`]
    pub fn resolve_mut<'a>(&self, entries: &'a mut [Entry]) -> Option<&'a mut BlockDirective> {
        let (first, rest) = self.segments.split_first()?;
        let mut block = nth_block_mut(entries, first)?;
        for segment in rest {
            block = nth_block_mut(&mut block.entries, segment)?;
        }
        Some(block)
    }

    /// Blocks enclosing the target, outermost first, the target included
    pub fn resolve_chain<'a>(&self, entries: &'a [Entry]) -> Option<Vec<&'a BlockDirective>> {
        let mut chain = Vec::with_capacity(self.segments.len());
        let mut current = entries;
        for segment in &self.segments {
            let block = nth_block(current, segment)?;
            chain.push(block);
            current = &block.entries;
        }
        Some(chain)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

fn nth_block<'a>(entries: &'a [Entry], segment: &Segment) -> Option<&'a BlockDirective> {
    entries
        .iter()
        .filter_map(Entry::as_block)
        .filter(|b| b.name.eq_ignore_ascii_case(&segment.name))
        .nth(segment.nth.checked_sub(1)?)
}

fn nth_block_mut<'a>(entries: &'a mut [Entry], segment: &Segment) -> Option<&'a mut BlockDirective> {
    entries
        .iter_mut()
        .filter_map(Entry::as_block_mut)
        .filter(|b| b.name.eq_ignore_ascii_case(&segment.name))
        .nth(segment.nth.checked_sub(1)?)
}

/// Segments for every block in `entries`, in order, paired with the block
pub fn child_blocks(entries: &[Entry]) -> Vec<(Segment, &BlockDirective)> {
    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for block in entries.iter().filter_map(Entry::as_block) {
        *totals.entry(block.name.to_ascii_lowercase()).or_default() += 1;
    }

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    entries
        .iter()
        .filter_map(Entry::as_block)
        .map(|block| {
            let name = block.name.to_ascii_lowercase();
            let nth = seen.entry(name.clone()).or_default();
            *nth += 1;
            let unique = totals.get(&name).copied() == Some(1);
            (Segment { name, nth: *nth, unique }, block)
        })
        .collect()
}

/// Locators of all blocks accepted by `is_target` under `base`.
///
/// Matching blocks are not descended into, so targets never nest.
pub fn find_blocks(base: &Locator, entries: &[Entry], is_target: &dyn Fn(&str) -> bool) -> Vec<Locator> {
    let mut found = Vec::new();
    for (segment, block) in child_blocks(entries) {
        let locator = base.child(segment);
        if is_target(&block.name) {
            found.push(locator);
        } else {
            found.extend(find_blocks(&locator, &block.entries, is_target));
        }
    }
    found
}

/// Locators present in `after` but not in `before`, compared by
/// [`Locator::normalized_path`]
pub fn new_locators(before: &[Locator], after: &[Locator]) -> Vec<Locator> {
    let known: BTreeSet<String> = before.iter().map(Locator::normalized_path).collect();
    after
        .iter()
        .filter(|l| !known.contains(&l.normalized_path()))
        .cloned()
        .collect()
}
