//! Lossless syntax tree
//!
//! Every node keeps the exact text that surrounded it in the source:
//! whitespace, newlines and comments inside a statement live in the
//! `prefix` of the following value or in the text before the terminator,
//! and whitespace between statements lives in the `leading` text of the
//! following entry. Dumping an untouched tree reproduces the source.

use crate::parser::lexer::{is_bare_value, Location};
use std::path::{Path, PathBuf};

/// One parsed configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub path: PathBuf,
    pub entries: Vec<Entry>,
    /// Text after the last entry
    pub trailing: String,
}

impl Config {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

/// A node of the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Whitespace and newlines before the entry
    pub leading: String,
    pub kind: EntryKind,
    /// Text written right after the entry, only set on synthesized entries
    pub trailing: String,
    /// Source location of the entry's first token; `None` when synthesized
    pub position: Option<Location>,
}

/// What an entry is
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    /// `# ...`, including the hash
    Comment(String),
    Directive(Directive),
    Block(BlockDirective),
}

/// `name value ... ;`
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub values: Vec<Value>,
    /// Text between the last value and the terminator
    pub before_end: String,
    /// `false` when the statement was ended by the enclosing `}`
    pub terminated: bool,
}

/// `name param ... { entries }`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDirective {
    pub name: String,
    pub params: Vec<Value>,
    /// Text between the last parameter and `{`
    pub before_open: String,
    pub entries: Vec<Entry>,
    /// Text between the last child and `}`
    pub before_close: String,
}

/// One argument of a statement
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Whitespace and comments before the value
    pub prefix: String,
    /// Literal text, quotes included
    pub raw: String,
}

// ============================================================
// Values
// ============================================================

impl Value {
    /// A value separated by one space, quoted when the text needs it
    pub fn new(text: &str) -> Self {
        Self {
            prefix: " ".to_string(),
            raw: quote(text),
        }
    }

    /// Whether the raw text is wrapped in quotes
    pub fn is_quoted(&self) -> bool {
        is_wrapped(&self.raw, '"') || is_wrapped(&self.raw, '\'')
    }

    /// Interpreted text: quotes stripped and escapes resolved
    pub fn text(&self) -> String {
        for quote in ['"', '\''] {
            if is_wrapped(&self.raw, quote) {
                return unescape(&self.raw[1..self.raw.len() - 1]);
            }
        }
        self.raw.clone()
    }
}

fn is_wrapped(raw: &str, quote: char) -> bool {
    raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote)
}

/// Quote `text` unless it lexes as a single bare value
pub fn quote(text: &str) -> String {
    if is_bare_value(text) {
        return text.to_string();
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(c @ ('"' | '\'' | '\\')) => result.push(c),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

// ============================================================
// Entries
// ============================================================

impl Entry {
    /// A synthesized directive with no decoration
    pub fn directive(name: &str, values: &[String]) -> Self {
        Self::synthesized(EntryKind::Directive(Directive {
            name: name.to_string(),
            values: values.iter().map(|v| Value::new(v)).collect(),
            before_end: String::new(),
            terminated: true,
        }))
    }

    /// A synthesized block
    pub fn block(name: &str, params: &[String], entries: Vec<Entry>) -> Self {
        Self::synthesized(EntryKind::Block(BlockDirective {
            name: name.to_string(),
            params: params.iter().map(|v| Value::new(v)).collect(),
            before_open: " ".to_string(),
            entries,
            before_close: "\n".to_string(),
        }))
    }

    /// A synthesized comment; `text` must start with `#`
    pub fn comment(text: &str) -> Self {
        Self::synthesized(EntryKind::Comment(text.to_string()))
    }

    fn synthesized(kind: EntryKind) -> Self {
        Self {
            leading: String::new(),
            kind,
            trailing: String::new(),
            position: None,
        }
    }

    /// Directive or block name
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Directive(d) => Some(&d.name),
            EntryKind::Block(b) => Some(&b.name),
            EntryKind::Comment(_) => None,
        }
    }

    /// Case-insensitive name check
    pub fn is_named(&self, name: &str) -> bool {
        self.name().is_some_and(|n| n.eq_ignore_ascii_case(name))
    }

    /// Directive values or block parameters
    pub fn values(&self) -> &[Value] {
        match &self.kind {
            EntryKind::Directive(d) => &d.values,
            EntryKind::Block(b) => &b.params,
            EntryKind::Comment(_) => &[],
        }
    }

    /// Interpreted texts of [`Entry::values`]
    pub fn value_texts(&self) -> Vec<String> {
        self.values().iter().map(Value::text).collect()
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, EntryKind::Comment(_))
    }

    pub fn as_directive(&self) -> Option<&Directive> {
        match &self.kind {
            EntryKind::Directive(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_directive_mut(&mut self) -> Option<&mut Directive> {
        match &mut self.kind {
            EntryKind::Directive(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockDirective> {
        match &self.kind {
            EntryKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockDirective> {
        match &mut self.kind {
            EntryKind::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Indentation of the entry when it starts on its own line
    pub fn indent(&self) -> Option<&str> {
        self.leading.rfind('\n').map(|i| &self.leading[i + 1..])
    }

    /// 1-based source line, if the entry came from a file
    pub fn line(&self) -> Option<usize> {
        self.position.map(|p| p.line)
    }
}

impl Directive {
    pub fn value_texts(&self) -> Vec<String> {
        self.values.iter().map(Value::text).collect()
    }

    pub fn first_value(&self) -> Option<String> {
        self.values.first().map(Value::text)
    }

    /// Replace the values, keeping the spacing of surviving positions
    pub fn set_values(&mut self, texts: &[String]) {
        let mut values = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let mut value = Value::new(text);
            if let Some(old) = self.values.get(i) {
                value.prefix = old.prefix.clone();
            }
            values.push(value);
        }
        self.values = values;
    }
}

impl BlockDirective {
    pub fn param_texts(&self) -> Vec<String> {
        self.params.iter().map(Value::text).collect()
    }

    /// Direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.is_named(name))
    }

    /// Direct child directives with the given name
    pub fn directives_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Directive> + 'a {
        self.children_named(name).filter_map(Entry::as_directive)
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directives_named(name).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("/var/www"), "/var/www");
        assert_eq!(quote("a b"), "\"a b\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("x;y"), "\"x;y\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("https://%{HTTP_HOST}"), "https://%{HTTP_HOST}");
    }

    #[test]
    fn test_value_text() {
        let value = Value::new("a b");
        assert!(value.is_quoted());
        assert_eq!(value.text(), "a b");

        let value = Value {
            prefix: " ".to_string(),
            raw: "'it\\'s'".to_string(),
        };
        assert_eq!(value.text(), "it's");
        assert_eq!(Value::new("plain").text(), "plain");
    }

    #[test]
    fn test_set_values_keeps_spacing() {
        let mut directive = Directive {
            name: "listen".to_string(),
            values: vec![Value {
                prefix: "   ".to_string(),
                raw: "80".to_string(),
            }],
            before_end: String::new(),
            terminated: true,
        };
        directive.set_values(&["443".to_string(), "ssl".to_string()]);
        assert_eq!(directive.values[0].prefix, "   ");
        assert_eq!(directive.values[1].prefix, " ");
        assert_eq!(directive.value_texts(), vec!["443", "ssl"]);
    }

    #[test]
    fn test_indent() {
        let mut entry = Entry::directive("root", &["/srv".to_string()]);
        assert_eq!(entry.indent(), None);
        entry.leading = "\n\n    ".to_string();
        assert_eq!(entry.indent(), Some("    "));
        assert!(entry.is_named("ROOT"));
    }
}
