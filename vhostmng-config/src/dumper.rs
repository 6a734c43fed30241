//! Tree serializer
//!
//! Writes a [`Config`] back to text. Untouched entries come out exactly as
//! they were read.

use crate::parser::{Config, Entry, EntryKind, Value};

/// Serialize a whole file
pub fn dump(config: &Config) -> String {
    let mut out = String::new();
    write_entries(&mut out, &config.entries);
    out.push_str(&config.trailing);
    out
}

/// Serialize one entry including its leading and trailing text
pub fn dump_entry(entry: &Entry) -> String {
    let mut out = String::new();
    write_entry(&mut out, entry);
    out
}

fn write_entries(out: &mut String, entries: &[Entry]) {
    for entry in entries {
        write_entry(out, entry);
    }
}

fn write_entry(out: &mut String, entry: &Entry) {
    out.push_str(&entry.leading);

    match &entry.kind {
        EntryKind::Comment(text) => out.push_str(text),
        EntryKind::Directive(directive) => {
            out.push_str(&directive.name);
            write_values(out, &directive.values);
            out.push_str(&directive.before_end);
            if directive.terminated {
                out.push(';');
            }
        }
        EntryKind::Block(block) => {
            out.push_str(&block.name);
            write_values(out, &block.params);
            out.push_str(&block.before_open);
            out.push('{');
            write_entries(out, &block.entries);
            out.push_str(&block.before_close);
            out.push('}');
        }
    }

    out.push_str(&entry.trailing);
}

fn write_values(out: &mut String, values: &[Value]) {
    for value in values {
        out.push_str(&value.prefix);
        out.push_str(&value.raw);
    }
}
