//! Parse error reports
//!
//! Renders a [`ParseError`] as an annotated source excerpt.

use crate::parser::{parse_config, Config, ParseError};
use ariadne::{Config as ReportConfig, Label, Report, ReportKind, Source};
use std::path::Path;

/// Render `err` against the source it came from
pub fn render(path: &Path, source: &str, err: &ParseError) -> String {
    let name = path.display().to_string();
    let span = err.span(source.len());

    let label = match err {
        ParseError::UnclosedBlock { .. } => "block starts here",
        ParseError::UnexpectedEof { .. } => "input ends here",
        _ => "here",
    };

    let mut out = Vec::new();
    let written = Report::build(ReportKind::Error, (name.as_str(), span.clone()))
        .with_config(ReportConfig::default().with_color(false))
        .with_message(err.to_string())
        .with_label(Label::new((name.as_str(), span)).with_message(label))
        .finish()
        .write((name.as_str(), Source::from(source)), &mut out);

    match written {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => format!("{}: {}", name, err),
    }
}

/// Parse `source`, turning a failure into a rendered report
pub fn check(path: &Path, source: &str) -> Result<Config, String> {
    parse_config(path, source).map_err(|err| render(path, source, &err))
}
