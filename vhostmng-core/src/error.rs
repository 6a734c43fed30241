//! Error types for vhostmng

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for vhostmng operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vhostmng
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration file could not be tokenized or parsed
    #[error("Parse error in {path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A non-repeatable directive already exists with different values
    #[error("Conflicting directive '{directive}': existing [{existing}], requested [{requested}]")]
    Conflict {
        directive: String,
        existing: String,
        requested: String,
    },

    /// The block written by a TLS clone could not be located unambiguously
    #[error("Cannot locate cloned host block in {path}: {candidates} candidate(s)")]
    AmbiguousClone { path: PathBuf, candidates: usize },

    /// A requested host, block or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rollback failures, or use of a closed transaction
    #[error("Transaction error: {}", .0.join("; "))]
    Transaction(Vec<String>),

    /// An operation failed and the rollback it triggered reported errors too
    #[error("{cause}; rollback failed: {rollback}")]
    Aborted {
        cause: Box<Error>,
        rollback: Box<Error>,
    },

    /// An external command exited unsuccessfully
    #[error("Command '{command}' failed: {output}")]
    Command { command: String, output: String },

    /// Settings error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested operation is not available for this dialect
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// IO error with the path it happened on
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an IO error with the path that caused it
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Append the error of a failed rollback to the error that triggered it
    pub fn with_rollback(self, rollback: Result<()>) -> Self {
        match rollback {
            Ok(()) => self,
            Err(err) => Self::Aborted {
                cause: Box::new(self),
                rollback: Box::new(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_rollback_keeps_cause() {
        let err = Error::NotFound("example.com".to_string()).with_rollback(Ok(()));
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_with_rollback_appends_failure() {
        let err = Error::Config("bad".to_string())
            .with_rollback(Err(Error::Transaction(vec!["restore a.conf".to_string()])));
        let message = err.to_string();
        assert!(message.starts_with("Configuration error: bad"));
        assert!(message.contains("restore a.conf"));
    }
}
