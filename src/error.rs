//! Errors - Resolution and cache failure taxonomy
//!
//! Every fallible operation in the crate reports one of four kinds of failure.
//! Indexing never surfaces these; it logs and skips the offending candidate.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Module resolution and cache errors
#[derive(Error, Debug)]
pub enum ModuleError {
    /// No candidate at all, or the cache mirror is absent
    #[error("Module not found: {0}")]
    NotFound(String),

    /// A candidate was located but carries a different content fingerprint
    #[error("Fingerprint mismatch for {path}: expected {expected}, found {found}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// Metadata or binary could not be parsed
    #[error("Invalid module {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// A filesystem operation failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ModuleError {
    pub fn invalid(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for `NotFound`, the signal to fall back to a remote fetch
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
