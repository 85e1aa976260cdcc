//! Module identity - composite key for registry lookups and cache paths

use std::fmt;
use std::path::PathBuf;

use super::fingerprint::ContentFingerprint;

/// What a caller asked for: a logical path (a file path on the remote
/// target, or a bundle identifier), optionally pinned to a fingerprint and
/// qualified by the remote host it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    /// Logical path as requested by the caller
    pub path: PathBuf,
    /// Expected content fingerprint, if known
    pub fingerprint: Option<ContentFingerprint>,
    /// Remote host the module lives on
    pub hostname: Option<String>,
}

impl ModuleIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
            hostname: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: ContentFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn on_host(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Final path component, used as the file name inside the canonical
    /// cache directory
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.hostname {
            write!(f, "{}:", host)?;
        }
        write!(f, "{}", self.path.display())?;
        if let Some(fp) = &self.fingerprint {
            write!(f, " ({})", fp)?;
        }
        Ok(())
    }
}
