//! Search Roots - directories worth scanning for kext bundles
//!
//! Candidates depend on the session kind: device SDKs are a waste of stat()s
//! for a desktop kernel and vice versa. Anything that does not exist as a
//! directory is silently left out.

use std::path::{Path, PathBuf};

use crate::config::{SearchConfig, SessionKind};

/// Provenance of a search root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// Directory of device SDKs (`iPhoneOS.platform/Developer/SDKs`)
    IosSdks,
    /// Directory of desktop SDKs (`MacOSX.platform/Developer/SDKs`)
    MacSdks,
    /// Vendor-internal KDK directory
    InternalKdks,
    /// Fixed platform directory holding kexts directly
    SystemExtensions,
    /// Generic symbols mirror next to the toolchain root
    Symbols,
}

impl RootKind {
    /// SDK areas hold `.sdk`/`.kdk` packages rather than kexts
    pub fn is_sdk_area(self) -> bool {
        matches!(self, Self::IosSdks | Self::MacSdks | Self::InternalKdks)
    }
}

/// A directory to scan, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub path: PathBuf,
    pub kind: RootKind,
}

/// Builds the ordered list of search roots for one indexing pass
pub struct SearchRootBuilder<'a> {
    kind: SessionKind,
    config: &'a SearchConfig,
}

impl<'a> SearchRootBuilder<'a> {
    pub fn new(kind: SessionKind, config: &'a SearchConfig) -> Self {
        Self { kind, config }
    }

    /// SDK areas first, then fixed platform roots, then the symbols mirror.
    /// No deduplication; the indexer tolerates repeated roots.
    pub fn build(&self) -> Vec<SearchRoot> {
        let developer_dir = self.config.developer_dir();
        let mut roots = Vec::new();

        if self.kind.includes_ios() {
            push_if_dir(
                &mut roots,
                developer_dir.join("Platforms/iPhoneOS.platform/Developer/SDKs"),
                RootKind::IosSdks,
            );
        }
        if self.kind.includes_macos() {
            push_if_dir(
                &mut roots,
                developer_dir.join("Platforms/MacOSX.platform/Developer/SDKs"),
                RootKind::MacSdks,
            );
        }
        push_if_dir(
            &mut roots,
            self.config.internal_kdk_dir.clone(),
            RootKind::InternalKdks,
        );

        // Device kernels have no fixed on-host extension directory
        if self.kind.includes_macos() {
            push_if_dir(
                &mut roots,
                self.config.system_extensions_dir.clone(),
                RootKind::SystemExtensions,
            );
        }

        push_if_dir(&mut roots, symbols_dir(&developer_dir), RootKind::Symbols);

        log::debug!("{} search roots for {}", roots.len(), self.kind);
        roots
    }
}

/// `<developer dir>/../Symbols`
fn symbols_dir(developer_dir: &Path) -> PathBuf {
    match developer_dir.parent() {
        Some(parent) => parent.join("Symbols"),
        None => developer_dir.join("../Symbols"),
    }
}

fn push_if_dir(roots: &mut Vec<SearchRoot>, path: PathBuf, kind: RootKind) {
    if path.is_dir() {
        roots.push(SearchRoot { path, kind });
    } else {
        log::trace!("Search root {} not present", path.display());
    }
}
