//! Identity Resolver - picks the indexed bundle whose binary matches a
//! requested fingerprint

use std::path::Path;

use super::indexer::BundleIndex;
use super::inspect::BundleInspector;
use crate::error::ModuleError;
use crate::module::{ContentFingerprint, LoadedModule, ModuleLoader};

/// Resolves (identifier, fingerprint) requests against a [`BundleIndex`]
pub struct IdentityResolver<'a> {
    index: &'a BundleIndex,
    inspector: &'a dyn BundleInspector,
    loader: &'a dyn ModuleLoader,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(
        index: &'a BundleIndex,
        inspector: &'a dyn BundleInspector,
        loader: &'a dyn ModuleLoader,
    ) -> Self {
        Self {
            index,
            inspector,
            loader,
        }
    }

    /// Load the first candidate whose binary carries `expected`.
    ///
    /// Without an expected fingerprint the first loadable candidate wins.
    /// Candidates that fail to resolve or load are skipped. A request whose
    /// identifier is known but whose fingerprint matches nothing is still
    /// `NotFound`.
    pub fn resolve(
        &self,
        requested: &Path,
        expected: Option<&ContentFingerprint>,
    ) -> Result<LoadedModule, ModuleError> {
        let identifier = self.identifier_for(requested).ok_or_else(|| {
            ModuleError::NotFound(format!("no kext indexed as {}", requested.display()))
        })?;

        let mut rejected = 0usize;
        for bundle in self.index.candidates(identifier) {
            let exe = match self.inspector.primary_executable(&bundle.path) {
                Ok(exe) => exe,
                Err(e) => {
                    log::debug!("Skipping {}: {}", bundle.path.display(), e);
                    continue;
                }
            };

            let module = match self.loader.load(&exe, expected) {
                Ok(module) => module,
                Err(e) => {
                    log::debug!("Skipping {}: {}", exe.display(), e);
                    continue;
                }
            };

            match expected {
                Some(fp) if !module.matches(fp) => {
                    log::debug!(
                        "Skipping {}: fingerprint {} does not match",
                        exe.display(),
                        module
                            .fingerprint()
                            .map_or_else(|| "<none>".to_string(), |f| f.to_string())
                    );
                    rejected += 1;
                }
                _ => {
                    log::info!("Resolved {} to {}", identifier, exe.display());
                    return Ok(module);
                }
            }
        }

        let wanted = expected.map_or_else(|| "any build".to_string(), |fp| fp.to_string());
        Err(ModuleError::NotFound(format!(
            "{} ({}): {} candidate(s) with a different fingerprint",
            identifier, wanted, rejected
        )))
    }

    /// The index is keyed by bundle identifier; callers pass either the
    /// identifier itself or a path ending in it.
    fn identifier_for<'p>(&self, requested: &'p Path) -> Option<&'p str> {
        let full = requested.to_str()?;
        if self.index.contains(full) {
            return Some(full);
        }
        requested
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| self.index.contains(name))
    }
}
