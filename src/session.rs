//! Kernel Session - per-debug-session resolution context
//!
//! Indexes local kexts once at construction, then answers module requests
//! from live instances, the index, or the remote module cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bundle::{
    BundleIndex, BundleIndexer, BundleInspector, IdentityResolver, InfoPlistInspector,
    SearchRootBuilder,
};
use crate::cache::ModuleCache;
use crate::config::{SessionConfig, SessionKind};
use crate::error::ModuleError;
use crate::module::{
    ContentFingerprint, LiveModuleRegistry, LoadedModule, ModuleIdentity, ModuleLoader,
    ObjectFileLoader,
};

/// Everything needed to resolve modules for one kernel debug session
pub struct KernelSession {
    kind: SessionKind,
    index: BundleIndex,
    registry: Arc<LiveModuleRegistry>,
    inspector: Arc<dyn BundleInspector>,
    loader: Arc<dyn ModuleLoader>,
    cache: ModuleCache,
}

impl KernelSession {
    /// Session using Info.plist inspection and the goblin loader
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_services(
            config,
            Arc::new(InfoPlistInspector),
            Arc::new(ObjectFileLoader),
        )
    }

    /// Build the search roots and the kext index, synchronously
    pub fn with_services(
        config: &SessionConfig,
        inspector: Arc<dyn BundleInspector>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        log::info!("Starting session: {}", config.kind);

        let roots = SearchRootBuilder::new(config.kind, &config.search).build();
        let index = BundleIndexer::new(inspector.as_ref(), config.search.max_plugin_depth)
            .build(&roots);

        let registry = Arc::new(LiveModuleRegistry::new());
        let cache = ModuleCache::new(Arc::clone(&registry), Arc::clone(&loader));

        Self {
            kind: config.kind,
            index,
            registry,
            inspector,
            loader,
            cache,
        }
    }

    /// Find the indexed kext `requested` (a bundle identifier) built as
    /// `expected`. Live instances are returned without touching disk.
    pub fn resolve(
        &self,
        requested: &Path,
        expected: Option<&ContentFingerprint>,
    ) -> Result<Arc<LoadedModule>, ModuleError> {
        let mut identity = ModuleIdentity::new(requested);
        identity.fingerprint = expected.cloned();

        if let Some(module) = self.registry.lookup(&identity) {
            log::debug!("Live hit for {}", identity);
            return Ok(module);
        }

        let module = IdentityResolver::new(&self.index, self.inspector.as_ref(), self.loader.as_ref())
            .resolve(requested, expected)?;

        let module = Arc::new(module);
        self.registry.register(identity, &module);
        Ok(module)
    }

    /// Remote module cache sharing this session's live registry
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    pub fn index(&self) -> &BundleIndex {
        &self.index
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Snapshot for status reporting
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            kind: self.kind(),
            roots_scanned: self.index.roots_scanned().to_vec(),
            indexed: self.index.len(),
        }
    }
}

/// Diagnostics: what was scanned and how much was found
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub kind: SessionKind,
    pub roots_scanned: Vec<PathBuf>,
    pub indexed: usize,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " Debug session type: {}", self.kind)?;
        for (i, root) in self.roots_scanned.iter().enumerate() {
            writeln!(f, " KDK Roots: [{:2}] \"{}\"", i, root.display())?;
        }
        writeln!(f, " Total number of kexts indexed: {}", self.indexed)
    }
}
