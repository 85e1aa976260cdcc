//! Bundle Indexer - discovers kext bundles and indexes them by identifier
//!
//! Discovery runs in two stages:
//! 1. SDK areas are expanded: every `*.sdk` / `*.kdk` package inside one
//!    contributes its `System/Library/Extensions` directory as a bundle root.
//! 2. Every bundle root is scanned for `*.kext` directories, descending into
//!    each kext's `Contents/PlugIns` (or flat `PlugIns`) directory.
//!
//! Every step is best-effort: an unreadable directory or a bundle without
//! usable metadata contributes nothing and the scan moves on.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::inspect::BundleInspector;
use super::roots::SearchRoot;

/// Extension marking a kernel extension bundle
pub const BUNDLE_EXTENSION: &str = "kext";

/// Extensions marking SDK / KDK packages inside an SDK area
const SDK_EXTENSIONS: [&str; 2] = ["sdk", "kdk"];

/// Where an SDK package keeps its kexts
const SDK_KEXT_SUBDIR: &str = "System/Library/Extensions";

/// Nested plugin areas, in order of preference
const PLUGIN_SUBDIRS: [&str; 2] = ["Contents/PlugIns", "PlugIns"];

/// A directory believed to be a kext bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub path: PathBuf,
}

/// Identifier -> bundles, built once per session and read-only afterwards.
///
/// Identifiers are not unique across builds, so every key maps to all
/// bundles carrying it, in discovery order.
#[derive(Debug, Default)]
pub struct BundleIndex {
    by_identifier: HashMap<String, Vec<BundleDescriptor>>,
    roots_scanned: Vec<PathBuf>,
    len: usize,
}

impl BundleIndex {
    fn insert(&mut self, identifier: String, bundle: BundleDescriptor) {
        self.by_identifier.entry(identifier).or_default().push(bundle);
        self.len += 1;
    }

    /// All bundles indexed under `identifier`, possibly none
    pub fn candidates(&self, identifier: &str) -> &[BundleDescriptor] {
        self.by_identifier
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.by_identifier.contains_key(identifier)
    }

    /// Total number of indexed bundles (not distinct identifiers)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bundle roots actually scanned, in scan order
    pub fn roots_scanned(&self) -> &[PathBuf] {
        &self.roots_scanned
    }
}

/// One directory being enumerated during discovery
struct Frame {
    children: std::vec::IntoIter<PathBuf>,
    depth: usize,
}

/// Walks search roots and builds a [`BundleIndex`]
pub struct BundleIndexer<'a> {
    inspector: &'a dyn BundleInspector,
    max_depth: usize,
}

impl<'a> BundleIndexer<'a> {
    pub fn new(inspector: &'a dyn BundleInspector, max_depth: usize) -> Self {
        Self {
            inspector,
            max_depth,
        }
    }

    /// Scan `roots` and index every bundle whose identifier can be read
    pub fn build(&self, roots: &[SearchRoot]) -> BundleIndex {
        let bundle_roots = expand_sdk_areas(roots);
        log::info!("Indexing kexts in {} directories", bundle_roots.len());

        let bundles = self.discover(&bundle_roots);
        let mut index = BundleIndex {
            roots_scanned: bundle_roots,
            ..BundleIndex::default()
        };

        for bundle in bundles {
            match self.inspector.identifier(&bundle.path) {
                Ok(identifier) => {
                    log::trace!("{} -> {}", identifier, bundle.path.display());
                    index.insert(identifier, bundle);
                }
                Err(e) => log::debug!("Not indexing {}: {}", bundle.path.display(), e),
            }
        }

        log::info!(
            "Indexed {} kexts under {} identifiers",
            index.len(),
            index.by_identifier.len()
        );
        index
    }

    /// Depth-first discovery in directory order. A bundle is recorded before
    /// its plugins, and its plugins before its next sibling.
    fn discover(&self, bundle_roots: &[PathBuf]) -> Vec<BundleDescriptor> {
        let mut found = Vec::new();
        let mut seen_bundles = HashSet::new();
        let mut visited_dirs = HashSet::new();

        for root in bundle_roots {
            let mut stack: Vec<Frame> = open_dir(root, 0, &mut visited_dirs).into_iter().collect();

            while let Some(frame) = stack.last_mut() {
                let depth = frame.depth;
                let Some(child) = frame.children.next() else {
                    stack.pop();
                    continue;
                };

                if !has_extension(&child, &[BUNDLE_EXTENSION]) {
                    continue;
                }
                if !seen_bundles.insert(physical_path(&child)) {
                    log::trace!("Already saw {}", child.display());
                    continue;
                }

                let plugins = plugin_area(&child);
                found.push(BundleDescriptor { path: child });

                let Some(plugins) = plugins else { continue };
                if depth >= self.max_depth {
                    log::warn!(
                        "Not descending into {}: nesting deeper than {}",
                        plugins.display(),
                        self.max_depth
                    );
                    continue;
                }
                stack.extend(open_dir(&plugins, depth + 1, &mut visited_dirs));
            }
        }

        found
    }
}

/// Stage 1: SDK areas become their packages' extension directories; every
/// other root is scanned as-is, after them.
fn expand_sdk_areas(roots: &[SearchRoot]) -> Vec<PathBuf> {
    let mut bundle_roots = Vec::new();

    for root in roots.iter().filter(|r| r.kind.is_sdk_area()) {
        let Some(packages) = subdirectories(&root.path) else {
            continue;
        };
        bundle_roots.extend(
            packages
                .into_iter()
                .filter(|p| has_extension(p, &SDK_EXTENSIONS))
                .map(|p| p.join(SDK_KEXT_SUBDIR))
                .filter(|dir| dir.is_dir()),
        );
    }

    bundle_roots.extend(
        roots
            .iter()
            .filter(|r| !r.kind.is_sdk_area())
            .map(|r| r.path.clone()),
    );
    bundle_roots
}

/// Enumerate `dir` unless its physical directory was already enumerated
fn open_dir(dir: &Path, depth: usize, visited: &mut HashSet<PathBuf>) -> Option<Frame> {
    if !visited.insert(physical_path(dir)) {
        log::debug!("Skipping {}: directory already scanned", dir.display());
        return None;
    }
    let children = subdirectories(dir)?;
    Some(Frame {
        children: children.into_iter(),
        depth,
    })
}

/// Immediate subdirectories of `dir`, sorted by name. Symlinked entries are
/// followed. `None` if the directory cannot be read.
fn subdirectories(dir: &Path) -> Option<Vec<PathBuf>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut dirs = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => {
                log::debug!("Cannot enumerate {}: {}", dir.display(), e);
                return None;
            }
            Err(e) => log::debug!("Skipping entry under {}: {}", dir.display(), e),
        }
    }
    Some(dirs)
}

fn plugin_area(bundle: &Path) -> Option<PathBuf> {
    PLUGIN_SUBDIRS
        .iter()
        .map(|sub| bundle.join(sub))
        .find(|dir| dir.is_dir())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

/// Resolved location of a directory, so symlinked aliases compare equal
fn physical_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
