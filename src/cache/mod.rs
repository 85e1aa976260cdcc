//! Module Cache - persistent store for modules fetched from remote targets
//!
//! Each cached module has two views under the cache root:
//! - Canonical: `<root>/.cache/<FINGERPRINT>/<file name>` holds the real bytes
//! - Mirror:    `<root>/<hostname>/<remote absolute path>` is a symlink to it
//!
//! Example:
//! ```text
//! /tmp/cache/.cache/30C94DC6-6A1F-E951-80C3-D68D2B89E576-D5AE213C/libc.so.6
//! /tmp/cache/ubuntu/lib/x86_64-linux-gnu/libc.so.6 -> (the file above)
//! ```
//!
//! Canonical files are written once, through a temporary name and an atomic
//! rename. Mirrors are conveniences and may be replaced at any time.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ModuleError;
use crate::module::{LiveModuleRegistry, LoadedModule, ModuleIdentity, ModuleLoader, ObjectFileLoader};

/// Directory under the cache root holding canonical copies
pub const CANONICAL_DIR: &str = ".cache";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Two-view on-disk module cache with an in-memory liveness front
pub struct ModuleCache {
    registry: Arc<LiveModuleRegistry>,
    loader: Arc<dyn ModuleLoader>,
}

impl ModuleCache {
    pub fn new(registry: Arc<LiveModuleRegistry>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { registry, loader }
    }

    /// Cache with its own registry and the goblin loader
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(LiveModuleRegistry::new()), Arc::new(ObjectFileLoader))
    }

    /// `<root>/.cache/<FINGERPRINT>/<file name>`
    pub fn canonical_path(root: &Path, identity: &ModuleIdentity) -> Result<PathBuf, ModuleError> {
        let fingerprint = identity.fingerprint.as_ref().ok_or_else(|| {
            ModuleError::invalid(&identity.path, "cannot cache a module without a fingerprint")
        })?;
        let file_name = identity
            .file_name()
            .ok_or_else(|| ModuleError::invalid(&identity.path, "module path has no file name"))?;

        Ok(root
            .join(CANONICAL_DIR)
            .join(fingerprint.to_string())
            .join(file_name))
    }

    /// `<root>/<hostname>/<remote absolute path>`
    pub fn mirror_path(
        root: &Path,
        hostname: &str,
        identity: &ModuleIdentity,
    ) -> Result<PathBuf, ModuleError> {
        if hostname.is_empty()
            || hostname == "."
            || hostname == ".."
            || hostname == CANONICAL_DIR
            || hostname.contains(['/', '\\'])
        {
            return Err(ModuleError::invalid(
                &identity.path,
                format!("unusable hostname '{}'", hostname),
            ));
        }

        let mut mirror = root.join(hostname);
        for component in identity.path.components() {
            match component {
                Component::Normal(part) => mirror.push(part),
                Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ModuleError::invalid(
                        &identity.path,
                        "module path may not contain '..'",
                    ))
                }
            }
        }
        Ok(mirror)
    }

    /// Commit `source` (already holding the module's bytes) to the cache and
    /// point the host mirror at it. A second put of the same fingerprint only
    /// refreshes the mirror.
    pub fn put(
        &self,
        root: &Path,
        hostname: &str,
        identity: &ModuleIdentity,
        source: &Path,
    ) -> Result<(), ModuleError> {
        let canonical = Self::canonical_path(root, identity)?;
        let mirror = Self::mirror_path(root, hostname, identity)?;

        if canonical.is_file() {
            log::debug!("{} already cached at {}", identity, canonical.display());
        } else {
            create_parent(&canonical)?;
            write_atomically(source, &canonical)?;
            log::info!("Cached {} at {}", identity, canonical.display());
        }

        create_parent(&mirror)?;
        link_atomically(&canonical, &mirror)
    }

    /// Return the module for `identity`: a live instance if one is still
    /// held, else whatever the host mirror points at. `NotFound` means the
    /// caller should fetch and [`ModuleCache::put`].
    pub fn get(
        &self,
        root: &Path,
        hostname: &str,
        identity: &ModuleIdentity,
    ) -> Result<Arc<LoadedModule>, ModuleError> {
        let key = identity.clone().on_host(hostname);
        if let Some(module) = self.registry.lookup(&key) {
            log::debug!("Live hit for {}", key);
            return Ok(module);
        }

        let mirror = Self::mirror_path(root, hostname, identity)?;
        if !mirror.exists() {
            log::debug!("Cache miss for {}: {} absent", key, mirror.display());
            return Err(ModuleError::NotFound(format!(
                "{} is not cached at {}",
                key,
                mirror.display()
            )));
        }

        let module = self
            .loader
            .load(&mirror, identity.fingerprint.as_ref())
            .map_err(|e| ModuleError::invalid(&mirror, e.to_string()))?;

        if let Some(expected) = &identity.fingerprint {
            if !module.matches(expected) {
                return Err(ModuleError::Mismatch {
                    path: mirror,
                    expected: expected.to_string(),
                    found: module
                        .fingerprint()
                        .map_or_else(|| "<none>".to_string(), |fp| fp.to_string()),
                });
            }
        }

        let module = Arc::new(module);
        self.registry.register(key, &module);
        Ok(module)
    }

    /// [`ModuleCache::get`], filling a miss by calling `fetch` with a scratch
    /// path to download into, then committing the result.
    pub fn get_or_fetch<F>(
        &self,
        root: &Path,
        hostname: &str,
        identity: &ModuleIdentity,
        fetch: F,
    ) -> Result<Arc<LoadedModule>, ModuleError>
    where
        F: FnOnce(&Path) -> Result<(), ModuleError>,
    {
        match self.get(root, hostname, identity) {
            Err(ModuleError::NotFound(_)) => {}
            found => return found,
        }

        let staging = temp_sibling(&Self::canonical_path(root, identity)?);
        create_parent(&staging)?;
        log::info!("Fetching {} into {}", identity, staging.display());

        let committed = fetch(&staging).and_then(|()| self.put(root, hostname, identity, &staging));
        // Best effort; a leftover scratch file never shadows a canonical one
        let _ = fs::remove_file(&staging);
        committed?;

        self.get(root, hostname, identity)
    }
}

fn create_parent(path: &Path) -> Result<(), ModuleError> {
    match path.parent() {
        // create_dir_all treats a concurrent creator as success
        Some(parent) => fs::create_dir_all(parent).map_err(|e| ModuleError::io(parent, e)),
        None => Ok(()),
    }
}

/// Hidden, process-unique name next to `path`
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), unique))
}

/// Copy `source` to `dest` so that readers see either nothing or all of it
fn write_atomically(source: &Path, dest: &Path) -> Result<(), ModuleError> {
    let tmp = temp_sibling(dest);

    let written = fs::copy(source, &tmp)
        .map_err(|e| ModuleError::io(source, e))
        .and_then(|_| {
            OpenOptions::new()
                .write(true)
                .open(&tmp)
                .and_then(|file| file.sync_all())
                .map_err(|e| ModuleError::io(&tmp, e))
        })
        .and_then(|()| fs::rename(&tmp, dest).map_err(|e| ModuleError::io(dest, e)));

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// (Re)point `link` at `target`, replacing whatever was there in one rename
fn link_atomically(target: &Path, link: &Path) -> Result<(), ModuleError> {
    let target = fs::canonicalize(target).map_err(|e| ModuleError::io(target, e))?;
    let tmp = temp_sibling(link);

    symlink_file(&target, &tmp).map_err(|e| ModuleError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, link) {
        let _ = fs::remove_file(&tmp);
        return Err(ModuleError::io(link, e));
    }

    log::debug!("Mirror {} -> {}", link.display(), target.display());
    Ok(())
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
