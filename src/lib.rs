//! kextcache - locate exact kernel extension binaries for remote kernel debugging
//!
//! Two mechanisms:
//! - A per-session index of kext bundles found in Xcode SDKs and KDKs,
//!   resolved by bundle identifier and verified by build UUID.
//! - A persistent cache for modules fetched from remote targets, with a
//!   per-host mirror view and a non-owning registry of live images.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod error;
pub mod module;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ModuleCache;
pub use config::{SearchConfig, SessionConfig, SessionKind};
pub use error::ModuleError;
pub use module::{ContentFingerprint, LoadedModule, ModuleIdentity};
pub use session::{KernelSession, SessionStatus};
