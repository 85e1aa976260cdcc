//! Module - loaded binary images and how they are identified
//!
//! Contains the fingerprint type, the composite identity key, the goblin-based
//! loader and the non-owning registry of live images.

pub mod fingerprint;
pub mod identity;
pub mod loader;
pub mod registry;

pub use fingerprint::ContentFingerprint;
pub use identity::ModuleIdentity;
pub use loader::{LoadedModule, ModuleLoader, ObjectFileLoader};
pub use registry::LiveModuleRegistry;
