//! Bundle module - local kext discovery and resolution
//!
//! Builds the per-session index of kext bundles found in Xcode SDKs, KDKs
//! and the host's extension directories, and resolves requests against it.

pub mod indexer;
pub mod inspect;
pub mod resolver;
pub mod roots;

pub use indexer::{BundleDescriptor, BundleIndex, BundleIndexer};
pub use inspect::{BundleInspector, InfoPlistInspector};
pub use resolver::IdentityResolver;
pub use roots::{RootKind, SearchRoot, SearchRootBuilder};
