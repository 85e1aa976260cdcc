//! Session configuration
//!
//! Hard-coded Xcode/KDK locations live here as defaults; the CLI overrides
//! them from flags and `DEVELOPER_DIR`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kind of kernel being debugged, which decides which SDK areas are worth
/// scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    /// Constrained device (iOS-family) kernel
    Ios,
    /// Desktop (macOS) kernel
    MacOs,
    /// Could be either, probe both
    #[default]
    Unknown,
}

impl SessionKind {
    /// Classify from a target architecture name.
    ///
    /// `arm64` is ambiguous (devices and Apple silicon Macs) and stays
    /// `Unknown`.
    pub fn from_arch(arch: &str) -> Self {
        match arch {
            "x86" | "i386" | "i486" | "i686" | "x86_64" | "x86_64h" | "ppc" | "ppc64" => {
                Self::MacOs
            }
            "arm" | "thumb" => Self::Ios,
            a if (a.starts_with("armv") || a.starts_with("thumbv")) && !a.contains("64") => {
                Self::Ios
            }
            _ => Self::Unknown,
        }
    }

    pub fn includes_ios(self) -> bool {
        self != Self::MacOs
    }

    pub fn includes_macos(self) -> bool {
        self != Self::Ios
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ios => "iOS kernel debugging",
            Self::MacOs => "Mac OS X kernel debugging",
            Self::Unknown => "unknown kernel debugging",
        })
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" | "device" => Ok(Self::Ios),
            "macos" | "mac" | "desktop" => Ok(Self::MacOs),
            "unknown" | "both" => Ok(Self::Unknown),
            other => Err(format!("unknown session kind '{}'", other)),
        }
    }
}

/// Where to look for SDKs, KDKs and kext bundles
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Toolchain root; `None` falls back to [`SearchConfig::DEFAULT_DEVELOPER_DIR`]
    pub developer_dir: Option<PathBuf>,
    /// Vendor-internal KDK area
    pub internal_kdk_dir: PathBuf,
    /// Installed extensions of the desktop host
    pub system_extensions_dir: PathBuf,
    /// Maximum nesting of plugin bundles followed below a bundle root
    pub max_plugin_depth: usize,
}

impl SearchConfig {
    pub const DEFAULT_DEVELOPER_DIR: &'static str = "/Applications/Xcode.app/Contents/Developer";
    pub const DEFAULT_INTERNAL_KDK_DIR: &'static str = "/AppleInternal/Developer/KDKs";
    pub const DEFAULT_SYSTEM_EXTENSIONS_DIR: &'static str = "/System/Library/Extensions";
    pub const DEFAULT_MAX_PLUGIN_DEPTH: usize = 16;

    /// Toolchain root actually in effect
    pub fn developer_dir(&self) -> PathBuf {
        self.developer_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DEVELOPER_DIR))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            developer_dir: None,
            internal_kdk_dir: PathBuf::from(Self::DEFAULT_INTERNAL_KDK_DIR),
            system_extensions_dir: PathBuf::from(Self::DEFAULT_SYSTEM_EXTENSIONS_DIR),
            max_plugin_depth: Self::DEFAULT_MAX_PLUGIN_DEPTH,
        }
    }
}

/// Everything a [`crate::KernelSession`] needs at construction
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub kind: SessionKind,
    pub search: SearchConfig,
}
