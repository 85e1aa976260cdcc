//! Content fingerprints (build UUIDs)

use std::fmt;
use std::str::FromStr;

use crate::error::ModuleError;

/// Opaque build identity used as the sole criterion for "same binary".
///
/// Usually 16 bytes (Mach-O `LC_UUID`, PE CodeView GUID) but GNU build-ids
/// are commonly 20 bytes, so the length is not fixed at the type level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentFingerprint(Vec<u8>);

impl ContentFingerprint {
    /// Longest fingerprint we accept (SHA-1 sized build-id)
    pub const MAX_LEN: usize = 20;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > Self::MAX_LEN || bytes.iter().all(|b| *b == 0) {
            return None;
        }
        Some(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.0.len() - 1;
        for (i, byte) in self.0.iter().enumerate() {
            write!(f, "{}", hex::encode_upper([*byte]))?;
            if matches!(i, 3 | 5 | 7 | 9 | 15) && i != last {
                f.write_str("-")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ContentFingerprint {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&digits)
            .map_err(|e| ModuleError::invalid(s, format!("bad fingerprint: {}", e)))?;
        Self::from_bytes(&bytes)
            .ok_or_else(|| ModuleError::invalid(s, "fingerprint must be 1-20 non-zero bytes"))
    }
}
