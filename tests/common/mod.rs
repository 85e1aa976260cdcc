//! Shared fixtures for integration tests

use std::fs;
use std::path::{Path, PathBuf};

use kextcache::ContentFingerprint;

pub fn fingerprint(seed: u8) -> ContentFingerprint {
    ContentFingerprint::from_bytes(&[seed; 16]).unwrap()
}

/// x86_64 Mach-O header followed by one LC_UUID command
pub fn macho_with_uuid(fp: &ContentFingerprint) -> Vec<u8> {
    let mut image = Vec::new();
    for word in [0xFEED_FACFu32, 0x0100_0007, 3, 0xB, 1, 24, 0, 0, 0x1B, 24] {
        image.extend_from_slice(&word.to_le_bytes());
    }
    image.extend_from_slice(fp.as_bytes());
    image
}

pub fn make_kext(parent: &Path, name: &str, identifier: &str, fp: &ContentFingerprint) -> PathBuf {
    let bundle = parent.join(format!("{}.kext", name));
    fs::create_dir_all(bundle.join("Contents/MacOS")).unwrap();
    fs::write(
        bundle.join("Contents/Info.plist"),
        format!(
            "<plist version=\"1.0\"><dict>\
             <key>CFBundleExecutable</key><string>{}</string>\
             <key>CFBundleIdentifier</key><string>{}</string>\
             </dict></plist>",
            name, identifier
        ),
    )
    .unwrap();
    fs::write(bundle.join("Contents/MacOS").join(name), macho_with_uuid(fp)).unwrap();
    bundle
}
