//! Test fixtures: synthetic Mach-O images and kext bundles on disk

use std::fs;
use std::path::{Path, PathBuf};

use crate::module::ContentFingerprint;

/// A 16-byte fingerprint filled with `seed`
pub fn fingerprint(seed: u8) -> ContentFingerprint {
    ContentFingerprint::from_bytes(&[seed; 16]).unwrap()
}

/// Smallest 64-bit x86_64 Mach-O that goblin accepts: a header plus a
/// single LC_UUID load command.
pub fn macho_with_uuid(fp: &ContentFingerprint) -> Vec<u8> {
    let mut image = Vec::new();
    for word in [
        0xFEED_FACFu32, // MH_MAGIC_64
        0x0100_0007,    // CPU_TYPE_X86_64
        3,              // CPU_SUBTYPE_X86_64_ALL
        0xB,            // MH_KEXT_BUNDLE
        1,              // ncmds
        24,             // sizeofcmds
        0,              // flags
        0,              // reserved
        0x1B,           // LC_UUID
        24,             // cmdsize
    ] {
        image.extend_from_slice(&word.to_le_bytes());
    }
    image.extend_from_slice(fp.as_bytes());
    image
}

/// Write `<parent>/<name>.kext` with an Info.plist and a Mach-O executable
pub fn make_kext(parent: &Path, name: &str, identifier: &str, fp: &ContentFingerprint) -> PathBuf {
    let bundle = parent.join(format!("{}.kext", name));
    let macos = bundle.join("Contents/MacOS");
    fs::create_dir_all(&macos).unwrap();
    fs::write(
        bundle.join("Contents/Info.plist"),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleExecutable</key>
	<string>{name}</string>
	<key>CFBundleIdentifier</key>
	<string>{identifier}</string>
	<key>CFBundlePackageType</key>
	<string>KEXT</string>
</dict>
</plist>
"#
        ),
    )
    .unwrap();
    fs::write(macos.join(name), macho_with_uuid(fp)).unwrap();
    bundle
}
