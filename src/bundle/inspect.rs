//! Bundle Inspector - identifier and executable from bundle metadata

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ModuleError;

static IDENTIFIER_KEY: Lazy<Regex> = Lazy::new(|| string_key_pattern("CFBundleIdentifier"));
static EXECUTABLE_KEY: Lazy<Regex> = Lazy::new(|| string_key_pattern("CFBundleExecutable"));

/// `<key>NAME</key><string>VALUE</string>`, capturing VALUE
fn string_key_pattern(key: &str) -> Regex {
    Regex::new(&format!(
        r"<key>\s*{}\s*</key>\s*<string>([^<]*)</string>",
        regex::escape(key)
    ))
    .expect("plist key pattern is a valid regex")
}

/// Metadata extraction for bundle directories
pub trait BundleInspector: Send + Sync {
    /// Human-facing identifier (`CFBundleIdentifier`)
    fn identifier(&self, bundle: &Path) -> Result<String, ModuleError>;

    /// Path of the bundle's primary binary
    fn primary_executable(&self, bundle: &Path) -> Result<PathBuf, ModuleError>;
}

/// Reads XML `Info.plist` files from deep (`Contents/`) or flat bundles
#[derive(Debug, Default, Clone, Copy)]
pub struct InfoPlistInspector;

impl InfoPlistInspector {
    fn info_plist(bundle: &Path) -> Result<(PathBuf, String), ModuleError> {
        let deep = bundle.join("Contents/Info.plist");
        let path = if deep.is_file() {
            deep
        } else {
            bundle.join("Info.plist")
        };

        let bytes = fs::read(&path).map_err(|e| ModuleError::io(&path, e))?;
        if bytes.starts_with(b"bplist") {
            return Err(ModuleError::invalid(
                &path,
                "binary property lists are not supported",
            ));
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| ModuleError::invalid(&path, "Info.plist is not UTF-8"))?;
        Ok((path, text))
    }

    fn string_value(path: &Path, plist: &str, key: &str, re: &Regex) -> Result<String, ModuleError> {
        let value = re
            .captures(plist)
            .and_then(|caps| caps.get(1))
            .map(|m| unescape_xml(m.as_str().trim()))
            .filter(|v| !v.is_empty());

        value.ok_or_else(|| ModuleError::invalid(path, format!("missing {}", key)))
    }
}

impl BundleInspector for InfoPlistInspector {
    fn identifier(&self, bundle: &Path) -> Result<String, ModuleError> {
        let (path, plist) = Self::info_plist(bundle)?;
        Self::string_value(&path, &plist, "CFBundleIdentifier", &IDENTIFIER_KEY)
    }

    fn primary_executable(&self, bundle: &Path) -> Result<PathBuf, ModuleError> {
        let (path, plist) = Self::info_plist(bundle)?;
        let name = Self::string_value(&path, &plist, "CFBundleExecutable", &EXECUTABLE_KEY)?;

        let contents = bundle.join("Contents");
        let exe = if contents.is_dir() {
            contents.join("MacOS").join(&name)
        } else {
            bundle.join(&name)
        };

        if exe.is_file() {
            Ok(exe)
        } else {
            Err(ModuleError::NotFound(format!(
                "executable {} of bundle {}",
                exe.display(),
                bundle.display()
            )))
        }
    }
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fingerprint, make_kext};

    #[test]
    fn test_key_patterns_match_their_own_key() {
        let plist = "<key>CFBundleExecutable</key><string>Foo</string>\
                     <key>CFBundleIdentifier</key> <string>com.x.foo</string>";
        assert_eq!(&IDENTIFIER_KEY.captures(plist).unwrap()[1], "com.x.foo");
        assert_eq!(&EXECUTABLE_KEY.captures(plist).unwrap()[1], "Foo");
    }

    #[test]
    fn test_deep_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let kext = make_kext(tmp.path(), "Foo", "com.example.foo", &fingerprint(1));

        let inspector = InfoPlistInspector;
        assert_eq!(inspector.identifier(&kext).unwrap(), "com.example.foo");
        assert_eq!(
            inspector.primary_executable(&kext).unwrap(),
            kext.join("Contents/MacOS/Foo")
        );
    }

    #[test]
    fn test_flat_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let kext = tmp.path().join("Flat.kext");
        fs::create_dir_all(&kext).unwrap();
        fs::write(
            kext.join("Info.plist"),
            "<plist><dict>\n<key>CFBundleIdentifier</key> <string> com.example.a&amp;b </string>\n\
             <key>CFBundleExecutable</key><string>Flat</string></dict></plist>",
        )
        .unwrap();
        fs::write(kext.join("Flat"), b"binary").unwrap();

        let inspector = InfoPlistInspector;
        assert_eq!(inspector.identifier(&kext).unwrap(), "com.example.a&b");
        assert_eq!(inspector.primary_executable(&kext).unwrap(), kext.join("Flat"));
    }

    #[test]
    fn test_malformed_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let inspector = InfoPlistInspector;

        let missing = tmp.path().join("Missing.kext");
        fs::create_dir_all(&missing).unwrap();
        assert!(matches!(
            inspector.identifier(&missing),
            Err(ModuleError::Io { .. })
        ));

        let binary = tmp.path().join("Binary.kext");
        fs::create_dir_all(&binary).unwrap();
        fs::write(binary.join("Info.plist"), b"bplist00\x00\x01").unwrap();
        assert!(matches!(
            inspector.identifier(&binary),
            Err(ModuleError::Invalid { .. })
        ));

        let no_id = tmp.path().join("NoId.kext");
        fs::create_dir_all(&no_id).unwrap();
        fs::write(no_id.join("Info.plist"), "<plist><dict></dict></plist>").unwrap();
        assert!(matches!(
            inspector.identifier(&no_id),
            Err(ModuleError::Invalid { .. })
        ));
    }

    #[test]
    fn test_executable_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let kext = make_kext(tmp.path(), "Gone", "com.example.gone", &fingerprint(1));
        fs::remove_file(kext.join("Contents/MacOS/Gone")).unwrap();

        assert!(InfoPlistInspector
            .primary_executable(&kext)
            .unwrap_err()
            .is_not_found());
    }
}
