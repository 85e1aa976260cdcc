//! Integration Tests for a whole kernel debug session
//!
//! Builds a fake Xcode install with SDKs, a KDK and a symbols directory,
//! then resolves kexts and round-trips modules through the remote cache.
//!
//! Run with: cargo test --test session_test -- --nocapture

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{fingerprint, macho_with_uuid, make_kext};
use kextcache::{
    KernelSession, ModuleCache, ModuleIdentity, SearchConfig, SessionConfig, SessionKind,
};

const SLE: &str = "System/Library/Extensions";

/// Fake toolchain: Xcode.app/Contents/{Developer,Symbols}, a KDK area and an
/// extensions directory, all under `base`
fn config_under(base: &Path, kind: SessionKind) -> SessionConfig {
    SessionConfig {
        kind,
        search: SearchConfig {
            developer_dir: Some(base.join("Xcode.app/Contents/Developer")),
            internal_kdk_dir: base.join("KDKs"),
            system_extensions_dir: base.join("Extensions"),
            ..SearchConfig::default()
        },
    }
}

#[test]
fn test_session_indexes_every_source() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path();
    let developer = base.join("Xcode.app/Contents/Developer");

    let ios_sle = developer
        .join("Platforms/iPhoneOS.platform/Developer/SDKs/iPhoneOS7.0.Internal.sdk")
        .join(SLE);
    let mac_sle = developer
        .join("Platforms/MacOSX.platform/Developer/SDKs/MacOSX10.9.Internal.sdk")
        .join(SLE);
    let kdk_sle = base.join("KDKs/KernelDebugKit_13A.kdk").join(SLE);
    let host_sle = base.join("Extensions");
    let symbols = base.join("Xcode.app/Contents/Symbols");
    for dir in [&ios_sle, &mac_sle, &kdk_sle, &host_sle, &symbols] {
        fs::create_dir_all(dir).unwrap();
    }

    make_kext(&ios_sle, "IOSOnly", "com.x.ios", &fingerprint(1));
    make_kext(&mac_sle, "IOFoo", "com.x.foo", &fingerprint(2));
    make_kext(&kdk_sle, "IOFoo", "com.x.foo", &fingerprint(3));
    let host = make_kext(&host_sle, "IOFoo", "com.x.foo", &fingerprint(4));
    make_kext(&host.join("Contents/PlugIns"), "IOFooPlugin", "com.x.foo.plugin", &fingerprint(5));
    make_kext(&symbols, "Sym", "com.x.sym", &fingerprint(6));

    let session = KernelSession::new(&config_under(base, SessionKind::Unknown));
    let status = session.status();
    println!("{}", status);

    assert_eq!(status.indexed, 6);
    assert_eq!(
        status.roots_scanned,
        vec![ios_sle, mac_sle, kdk_sle, host_sle, symbols]
    );
    assert_eq!(session.index().candidates("com.x.foo").len(), 3);

    // Every build of com.x.foo is reachable by its own UUID
    for seed in 2..=4 {
        let fp = fingerprint(seed);
        let module = session.resolve(Path::new("com.x.foo"), Some(&fp)).unwrap();
        assert!(module.matches(&fp));
    }
    assert!(session
        .resolve(Path::new("com.x.foo"), Some(&fingerprint(9)))
        .unwrap_err()
        .is_not_found());
    assert!(session
        .resolve(Path::new("com.x.foo.plugin"), Some(&fingerprint(5)))
        .is_ok());

    // A macOS session never looks at device SDKs
    let mac = KernelSession::new(&config_under(base, SessionKind::MacOs));
    assert_eq!(mac.status().indexed, 5);
    assert!(!mac.index().contains("com.x.ios"));
}

#[test]
fn test_remote_modules_round_trip_through_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_root = tmp.path().join("cache/remote-linux");
    let download = tmp.path().join("download.tmp");

    let fp = fingerprint(0xC4);
    fs::write(&download, macho_with_uuid(&fp)).unwrap();
    let identity = ModuleIdentity::new("/lib/x86_64-linux-gnu/libc.so.6").with_fingerprint(fp.clone());

    let session = KernelSession::new(&config_under(tmp.path(), SessionKind::Unknown));
    let cache = session.cache();

    assert!(cache.get(&cache_root, "ubuntu", &identity).unwrap_err().is_not_found());
    assert!(!cache_root.exists());

    cache.put(&cache_root, "ubuntu", &identity, &download).unwrap();
    let canonical = cache_root
        .join(".cache")
        .join(fp.to_string())
        .join("libc.so.6");
    let mirror = cache_root.join("ubuntu/lib/x86_64-linux-gnu/libc.so.6");
    assert!(canonical.is_file());
    assert!(fs::symlink_metadata(&mirror).unwrap().file_type().is_symlink());

    let first = cache.get(&cache_root, "ubuntu", &identity).unwrap();
    let second = cache.get(&cache_root, "ubuntu", &identity).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.data, fs::read(&download).unwrap());

    // Another process sees only what is on disk
    let restarted = ModuleCache::with_defaults();
    let reloaded = restarted.get(&cache_root, "ubuntu", &identity).unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(reloaded.data, first.data);
}
