//! Concurrent `link` runs from independent projects against one shared
//! store and config directory, driven over real OS threads rather than
//! mocked locking, the way the process-global lock is meant to be used.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tanmi_core::Engine;
use tanmi_schema::{DependencyConfig, Platform, PlatformSet};
use tempfile::{Builder, TempDir};

/// `reject_unsafe` refuses a store root under `/tmp`, where `TempDir::new()`
/// lands by default on Linux. Nest the store directory under the crate's
/// own `target/` instead, matching `integration_tests.rs`'s `new_store_dir`.
fn new_store_dir() -> TempDir {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-tmp");
    fs::create_dir_all(&root).unwrap();
    Builder::new().prefix("store-").tempdir_in(&root).unwrap()
}

fn dep_config_json(lib: &str, commit: &str) -> String {
    format!(
        r#"{{
            "version": "1.0.0",
            "repos": {{ "common": [
                {{ "url": "https://example.com/{lib}.git", "commit": "{commit}", "branch": "main", "dir": "{lib}" }}
            ]}}
        }}"#
    )
}

#[test]
fn concurrent_links_from_different_projects_both_succeed() {
    let config_dir = TempDir::new().unwrap();
    let store_dir = new_store_dir();
    let engine = Arc::new(Engine::new(config_dir.path(), store_dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let project_dir = TempDir::new().unwrap();
                let lib = format!("demo{i}");
                let commit = format!("cafe{i:04}");

                let local = project_dir.path().join("3rdparty").join(&lib).join("macOS");
                fs::create_dir_all(&local).unwrap();
                fs::write(local.join("lib.a"), format!("body-{i}")).unwrap();

                let dep_config = DependencyConfig::parse(&dep_config_json(&lib, &commit)).unwrap();
                let requested = PlatformSet::from_iter_sorted([Platform::new("macOS")]);

                let report = engine
                    .link(project_dir.path(), "3rdparty/codepac-dep.json", &dep_config, &requested)
                    .unwrap();

                assert_eq!(report.dependencies[0].action, "ABSORB");
                // keep the TempDir alive until the assertion above has run
                project_dir
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    // every dependency landed in the shared store under its own commit dir
    let libs = engine.store.list_libraries().unwrap();
    assert_eq!(libs.len(), 4);
}

#[test]
fn global_lock_serializes_concurrent_linkers_without_corrupting_the_registry() {
    let config_dir = TempDir::new().unwrap();
    let store_dir = new_store_dir();
    let engine = Arc::new(Engine::new(config_dir.path(), store_dir.path()));

    // Every thread links the *same* library/commit, so they contend on the
    // same store entry and registry record; the global lock must keep the
    // registry internally consistent regardless of interleaving.
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let project_dir = TempDir::new().unwrap();
                let local = project_dir.path().join("3rdparty/shared/macOS");
                fs::create_dir_all(&local).unwrap();
                fs::write(local.join("lib.a"), b"shared body").unwrap();

                let dep_config = DependencyConfig::parse(&dep_config_json("shared", "beefcafe")).unwrap();
                let requested = PlatformSet::from_iter_sorted([Platform::new("macOS")]);

                let result = engine.link(project_dir.path(), "3rdparty/codepac-dep.json", &dep_config, &requested);
                (i, result.is_ok(), project_dir)
            })
        })
        .collect();

    let mut ok_count = 0;
    for h in handles {
        let (_, ok, _project_dir) = h.join().unwrap();
        if ok {
            ok_count += 1;
        }
    }
    assert_eq!(ok_count, 8);

    let registry_path = config_dir.path().join("registry.json");
    let raw = fs::read_to_string(&registry_path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["projects"].as_object().unwrap().len(), 8);
}
