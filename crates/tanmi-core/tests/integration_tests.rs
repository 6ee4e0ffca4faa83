//! End-to-end `link` / `unlink` / `clean` runs against real temp
//! directories standing in for a project checkout and a store root.
//!
//! No fetcher is configured in these tests: every scenario below is
//! reachable through `ABSORB`/`LINKED`/`RELINK` alone, which never touch
//! the external-fetcher path, so the engine never needs one.

use std::fs;
use std::path::Path;

use tanmi_core::Engine;
use tanmi_schema::{CleanStrategy, CoreError, DependencyConfig, Platform, PlatformSet};
use tempfile::{Builder, TempDir};

/// `reject_unsafe` refuses a store root under `/tmp` (see
/// `paths::FORBIDDEN_ROOTS`), which is where `TempDir::new()` lands by
/// default on Linux. Nest the store directory under the crate's own
/// `target/` instead, so the suite passes regardless of `$TMPDIR`.
fn new_store_dir() -> TempDir {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/test-tmp");
    fs::create_dir_all(&root).unwrap();
    Builder::new().prefix("store-").tempdir_in(&root).unwrap()
}

const DEP_CONFIG_JSON: &str = r#"{
    "version": "1.0.0",
    "repos": { "common": [
        { "url": "https://example.com/demo.git", "commit": "cafe1234", "branch": "main", "dir": "demo" }
    ]}
}"#;

struct Harness {
    _project_dir: TempDir,
    _config_dir: TempDir,
    _store_dir: TempDir,
    engine: Engine,
    project_path: std::path::PathBuf,
}

fn setup() -> Harness {
    let project_dir = TempDir::new().unwrap();
    let config_dir = TempDir::new().unwrap();
    let store_dir = new_store_dir();

    let project_path = project_dir.path().to_path_buf();
    let engine = Engine::new(config_dir.path(), store_dir.path());

    Harness {
        _project_dir: project_dir,
        _config_dir: config_dir,
        _store_dir: store_dir,
        engine,
        project_path,
    }
}

fn write_local_macos_content(project_path: &Path, lib: &str, body: &[u8]) {
    let dir = project_path.join("3rdparty").join(lib).join("macOS");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("lib.a"), body).unwrap();
}

fn requested_macos() -> PlatformSet {
    PlatformSet::from_iter_sorted([Platform::new("macOS")])
}

#[test]
fn link_absorbs_real_local_content_into_the_store() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    let report = h
        .engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();

    assert_eq!(report.dependencies.len(), 1);
    let dep = &report.dependencies[0];
    assert_eq!(dep.action, "ABSORB");
    assert!(!dep.skipped);
    assert!(dep.linked_platforms.contains(&Platform::new("macOS")));

    let local_macos = h.project_path.join("3rdparty/demo/macOS");
    assert!(local_macos.symlink_metadata().unwrap().file_type().is_symlink());
    assert!(local_macos.join("lib.a").is_file());

    let store_path = h.engine.store.store_path_of("demo", "cafe1234", &Platform::new("macOS"));
    assert_eq!(fs::read(store_path.join("lib.a")).unwrap(), b"hello world");
}

#[test]
fn relinking_an_already_linked_project_is_a_no_op() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    h.engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();

    let second = h
        .engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();

    assert_eq!(second.dependencies[0].action, "LINKED");
    assert!(second.dependencies[0].linked_platforms.contains(&Platform::new("macOS")));
}

#[test]
fn unlink_restores_a_real_directory_and_drops_the_registry_record() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    h.engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();

    h.engine.unlink(&h.project_path).unwrap();

    let local_macos = h.project_path.join("3rdparty/demo/macOS");
    assert!(!local_macos.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(fs::read(local_macos.join("lib.a")).unwrap(), b"hello world");

    // a second unlink of an already-unlinked project is a harmless no-op
    h.engine.unlink(&h.project_path).unwrap();
}

#[test]
fn clean_evicts_unreferenced_store_entries_after_unlink() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    h.engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();
    h.engine.unlink(&h.project_path).unwrap();

    let removed = h.engine.clean(CleanStrategy::Unreferenced, 0).unwrap();
    assert_eq!(removed, vec!["demo:cafe1234:macOS".to_string()]);

    let store_path = h.engine.store.store_path_of("demo", "cafe1234", &Platform::new("macOS"));
    assert!(!store_path.exists());
}

#[test]
fn clean_manual_strategy_never_evicts_anything() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    h.engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();
    h.engine.unlink(&h.project_path).unwrap();

    let removed = h.engine.clean(CleanStrategy::Manual, 0).unwrap();
    assert!(removed.is_empty());

    let store_path = h.engine.store.store_path_of("demo", "cafe1234", &Platform::new("macOS"));
    assert!(store_path.exists());
}

#[cfg(unix)]
#[test]
fn link_rejects_a_store_root_under_a_forbidden_system_directory() {
    let project_dir = TempDir::new().unwrap();
    let config_dir = TempDir::new().unwrap();
    write_local_macos_content(project_dir.path(), "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    let engine = Engine::new(config_dir.path(), "/etc/tanmi-dock-store");
    let err = engine
        .link(project_dir.path(), "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap_err();
    assert!(matches!(err, CoreError::PathSafetyError(_)));

    // nothing under /etc was touched; the local directory is untouched too
    assert!(!Path::new("/etc/tanmi-dock-store").exists());
    assert!(project_dir.path().join("3rdparty/demo/macOS/lib.a").is_file());
}

#[test]
fn repair_drops_a_project_record_whose_path_no_longer_exists() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    h.engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();

    // simulate the project directory having been deleted out from under the
    // registry, without going through `unlink`
    fs::remove_dir_all(&h.project_path).unwrap();

    let report = h.engine.repair(false).unwrap();
    assert_eq!(report.stale_projects_removed.len(), 1);

    // the store entry's usedBy slot for the vanished project is gone too
    let removed = h.engine.clean(CleanStrategy::Unreferenced, 0).unwrap();
    assert_eq!(removed, vec!["demo:cafe1234:macOS".to_string()]);
}

#[test]
fn repair_removes_a_dangling_link_whose_store_target_vanished() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    h.engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap();

    // simulate an operator manually deleting the commit directory from the
    // store without going through `clean`
    let commit_dir = h.engine.store.commit_dir("demo", "cafe1234");
    fs::remove_dir_all(&commit_dir).unwrap();

    let report = h.engine.repair(false).unwrap();
    assert_eq!(report.dangling_links_removed.len(), 1);

    let local_macos = h.project_path.join("3rdparty/demo/macOS");
    assert!(!local_macos.exists());

    // relinking from a clean slate re-absorbs the same local... but there is
    // none left; a fresh link attempt with no local content and an empty
    // store now correctly reports MISSING rather than resurrecting a stale
    // reference
    let second = h
        .engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos());
    assert!(second.is_err(), "no fetcher configured, so a MISSING dependency can't be resolved");
}

#[test]
fn repair_registers_a_commit_directory_unknown_to_the_registry() {
    let h = setup();
    let shared = h.engine.store.shared_dir("orphan", "deadbeef");
    fs::create_dir_all(&shared).unwrap();
    fs::write(shared.join("codepac-dep.json"), b"{}").unwrap();

    let report = h.engine.repair(false).unwrap();
    assert_eq!(report.unknown_commits, vec!["orphan:deadbeef:general".to_string()]);

    // a second repair is idempotent: the entry is now known
    let second = h.engine.repair(false).unwrap();
    assert!(second.unknown_commits.is_empty());
}

#[test]
fn repair_with_prune_unknown_deletes_the_orphan_commit_directory_instead() {
    let h = setup();
    let shared = h.engine.store.shared_dir("orphan", "deadbeef");
    fs::create_dir_all(&shared).unwrap();
    fs::write(shared.join("codepac-dep.json"), b"{}").unwrap();

    let report = h.engine.repair(true).unwrap();
    assert_eq!(report.unknown_commits, vec!["orphan:deadbeef:general".to_string()]);
    assert!(!h.engine.store.commit_dir("orphan", "deadbeef").exists());
}

#[test]
fn link_refuses_a_legacy_v05_commit_directory_without_mutating_anything() {
    let h = setup();
    write_local_macos_content(&h.project_path, "demo", b"hello world");
    let dep_config = DependencyConfig::parse(DEP_CONFIG_JSON).unwrap();

    // Legacy v0.5 nesting: <platform>/<platform>/ under the commit dir.
    let nested = h
        .engine
        .store
        .store_path_of("demo", "cafe1234", &Platform::new("macOS"))
        .join("macOS");
    fs::create_dir_all(&nested).unwrap();

    let err = h
        .engine
        .link(&h.project_path, "3rdparty/codepac-dep.json", &dep_config, &requested_macos())
        .unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleStoreError { .. }));

    // the local directory was never touched: still a real directory, not a link
    let local_macos = h.project_path.join("3rdparty/demo/macOS");
    assert!(!local_macos.symlink_metadata().unwrap().file_type().is_symlink());
    assert!(local_macos.join("lib.a").is_file());
}
