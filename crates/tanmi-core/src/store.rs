//! Store layout: commit-directory versioning, platform-completeness checks,
//! and size accounting.
//!
//! The on-disk unit of identity is a commit directory,
//! `<store>/<libName>/<commit>/`, holding a `_shared/` subdirectory plus
//! zero or more platform subdirectories.

use std::fs;
use std::path::{Path, PathBuf};

use tanmi_schema::{CoreError, Platform, PlatformSet};

/// The shared-content subdirectory name under every commit directory.
pub const SHARED_DIR: &str = "_shared";

/// Detected on-disk layout version of a commit directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVersion {
    /// Canonical layout: `_shared/` plus flat `<platform>/` directories.
    V06,
    /// Legacy layout: nested `<platform>/<platform>/` directories. Rejected.
    V05,
    /// Neither shape recognised (commit directory is an empty skeleton, or
    /// doesn't exist).
    Unknown,
}

/// Handle onto one store root.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pure computation of the on-disk path for one (library, commit,
    /// platform) triple. For `Platform::general()` this returns the
    /// commit's `_shared` directory.
    pub fn store_path_of(&self, lib: &str, commit: &str, platform: &Platform) -> PathBuf {
        let commit_dir = self.commit_dir(lib, commit);
        if platform.is_general() {
            commit_dir.join(SHARED_DIR)
        } else {
            commit_dir.join(platform.as_str())
        }
    }

    pub fn commit_dir(&self, lib: &str, commit: &str) -> PathBuf {
        self.root.join(lib).join(commit)
    }

    pub fn shared_dir(&self, lib: &str, commit: &str) -> PathBuf {
        self.commit_dir(lib, commit).join(SHARED_DIR)
    }

    /// Whether content for (library, commit, platform) is already present.
    /// For the synthetic `general` platform, true iff `_shared/` exists and
    /// is non-empty.
    pub fn exists(&self, lib: &str, commit: &str, platform: &Platform) -> bool {
        if platform.is_general() {
            let shared = self.shared_dir(lib, commit);
            dir_is_non_empty(&shared)
        } else {
            self.store_path_of(lib, commit, platform).is_dir()
        }
    }

    /// Partition `requested` into the subset already present in the store
    /// and the subset missing.
    pub fn check_platform_completeness(
        &self,
        lib: &str,
        commit: &str,
        requested: &PlatformSet,
    ) -> (PlatformSet, PlatformSet) {
        let mut existing = Vec::new();
        let mut missing = Vec::new();
        for p in requested.iter() {
            if self.exists(lib, commit, p) {
                existing.push(p.clone());
            } else {
                missing.push(p.clone());
            }
        }
        (
            PlatformSet::from_iter_sorted(existing),
            PlatformSet::from_iter_sorted(missing),
        )
    }

    /// Detect the on-disk layout of a commit directory.
    pub fn detect_version(&self, lib: &str, commit: &str) -> StoreVersion {
        let commit_dir = self.commit_dir(lib, commit);
        if !commit_dir.is_dir() {
            return StoreVersion::Unknown;
        }

        let entries = match fs::read_dir(&commit_dir) {
            Ok(e) => e,
            Err(_) => return StoreVersion::Unknown,
        };

        let mut has_shared = false;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == SHARED_DIR {
                has_shared = true;
                continue;
            }
            // A platform directory that itself contains a same-named
            // subdirectory is the legacy v0.5 nesting.
            if path.join(&*name).is_dir() {
                return StoreVersion::V05;
            }
        }

        if has_shared {
            StoreVersion::V06
        } else {
            StoreVersion::Unknown
        }
    }

    /// Fail loudly if `(lib, commit)` is laid out as legacy v0.5.
    ///
    /// Never silently migrates: the operator must remove the commit
    /// directory and re-link.
    pub fn ensure_compatible(&self, lib: &str, commit: &str) -> Result<(), CoreError> {
        if self.detect_version(lib, commit) == StoreVersion::V05 {
            let path = self.commit_dir(lib, commit);
            return Err(CoreError::IncompatibleStoreError {
                path: path.display().to_string(),
                hint: format!(
                    "remove {} then re-run link to re-fetch it in the current layout",
                    path.display()
                ),
            });
        }
        Ok(())
    }

    /// Remove one platform directory. If the commit directory then contains
    /// at most an empty `_shared`, remove it whole; if the library directory
    /// is then empty, remove it too. `Platform::general()` removes the whole
    /// commit directory directly.
    pub fn remove(&self, lib: &str, commit: &str, platform: &Platform) -> Result<(), CoreError> {
        let commit_dir = self.commit_dir(lib, commit);

        if platform.is_general() {
            if commit_dir.exists() {
                fs::remove_dir_all(&commit_dir)?;
            }
        } else {
            let platform_dir = self.store_path_of(lib, commit, platform);
            if platform_dir.exists() {
                fs::remove_dir_all(&platform_dir)?;
            }
            if commit_dir_is_only_empty_shared_or_empty(&commit_dir)? {
                fs::remove_dir_all(&commit_dir)?;
            }
        }

        let lib_dir = self.root.join(lib);
        if lib_dir.is_dir() && dir_is_empty(&lib_dir) {
            fs::remove_dir_all(&lib_dir)?;
        }
        Ok(())
    }

    /// Recursively sum file sizes under one platform directory (or, for
    /// `general`, the commit's `_shared`).
    pub fn get_size(&self, lib: &str, commit: &str, platform: &Platform) -> Result<u64, CoreError> {
        let path = self.store_path_of(lib, commit, platform);
        if !path.exists() {
            return Ok(0);
        }
        let mut total = 0u64;
        for entry in walkdir::WalkDir::new(&path) {
            let entry = entry.map_err(|e| {
                CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
            if entry.file_type().is_file() {
                total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(total)
    }

    /// Enumerate every (libName, commit, platform) triple on disk.
    pub fn list_libraries(&self) -> Result<Vec<(String, String, Platform)>, CoreError> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for lib_entry in fs::read_dir(&self.root)? {
            let lib_entry = lib_entry?;
            if !lib_entry.file_type()?.is_dir() {
                continue;
            }
            let lib_name = lib_entry.file_name().to_string_lossy().to_string();

            for commit_entry in fs::read_dir(lib_entry.path())? {
                let commit_entry = commit_entry?;
                if !commit_entry.file_type()?.is_dir() {
                    continue;
                }
                let commit = commit_entry.file_name().to_string_lossy().to_string();

                if dir_is_non_empty(&commit_entry.path().join(SHARED_DIR)) {
                    out.push((lib_name.clone(), commit.clone(), Platform::general()));
                }

                for platform_entry in fs::read_dir(commit_entry.path())? {
                    let platform_entry = platform_entry?;
                    if !platform_entry.file_type()?.is_dir() {
                        continue;
                    }
                    let name = platform_entry.file_name().to_string_lossy().to_string();
                    if name == SHARED_DIR {
                        continue;
                    }
                    out.push((lib_name.clone(), commit.clone(), Platform::new(name)));
                }
            }
        }
        Ok(out)
    }
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).map(|mut e| e.next().is_none()).unwrap_or(true)
}

fn dir_is_non_empty(path: &Path) -> bool {
    path.is_dir() && !dir_is_empty(path)
}

fn commit_dir_is_only_empty_shared_or_empty(commit_dir: &Path) -> Result<bool, CoreError> {
    if !commit_dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(commit_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == SHARED_DIR {
            if dir_is_non_empty(&entry.path()) {
                return Ok(false);
            }
            continue;
        }
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        (dir, store)
    }

    #[test]
    fn store_path_of_general_is_shared_dir() {
        let (_dir, store) = make_store();
        let p = store.store_path_of("libX", "cafe", &Platform::general());
        assert!(p.ends_with("libX/cafe/_shared"));
    }

    #[test]
    fn exists_false_for_missing_platform() {
        let (_dir, store) = make_store();
        assert!(!store.exists("libX", "cafe", &Platform::new("macOS")));
    }

    #[test]
    fn exists_true_after_creating_platform_dir() {
        let (_dir, store) = make_store();
        let p = store.store_path_of("libX", "cafe", &Platform::new("macOS"));
        fs::create_dir_all(&p).unwrap();
        assert!(store.exists("libX", "cafe", &Platform::new("macOS")));
    }

    #[test]
    fn general_exists_requires_non_empty_shared() {
        let (_dir, store) = make_store();
        let shared = store.shared_dir("libX", "cafe");
        fs::create_dir_all(&shared).unwrap();
        assert!(!store.exists("libX", "cafe", &Platform::general()));
        fs::write(shared.join("codepac-dep.json"), b"{}").unwrap();
        assert!(store.exists("libX", "cafe", &Platform::general()));
    }

    #[test]
    fn detect_version_v06_with_shared_and_flat_platform() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.shared_dir("libX", "cafe")).unwrap();
        fs::create_dir_all(store.store_path_of("libX", "cafe", &Platform::new("macOS"))).unwrap();
        assert_eq!(store.detect_version("libX", "cafe"), StoreVersion::V06);
    }

    #[test]
    fn detect_version_v05_with_nested_platform() {
        let (_dir, store) = make_store();
        let nested = store
            .store_path_of("libX", "cafe", &Platform::new("macOS"))
            .join("macOS");
        fs::create_dir_all(nested).unwrap();
        assert_eq!(store.detect_version("libX", "cafe"), StoreVersion::V05);
    }

    #[test]
    fn ensure_compatible_rejects_v05() {
        let (_dir, store) = make_store();
        let nested = store
            .store_path_of("libX", "cafe", &Platform::new("macOS"))
            .join("macOS");
        fs::create_dir_all(nested).unwrap();
        assert!(matches!(
            store.ensure_compatible("libX", "cafe"),
            Err(CoreError::IncompatibleStoreError { .. })
        ));
    }

    #[test]
    fn remove_platform_prunes_commit_and_lib_dirs_when_empty() {
        let (_dir, store) = make_store();
        let p = store.store_path_of("libX", "cafe", &Platform::new("macOS"));
        fs::create_dir_all(&p).unwrap();
        fs::write(p.join("a.a"), b"x").unwrap();

        store.remove("libX", "cafe", &Platform::new("macOS")).unwrap();

        assert!(!store.commit_dir("libX", "cafe").exists());
        assert!(!store.root().join("libX").exists());
    }

    #[test]
    fn get_size_sums_files() {
        let (_dir, store) = make_store();
        let p = store.store_path_of("libX", "cafe", &Platform::new("macOS"));
        fs::create_dir_all(&p).unwrap();
        fs::write(p.join("a.a"), b"hello").unwrap();
        fs::write(p.join("b.a"), b"world!").unwrap();
        assert_eq!(store.get_size("libX", "cafe", &Platform::new("macOS")).unwrap(), 11);
    }

    #[test]
    fn list_libraries_enumerates_triples() {
        let (_dir, store) = make_store();
        fs::create_dir_all(store.store_path_of("libX", "cafe", &Platform::new("macOS"))).unwrap();
        let shared = store.shared_dir("libY", "beef");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("f"), b"x").unwrap();

        let mut triples = store.list_libraries().unwrap();
        triples.sort();
        assert_eq!(
            triples,
            vec![
                ("libX".to_string(), "cafe".to_string(), Platform::new("macOS")),
                ("libY".to_string(), "beef".to_string(), Platform::general()),
            ]
        );
    }
}
