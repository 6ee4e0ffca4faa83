//! Move a library's on-disk content from a project directory into the
//! content store, with cross-filesystem fallback and best-effort rollback.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tanmi_schema::{CoreError, Platform};

use crate::store::{Store, SHARED_DIR};

/// The closed set of recognised platform tags. An entry of `srcDir` whose
/// name matches one of these (and is requested) is moved as a platform
/// directory; anything else lands in `_shared`.
pub const KNOWN_PLATFORM_TAGS: &[&str] = &[
    "macOS",
    "macOS-asan",
    "Win",
    "iOS",
    "iOS-asan",
    "android",
    "android-asan",
    "android-hwasan",
    "ubuntu",
    "wasm",
    "ohos",
];

pub fn is_known_platform_tag(name: &str) -> bool {
    KNOWN_PLATFORM_TAGS.contains(&name)
}

/// Result of [`absorb_lib`].
#[derive(Debug, Default)]
pub struct AbsorbResult {
    pub platform_paths: std::collections::BTreeMap<Platform, PathBuf>,
    pub shared_path: Option<PathBuf>,
    pub skipped_platforms: BTreeSet<Platform>,
}

enum UndoStep {
    /// A rename was performed `from -> to`; undo renames `to -> from`.
    Rename { from: PathBuf, to: PathBuf },
}

/// Move each entry of `src_dir` into the store: recognised-and-requested
/// platform directories go to `<store>/<lib>/<commit>/<platform>/`;
/// everything else goes to `<store>/<lib>/<commit>/_shared/<entry>`.
/// Platform entries not in `platforms_to_absorb` remain in `src_dir`.
///
/// Moves attempt a single rename first, falling back to recursive
/// copy-then-remove on a cross-device error. If a destination already
/// exists, that entry is skipped (never overwritten) and recorded in the
/// result's `skipped_platforms`. On any other failure, every completed
/// rename is undone best-effort (in reverse order) before the error
/// propagates.
pub fn absorb_lib(
    store: &Store,
    src_dir: &Path,
    platforms_to_absorb: &BTreeSet<Platform>,
    lib: &str,
    commit: &str,
) -> Result<AbsorbResult, CoreError> {
    let commit_dir = store.commit_dir(lib, commit);
    let shared_dir = commit_dir.join(SHARED_DIR);

    let mut result = AbsorbResult::default();
    let mut journal: Vec<UndoStep> = Vec::new();

    let outcome = (|| -> Result<(), CoreError> {
        for entry in fs::read_dir(src_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let src_path = entry.path();
            let is_dir = entry.file_type()?.is_dir();

            let platform_tag = if is_dir && is_known_platform_tag(&name) {
                Some(Platform::new(name.clone()))
            } else {
                None
            };

            let dest = if let Some(ref tag) = platform_tag {
                if !platforms_to_absorb.contains(tag) {
                    continue; // stays in src_dir
                }
                commit_dir.join(tag.as_str())
            } else {
                shared_dir.join(&name)
            };

            if dest.exists() {
                if let Some(tag) = platform_tag {
                    result.skipped_platforms.insert(tag);
                } else {
                    result.skipped_platforms.insert(Platform::new(name.clone()));
                }
                continue;
            }

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            move_entry(&src_path, &dest)?;
            journal.push(UndoStep::Rename { from: src_path.clone(), to: dest.clone() });

            if let Some(tag) = platform_tag {
                result.platform_paths.insert(tag, dest);
            } else if result.shared_path.is_none() {
                result.shared_path = Some(shared_dir.clone());
            }
        }
        Ok(())
    })();

    if let Err(e) = outcome {
        rollback(&journal);
        return Err(e);
    }

    Ok(result)
}

/// Absorb the entirety of `src_dir` as the commit's `_shared`, for a
/// library with no platform directories. Handles the degenerate case where
/// `src_dir` itself already contains a `_shared` subdirectory by moving the
/// inner `_shared` rather than double-nesting.
pub fn absorb_general(store: &Store, src_dir: &Path, lib: &str, commit: &str) -> Result<PathBuf, CoreError> {
    let commit_dir = store.commit_dir(lib, commit);
    let shared_dir = commit_dir.join(SHARED_DIR);

    if shared_dir.exists() {
        return Err(CoreError::ConflictError(format!(
            "{} already exists in the store",
            shared_dir.display()
        )));
    }

    fs::create_dir_all(&commit_dir)?;

    let inner_shared = src_dir.join(SHARED_DIR);
    let source = if inner_shared.is_dir() { inner_shared } else { src_dir.to_path_buf() };

    move_entry(&source, &shared_dir)?;
    Ok(shared_dir)
}

fn move_entry(src: &Path, dst: &Path) -> Result<(), CoreError> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_exdev(&e) => {
            copy_recursive(src, dst)?;
            if src.is_dir() {
                fs::remove_dir_all(src)?;
            } else {
                fs::remove_file(src)?;
            }
            Ok(())
        }
        Err(e) => Err(CoreError::Io(e)),
    }
}

#[cfg(unix)]
fn is_exdev(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_exdev(_e: &std::io::Error) -> bool {
    false
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<(), CoreError> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let from = entry.path();
            let to = dst.join(entry.file_name());
            if entry.file_type()?.is_symlink() {
                let target = fs::read_link(&from)?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&target, &to)?;
                #[cfg(windows)]
                std::os::windows::fs::symlink_dir(&target, &to)?;
            } else if entry.file_type()?.is_dir() {
                copy_recursive(&from, &to)?;
            } else {
                fs::copy(&from, &to)?;
            }
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

/// Replay the undo journal in reverse, best-effort: each step's failure is
/// ignored so later (earlier-performed) steps still get a chance to undo.
fn rollback(journal: &[UndoStep]) {
    for step in journal.iter().rev() {
        match step {
            UndoStep::Rename { from, to } => {
                if move_entry(to, from).is_err() {
                    tracing::warn!(
                        from = %to.display(),
                        to = %from.display(),
                        "failed to undo absorb step during rollback"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absorb_lib_moves_requested_platforms_and_shared_content() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        let src = dir.path().join("proj/3rdparty/libX");
        fs::create_dir_all(src.join("macOS")).unwrap();
        fs::write(src.join("macOS/a.a"), b"a").unwrap();
        fs::create_dir_all(src.join("iOS")).unwrap();
        fs::write(src.join("iOS/b.a"), b"b").unwrap();
        fs::write(src.join("codepac-dep.json"), b"{}").unwrap();

        let platforms: BTreeSet<Platform> = [Platform::new("macOS"), Platform::new("iOS")].into();
        let result = absorb_lib(&store, &src, &platforms, "libX", "cafe").unwrap();

        assert_eq!(result.platform_paths.len(), 2);
        assert!(store.store_path_of("libX", "cafe", &Platform::new("macOS")).join("a.a").is_file());
        assert!(store.store_path_of("libX", "cafe", &Platform::new("iOS")).join("b.a").is_file());
        assert!(store.shared_dir("libX", "cafe").join("codepac-dep.json").is_file());
        assert!(!src.join("macOS").exists());
        assert!(!src.join("codepac-dep.json").exists());
    }

    #[test]
    fn absorb_lib_skips_existing_destination() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        fs::create_dir_all(store.store_path_of("libX", "cafe", &Platform::new("macOS"))).unwrap();
        fs::write(
            store.store_path_of("libX", "cafe", &Platform::new("macOS")).join("existing.a"),
            b"already there",
        )
        .unwrap();

        let src = dir.path().join("proj/3rdparty/libX");
        fs::create_dir_all(src.join("macOS")).unwrap();
        fs::write(src.join("macOS/a.a"), b"a").unwrap();

        let platforms: BTreeSet<Platform> = [Platform::new("macOS")].into();
        let result = absorb_lib(&store, &src, &platforms, "libX", "cafe").unwrap();

        assert!(result.skipped_platforms.contains(&Platform::new("macOS")));
        assert!(src.join("macOS").exists());
    }

    #[test]
    fn absorb_lib_leaves_non_requested_platform_in_src() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        let src = dir.path().join("proj/3rdparty/libX");
        fs::create_dir_all(src.join("macOS")).unwrap();
        fs::write(src.join("macOS/a.a"), b"a").unwrap();
        fs::create_dir_all(src.join("iOS")).unwrap();
        fs::write(src.join("iOS/b.a"), b"b").unwrap();

        let platforms: BTreeSet<Platform> = [Platform::new("macOS")].into();
        absorb_lib(&store, &src, &platforms, "libX", "cafe").unwrap();

        assert!(!src.join("macOS").exists());
        assert!(src.join("iOS").exists());
    }

    #[test]
    fn absorb_general_moves_whole_src_as_shared() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        let src = dir.path().join("proj/3rdparty/libG");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("f"), b"x").unwrap();

        let shared = absorb_general(&store, &src, "libG", "cafe").unwrap();
        assert!(shared.join("f").is_file());
        assert!(!src.exists());
    }

    #[test]
    fn absorb_general_handles_inner_shared_subdir() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        let src = dir.path().join("proj/3rdparty/libG");
        fs::create_dir_all(src.join(SHARED_DIR)).unwrap();
        fs::write(src.join(SHARED_DIR).join("f"), b"x").unwrap();

        let shared = absorb_general(&store, &src, "libG", "cafe").unwrap();
        assert!(shared.join("f").is_file());
        // No double nesting: shared/_shared/f must not exist.
        assert!(!shared.join(SHARED_DIR).exists());
    }

    #[test]
    fn absorb_general_rejects_existing_shared() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        fs::create_dir_all(store.shared_dir("libG", "cafe")).unwrap();
        fs::write(store.shared_dir("libG", "cafe").join("f"), b"x").unwrap();

        let src = dir.path().join("proj/3rdparty/libG");
        fs::create_dir_all(&src).unwrap();

        assert!(matches!(
            absorb_general(&store, &src, "libG", "cafe"),
            Err(CoreError::ConflictError(_))
        ));
    }
}
