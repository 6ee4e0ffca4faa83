//! Create/verify/destroy the symbolic links that make a project's
//! third-party directory reflect the content store, and materialise shared
//! files.
//!
//! On Windows this creates a directory junction so linking never requires
//! elevated privilege; everywhere else it's an ordinary directory symlink.

use std::fs;
use std::path::{Path, PathBuf};

use tanmi_schema::{CoreError, Platform, PlatformSet};

use crate::store::Store;

/// Status of a local path with respect to an expected link target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// A symlink pointing at the expected target.
    Linked,
    /// A symlink pointing somewhere else.
    WrongLink,
    /// An ordinary directory (not a symlink).
    Directory,
    /// Nothing at the path.
    Missing,
}

/// Create a directory-kind link at `link_path` pointing at `target`,
/// creating `link_path`'s parent directory first.
pub fn link(target: &Path, link_path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = link_path.parent() {
        fs::create_dir_all(parent)?;
    }
    create_dir_link(target, link_path)
}

#[cfg(unix)]
fn create_dir_link(target: &Path, link_path: &Path) -> Result<(), CoreError> {
    std::os::unix::fs::symlink(target, link_path)?;
    Ok(())
}

#[cfg(windows)]
fn create_dir_link(target: &Path, link_path: &Path) -> Result<(), CoreError> {
    // A junction would avoid the admin-rights requirement symlinks carry on
    // older Windows builds; std only exposes directory symlinks, so that is
    // what this creates. Callers that need junction semantics on affected
    // hosts should enable Developer Mode or run elevated.
    std::os::windows::fs::symlink_dir(target, link_path)?;
    Ok(())
}

pub fn is_symlink(p: &Path) -> bool {
    fs::symlink_metadata(p).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

pub fn read_link(p: &Path) -> Option<PathBuf> {
    fs::read_link(p).ok()
}

/// Whether `p` is a symlink whose target resolves to something that exists.
pub fn is_valid(p: &Path) -> bool {
    is_symlink(p) && fs::metadata(p).is_ok()
}

/// Whether `p` is a symlink pointing at `target`, after normalising both to
/// absolute form.
pub fn is_correct(p: &Path, target: &Path) -> bool {
    let Some(link_target) = read_link(p) else {
        return false;
    };
    let resolved_link = absolute(&link_target, p.parent());
    let resolved_target = absolute(target, None);
    resolved_link == resolved_target
}

fn absolute(path: &Path, base: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    let joined = match base {
        Some(b) => b.join(path),
        None => path.to_path_buf(),
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn get_path_status(local: &Path, expected_target: &Path) -> PathStatus {
    if !local.exists() && !is_symlink(local) {
        return PathStatus::Missing;
    }
    if is_symlink(local) {
        return if is_correct(local, expected_target) {
            PathStatus::Linked
        } else {
            PathStatus::WrongLink
        };
    }
    PathStatus::Directory
}

/// Realise the canonical link layout for a multi-platform library:
/// `local_path/` is an ordinary directory; each platform in
/// `platforms_to_link` is a symlink to `store_commit_path/<platform>/`;
/// every entry under `store_commit_path/_shared` is copied (not linked)
/// into `local_path/`.
///
/// For a *general* library (no platform subdirectories), the layout
/// collapses to a single symlink `local_path -> store_commit_path/_shared`.
pub fn link_lib(
    local_path: &Path,
    store_commit_path: &Path,
    platforms_to_link: &PlatformSet,
    is_general: bool,
) -> Result<(), CoreError> {
    if is_general {
        if local_path.exists() || is_symlink(local_path) {
            remove_path(local_path)?;
        }
        let shared = store_commit_path.join(crate::store::SHARED_DIR);
        return link(&shared, local_path);
    }

    fs::create_dir_all(local_path)?;

    for platform in platforms_to_link.iter() {
        let link_path = local_path.join(platform.as_str());
        if link_path.exists() || is_symlink(&link_path) {
            remove_path(&link_path)?;
        }
        let target = store_commit_path.join(platform.as_str());
        link(&target, &link_path)?;
    }

    let shared_dir = store_commit_path.join(crate::store::SHARED_DIR);
    if shared_dir.is_dir() {
        copy_tree_preserving_symlinks(&shared_dir, local_path)?;
    }

    Ok(())
}

fn remove_path(p: &Path) -> Result<(), CoreError> {
    if is_symlink(p) {
        if p.is_dir() {
            fs::remove_dir(p)?;
        } else {
            fs::remove_file(p)?;
        }
    } else if p.is_dir() {
        fs::remove_dir_all(p)?;
    } else if p.exists() {
        fs::remove_file(p)?;
    }
    Ok(())
}

/// Copy every entry of `src` into `dst`, preserving internal symlinks
/// verbatim (re-created as symlinks rather than followed).
fn copy_tree_preserving_symlinks(src: &Path, dst: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            if dst_path.exists() || is_symlink(&dst_path) {
                remove_path(&dst_path)?;
            }
            create_dir_link(&target, &dst_path)?;
        } else if file_type.is_dir() {
            copy_tree_preserving_symlinks(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Reverse the canonical multi-platform layout: copy the resolved contents
/// of each platform symlink out of the store, remove the links, and leave
/// ordinary directories in their place. Nested symlinks inside the restored
/// target are preserved verbatim.
pub fn restore_multi_platform(local_path: &Path) -> Result<(), CoreError> {
    if !local_path.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(local_path)? {
        let entry = entry?;
        let path = entry.path();
        if is_symlink(&path) {
            let target = fs::read_link(&path)?;
            let resolved_target = absolute(&target, path.parent());
            fs::remove_file(&path).or_else(|_| fs::remove_dir(&path))?;
            copy_tree_preserving_symlinks(&resolved_target, &path)?;
        }
    }
    Ok(())
}

/// Reverse the general-library layout: `local_path` is a single symlink to
/// the store's `_shared`; copy its contents out and leave an ordinary
/// directory.
pub fn restore_from_link(local_path: &Path) -> Result<(), CoreError> {
    if !is_symlink(local_path) {
        return Ok(());
    }
    let target = fs::read_link(local_path)?;
    let resolved_target = absolute(&target, local_path.parent());
    fs::remove_file(local_path).or_else(|_| fs::remove_dir(local_path))?;
    copy_tree_preserving_symlinks(&resolved_target, local_path)?;
    Ok(())
}

/// Whether `(lib, commit)` is laid out as a general library (no platform
/// subdirectories, `_shared` only) according to `store`.
pub fn is_general_library(store: &Store, lib: &str, commit: &str) -> bool {
    let commit_dir = store.commit_dir(lib, commit);
    let Ok(entries) = fs::read_dir(&commit_dir) else {
        return false;
    };
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            let name = entry.file_name();
            if name != crate::store::SHARED_DIR {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn link_and_status_round_trip() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();
        let link_path = dir.path().join("link");

        link(&target, &link_path).unwrap();
        assert_eq!(get_path_status(&link_path, &target), PathStatus::Linked);
    }

    #[test]
    fn wrong_link_is_detected() {
        let dir = tempdir().unwrap();
        let target_a = dir.path().join("a");
        let target_b = dir.path().join("b");
        fs::create_dir_all(&target_a).unwrap();
        fs::create_dir_all(&target_b).unwrap();
        let link_path = dir.path().join("link");

        link(&target_a, &link_path).unwrap();
        assert_eq!(get_path_status(&link_path, &target_b), PathStatus::WrongLink);
    }

    #[test]
    fn missing_path_is_missing() {
        let dir = tempdir().unwrap();
        let link_path = dir.path().join("nope");
        let target = dir.path().join("target");
        assert_eq!(get_path_status(&link_path, &target), PathStatus::Missing);
    }

    #[test]
    fn ordinary_directory_is_directory_status() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("local");
        fs::create_dir_all(&local).unwrap();
        let target = dir.path().join("target");
        assert_eq!(get_path_status(&local, &target), PathStatus::Directory);
    }

    #[test]
    fn link_lib_multi_platform_copies_shared_and_links_platforms() {
        let dir = tempdir().unwrap();
        let commit_path = dir.path().join("store/libX/cafe");
        fs::create_dir_all(commit_path.join("macOS")).unwrap();
        fs::write(commit_path.join("macOS/a.a"), b"a").unwrap();
        fs::create_dir_all(commit_path.join("_shared")).unwrap();
        fs::write(commit_path.join("_shared/codepac-dep.json"), b"{}").unwrap();

        let local = dir.path().join("proj/3rdparty/libX");
        let platforms = PlatformSet::from_iter_sorted([Platform::new("macOS")]);
        link_lib(&local, &commit_path, &platforms, false).unwrap();

        assert!(local.is_dir());
        assert!(is_symlink(&local.join("macOS")));
        assert!(local.join("codepac-dep.json").is_file());
    }

    #[test]
    fn link_lib_general_collapses_to_single_symlink() {
        let dir = tempdir().unwrap();
        let commit_path = dir.path().join("store/libG/cafe");
        fs::create_dir_all(commit_path.join("_shared")).unwrap();
        fs::write(commit_path.join("_shared/f"), b"x").unwrap();

        let local = dir.path().join("proj/3rdparty/libG");
        link_lib(&local, &commit_path, &PlatformSet::new(), true).unwrap();

        assert!(is_symlink(&local));
        assert!(local.join("f").is_file());
    }

    #[test]
    fn restore_from_link_leaves_ordinary_directory() {
        let dir = tempdir().unwrap();
        let commit_path = dir.path().join("store/libG/cafe");
        fs::create_dir_all(commit_path.join("_shared")).unwrap();
        fs::write(commit_path.join("_shared/f"), b"x").unwrap();

        let local = dir.path().join("proj/3rdparty/libG");
        link_lib(&local, &commit_path, &PlatformSet::new(), true).unwrap();
        restore_from_link(&local).unwrap();

        assert!(!is_symlink(&local));
        assert!(local.is_dir());
        assert!(local.join("f").is_file());
    }
}
