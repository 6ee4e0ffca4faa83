//! Home-dir resolution and path-safety checks.
//!
//! Every mutating operation in the store-and-link engine funnels its target
//! path through [`reject_unsafe`] before touching the filesystem.

use dirs::home_dir;
use std::path::{Component, Path, PathBuf};

use tanmi_schema::CoreError;

/// Returns the configuration directory, or `None` if the user's home
/// directory cannot be resolved and `TANMI_DOCK_HOME` is unset.
pub fn try_config_dir() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("TANMI_DOCK_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".tanmi-dock"))
}

/// Returns the canonical configuration directory (`~/.tanmi-dock`).
///
/// # Panics
///
/// Panics if neither `TANMI_DOCK_HOME` is set nor the user's home directory
/// can be resolved.
pub fn config_dir() -> PathBuf {
    try_config_dir().expect("could not determine home directory; set TANMI_DOCK_HOME to override")
}

/// Path of the store root's `config.json`.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Path of the persisted registry document.
pub fn registry_file_path() -> PathBuf {
    config_dir().join("registry.json")
}

/// Directory holding in-flight transaction log files (`<configDir>/.tx/`).
pub fn transaction_dir() -> PathBuf {
    config_dir().join(".tx")
}

/// Path of the process-global lock file.
pub fn global_lock_path() -> PathBuf {
    config_dir().join(".lock")
}

/// Expand a leading `~` (or `~/...`) to the operator's home directory.
/// Paths without a leading `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Contract a path under the home directory back to a leading `~` for
/// display purposes.
pub fn contract_home(path: &Path) -> String {
    if let Some(home) = home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return if rest.as_os_str().is_empty() {
                "~".to_string()
            } else {
                format!("~/{}", rest.display())
            };
        }
    }
    path.display().to_string()
}

/// Unix directories a store path must never be, or lie under.
#[cfg(unix)]
const FORBIDDEN_ROOTS: &[&str] = &["/etc", "/usr", "/bin", "/sbin", "/var", "/tmp", "/root", "/System"];

/// Windows directories a store path must never be, or lie under.
#[cfg(windows)]
const FORBIDDEN_ROOTS: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData",
];

/// Reject, before any mutation, a candidate path that is or lies under a
/// platform-sensitive system directory.
///
/// `path` is not required to exist: components are resolved lexically (a
/// `..` that would escape into a forbidden root is rejected) rather than via
/// `fs::canonicalize`, since a brand-new store root legitimately doesn't
/// exist yet.
pub fn reject_unsafe(path: &Path) -> Result<(), CoreError> {
    let lexical = lexically_normalize(path);
    let candidate = lexical.to_string_lossy();
    let candidate_cmp = normalize_case(&candidate);

    for root in FORBIDDEN_ROOTS {
        let root_cmp = normalize_case(root);
        if candidate_cmp == root_cmp || candidate_cmp.starts_with(&format!("{root_cmp}/"))
            || candidate_cmp.starts_with(&format!("{root_cmp}\\"))
        {
            return Err(CoreError::PathSafetyError(format!(
                "{} lies under forbidden system directory {root}",
                path.display()
            )));
        }
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn normalize_case(s: &str) -> String {
    s.to_lowercase()
}

#[cfg(windows)]
fn normalize_case(s: &str) -> String {
    s.to_lowercase()
}

#[cfg(not(any(target_os = "macos", windows)))]
fn normalize_case(s: &str) -> String {
    s.to_string()
}

/// Resolve `.` and `..` components lexically, without touching the
/// filesystem, so that a path-traversal attempt resolving into a forbidden
/// root is caught even when the path doesn't exist yet.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
