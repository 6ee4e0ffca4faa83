//! Per-dependency status classifier: decides between the six actions a
//! declared dependency's local state and store completeness can produce.

use std::path::Path;

use tanmi_schema::{Platform, PlatformSet};

use crate::linker;
use crate::store::Store;

/// The action the orchestrator must take for one declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Local is already a correct link into the store. No-op.
    Linked,
    /// Local is a link pointing elsewhere; store has at least one requested
    /// platform. Remove the link, create a link for platforms already in
    /// the store.
    Relink { existing_in_store: PlatformSet },
    /// Local is an ordinary directory with real content; store has at
    /// least one requested platform. Drop local, link from store.
    Replace { existing_in_store: PlatformSet },
    /// Local is an ordinary directory with real content; store has none of
    /// the requested platforms. Absorb local into the store, then link.
    Absorb,
    /// Local does not exist; store has none of the requested platforms.
    /// Schedule a download, then treat as absorb of the downloaded
    /// skeleton.
    Missing,
    /// Local does not exist (or is missing some requested platforms); store
    /// has at least one requested platform but not necessarily all.
    /// Download what's missing into a temp dir, absorb it, then link
    /// everything now in the store.
    LinkNew {
        existing_in_store: PlatformSet,
        missing_in_store: PlatformSet,
    },
}

/// Classify one declared dependency.
///
/// `is_general` must already reflect the dependency's sparse-checkout
/// marking (when the store has no prior record of the commit) or the
/// store's own layout (when it does) — see
/// [`crate::linker::is_general_library`] and `RepoEntry::is_general`. For a
/// general library the requested platform set is substituted with the
/// synthetic `general` tag when testing store existence.
pub fn classify(
    store: &Store,
    local_path: &Path,
    lib: &str,
    commit: &str,
    requested: &PlatformSet,
    is_general: bool,
) -> Action {
    let effective_requested = if is_general {
        PlatformSet::from_iter_sorted([Platform::general()])
    } else {
        requested.clone()
    };

    let (existing_in_store, missing_in_store) =
        store.check_platform_completeness(lib, commit, &effective_requested);

    if is_general {
        classify_general(store, local_path, lib, commit, existing_in_store, missing_in_store)
    } else {
        classify_multi_platform(
            store,
            local_path,
            lib,
            commit,
            requested,
            existing_in_store,
            missing_in_store,
        )
    }
}

fn classify_general(
    store: &Store,
    local_path: &Path,
    lib: &str,
    commit: &str,
    existing_in_store: PlatformSet,
    missing_in_store: PlatformSet,
) -> Action {
    let local_is_symlink = linker::is_symlink(local_path);

    if !local_path.exists() && !local_is_symlink {
        return if existing_in_store.is_empty() {
            Action::Missing
        } else {
            Action::LinkNew { existing_in_store, missing_in_store }
        };
    }

    if local_is_symlink {
        let expected = store.shared_dir(lib, commit);
        if linker::is_correct(local_path, &expected) {
            return Action::Linked;
        }
        return if existing_in_store.is_empty() {
            Action::LinkNew { existing_in_store, missing_in_store }
        } else {
            Action::Relink { existing_in_store }
        };
    }

    // Ordinary directory with real content.
    if existing_in_store.is_empty() {
        Action::Absorb
    } else {
        Action::Replace { existing_in_store }
    }
}

fn classify_multi_platform(
    store: &Store,
    local_path: &Path,
    lib: &str,
    commit: &str,
    requested: &PlatformSet,
    existing_in_store: PlatformSet,
    missing_in_store: PlatformSet,
) -> Action {
    if !local_path.exists() {
        return if existing_in_store.is_empty() {
            Action::Missing
        } else {
            Action::LinkNew { existing_in_store, missing_in_store }
        };
    }

    let mut any_real_dir = false;
    let mut any_wrong_symlink = false;
    let mut any_absent_locally = false;
    let mut all_present_correct = true;

    for platform in requested.iter() {
        let sub = local_path.join(platform.as_str());
        if linker::is_symlink(&sub) {
            let expected = store.store_path_of(lib, commit, platform);
            if !linker::is_correct(&sub, &expected) {
                any_wrong_symlink = true;
                all_present_correct = false;
            }
        } else if sub.is_dir() {
            any_real_dir = true;
            all_present_correct = false;
        } else {
            any_absent_locally = true;
            all_present_correct = false;
        }
    }

    if any_real_dir {
        return if existing_in_store.is_empty() {
            Action::Absorb
        } else {
            Action::Replace { existing_in_store }
        };
    }

    if any_wrong_symlink {
        return if existing_in_store.is_empty() {
            Action::LinkNew { existing_in_store, missing_in_store }
        } else {
            Action::Relink { existing_in_store }
        };
    }

    if all_present_correct && missing_in_store.is_empty() {
        return Action::Linked;
    }

    if any_absent_locally && !existing_in_store.is_empty() {
        return Action::LinkNew { existing_in_store, missing_in_store };
    }

    if existing_in_store.is_empty() {
        Action::Missing
    } else {
        Action::LinkNew { existing_in_store, missing_in_store }
    }
}
