use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::hash::ProjectHash;
use crate::platform::Platform;

/// Current on-disk schema version of the registry document.
///
/// Bumped whenever `ProjectRecord`/`LibraryRecord`/`StoreEntry` change shape
/// in a way a migration function must bridge.
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

/// A single `(libName, commit, primaryPlatform, linkedPath)` entry recording
/// what a project's `link` run actually produced, so `unlink` and repair
/// know what to undo without re-reading the dependency configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEntry {
    pub lib: String,
    pub commit: String,
    pub primary_platform: Platform,
    pub linked_path: String,
}

/// Registry record for one project, keyed by the 12-hex-digit hash of its
/// absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub path: String,
    /// Path of the dependency configuration file, relative to `path`.
    pub dep_config_path: String,
    pub platforms: BTreeSet<Platform>,
    pub linked: Vec<LinkedEntry>,
}

/// Registry record for one (library, commit, platform) triple — the
/// authoritative unit for eviction decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    pub lib: String,
    pub commit: String,
    pub platform: Platform,
    pub branch: String,
    pub url: String,
    pub size_bytes: u64,
    pub used_by: BTreeSet<ProjectHash>,
    pub created_at: i64,
    pub last_access: i64,
    /// Unix-millisecond instant the last reference was dropped. Defined iff
    /// `used_by` is empty; never overwritten by a later removal once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlinked_at: Option<i64>,
}

impl StoreEntry {
    pub fn key(lib: &str, commit: &str, platform: &Platform) -> String {
        format!("{lib}:{commit}:{platform}")
    }

    pub fn own_key(&self) -> String {
        Self::key(&self.lib, &self.commit, &self.platform)
    }
}

/// Coarse per-(library, commit) reporting record, rebuilt from the
/// authoritative `StoreEntry` set on every registry mutation rather than
/// independently tracked — see the registry's derived-record discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub lib: String,
    pub commit: String,
    pub platforms: BTreeSet<Platform>,
    pub total_size_bytes: u64,
    pub referenced_by: BTreeSet<ProjectHash>,
}

impl LibraryRecord {
    pub fn key(lib: &str, commit: &str) -> String {
        format!("{lib}:{commit}")
    }

    pub fn own_key(&self) -> String {
        Self::key(&self.lib, &self.commit)
    }
}

/// The full persisted registry document at `<configDir>/registry.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: u32,
    pub projects: BTreeMap<String, ProjectRecord>,
    pub libraries: BTreeMap<String, LibraryRecord>,
    pub stores: BTreeMap<String, StoreEntry>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: REGISTRY_SCHEMA_VERSION,
            projects: BTreeMap::new(),
            libraries: BTreeMap::new(),
            stores: BTreeMap::new(),
        }
    }
}
