//! In-memory registry graph with JSON persistence under the per-file lock.
//!
//! Three maps — projects by hash, libraries by `lib:commit`, store entries
//! by `lib:commit:platform` — held as a plain in-memory document. Mutators
//! are synchronous; callers must call [`Registry::save`] to persist.

use std::path::{Path, PathBuf};

use tanmi_schema::{
    CoreError, LibraryRecord, Platform, ProjectHash, ProjectRecord, RegistryDocument, StoreEntry,
    REGISTRY_SCHEMA_VERSION,
};

use crate::lock;

/// A loaded registry document bound to its on-disk path.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    doc: RegistryDocument,
}

impl Registry {
    /// Load the registry document at `path`, or start from an empty one if
    /// it doesn't yet exist. Applies forward-only schema migrations; a
    /// migration failure leaves the original file untouched and is
    /// surfaced as an error.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                doc: RegistryDocument::default(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let doc: RegistryDocument = serde_json::from_str(&raw)?;
        let doc = migrate(doc)?;
        Ok(Self { path: path.to_path_buf(), doc })
    }

    /// Atomically persist the current document (write-temp + rename) under
    /// the per-file advisory lock for this path.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = self.path.clone();
        let json = serde_json::to_vec_pretty(&self.doc)?;
        lock::with_file_lock(&path, move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, &json)?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })
    }

    pub fn document(&self) -> &RegistryDocument {
        &self.doc
    }

    /// Deterministic 12-hex-digit project key, derived from its absolute
    /// path.
    pub fn path_hash(p: &Path) -> ProjectHash {
        ProjectHash::of_path(p)
    }

    pub fn project(&self, hash: &ProjectHash) -> Option<&ProjectRecord> {
        self.doc.projects.get(hash.as_str())
    }

    pub fn upsert_project(&mut self, hash: &ProjectHash, record: ProjectRecord) {
        self.doc.projects.insert(hash.as_str().to_string(), record);
    }

    pub fn remove_project(&mut self, hash: &ProjectHash) -> Option<ProjectRecord> {
        self.doc.projects.remove(hash.as_str())
    }

    /// All project hashes currently on record, for sweeps that walk every
    /// project (e.g. `repair`).
    pub fn project_hashes(&self) -> Vec<ProjectHash> {
        self.doc.projects.keys().map(|k| ProjectHash::from_raw(k.clone())).collect()
    }

    /// Drop a single `(lib, commit, platform)` entry from one project's
    /// `linked` list, e.g. when `repair` finds its local symlink pointing at
    /// a store target that no longer exists. Leaves the rest of the project
    /// record untouched.
    pub fn remove_linked_entry(&mut self, hash: &ProjectHash, lib: &str, commit: &str, platform: &Platform) {
        if let Some(project) = self.doc.projects.get_mut(hash.as_str()) {
            project
                .linked
                .retain(|l| !(l.lib == lib && l.commit == commit && &l.primary_platform == platform));
        }
    }

    pub fn store_entry(&self, lib: &str, commit: &str, platform: &Platform) -> Option<&StoreEntry> {
        self.doc.stores.get(&StoreEntry::key(lib, commit, platform))
    }

    pub fn store_entry_mut(
        &mut self,
        lib: &str,
        commit: &str,
        platform: &Platform,
    ) -> Option<&mut StoreEntry> {
        self.doc.stores.get_mut(&StoreEntry::key(lib, commit, platform))
    }

    /// Create or refresh the store entry for one (lib, commit, platform).
    pub fn upsert_store_entry(&mut self, entry: StoreEntry) {
        let key = entry.own_key();
        self.doc.stores.insert(key, entry);
        self.touched(None);
    }

    pub fn remove_store_entry(&mut self, lib: &str, commit: &str, platform: &Platform) {
        self.doc.stores.remove(&StoreEntry::key(lib, commit, platform));
        self.touched(Some((lib, commit)));
    }

    /// Idempotent: inserts `project` into the entry's `usedBy` if absent,
    /// and clears `unlinkedAt`.
    pub fn add_store_reference(&mut self, lib: &str, commit: &str, platform: &Platform, project: &ProjectHash) {
        if let Some(entry) = self.store_entry_mut(lib, commit, platform) {
            entry.used_by.insert(project.clone());
            entry.unlinked_at = None;
        }
        self.touched(Some((lib, commit)));
    }

    /// Removes `project` from the entry's `usedBy`. When `usedBy` becomes
    /// empty and `unlinkedAt` is not already set, sets it to `now_ms`. An
    /// existing `unlinkedAt` is never overwritten.
    pub fn remove_store_reference(
        &mut self,
        lib: &str,
        commit: &str,
        platform: &Platform,
        project: &ProjectHash,
        now_ms: i64,
    ) {
        if let Some(entry) = self.store_entry_mut(lib, commit, platform) {
            entry.used_by.remove(project);
            if entry.used_by.is_empty() && entry.unlinked_at.is_none() {
                entry.unlinked_at = Some(now_ms);
            }
        }
        self.touched(Some((lib, commit)));
    }

    pub fn unreferenced_stores(&self) -> Vec<&StoreEntry> {
        self.doc.stores.values().filter(|e| e.used_by.is_empty()).collect()
    }

    /// Sort unreferenced entries by `unlinkedAt` ascending (undefined last)
    /// and return the prefix whose cumulative size first reaches half the
    /// unreferenced total. LRU-by-unlink-time eviction ordering.
    pub fn stores_for_half_clean(&self) -> Vec<&StoreEntry> {
        let mut unreferenced = self.unreferenced_stores();
        unreferenced.sort_by_key(|e| (e.unlinked_at.is_none(), e.unlinked_at.unwrap_or(i64::MAX)));

        let total: u64 = unreferenced.iter().map(|e| e.size_bytes).sum();
        let half = total / 2;

        let mut acc = 0u64;
        let mut selected = Vec::new();
        for entry in unreferenced {
            if acc >= half {
                break;
            }
            acc += entry.size_bytes;
            selected.push(entry);
        }
        selected
    }

    /// Rebuild the derived `LibraryRecord` for `(lib, commit)` from the
    /// authoritative `StoreEntry` set. Called after every mutation that
    /// touches a store entry for that commit.
    fn touched(&mut self, key: Option<(&str, &str)>) {
        let keys: Vec<(String, String)> = match key {
            Some((lib, commit)) => vec![(lib.to_string(), commit.to_string())],
            None => self
                .doc
                .stores
                .values()
                .map(|e| (e.lib.clone(), e.commit.clone()))
                .collect(),
        };
        for (lib, commit) in keys {
            self.rebuild_library_record(&lib, &commit);
        }
    }

    fn rebuild_library_record(&mut self, lib: &str, commit: &str) {
        let entries: Vec<&StoreEntry> = self
            .doc
            .stores
            .values()
            .filter(|e| e.lib == lib && e.commit == commit)
            .collect();

        if entries.is_empty() {
            self.doc.libraries.remove(&LibraryRecord::key(lib, commit));
            return;
        }

        let mut platforms = std::collections::BTreeSet::new();
        let mut referenced_by = std::collections::BTreeSet::new();
        let mut total_size_bytes = 0u64;
        for e in entries {
            platforms.insert(e.platform.clone());
            referenced_by.extend(e.used_by.iter().cloned());
            total_size_bytes += e.size_bytes;
        }

        let record = LibraryRecord {
            lib: lib.to_string(),
            commit: commit.to_string(),
            platforms,
            total_size_bytes,
            referenced_by,
        };
        self.doc.libraries.insert(record.own_key(), record);
    }
}

/// Apply forward-only migrations until `doc` is at
/// [`REGISTRY_SCHEMA_VERSION`]. There is currently only one schema version,
/// so this is a no-op validation; a future bump adds a match arm here.
fn migrate(doc: RegistryDocument) -> Result<RegistryDocument, CoreError> {
    if doc.version > REGISTRY_SCHEMA_VERSION {
        return Err(CoreError::InputError(format!(
            "registry schema version {} is newer than supported version {REGISTRY_SCHEMA_VERSION}",
            doc.version
        )));
    }
    Ok(doc)
}
