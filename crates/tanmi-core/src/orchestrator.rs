//! Link orchestrator: drives classification, per-action execution,
//! registry update, and transaction commit for `link`, `unlink`, and
//! `clean`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tanmi_schema::{
    CleanStrategy, CoreError, DependencyConfig, Platform, PlatformSet, ProjectRecord, RepoEntry, StoreEntry,
};

use crate::classifier::{self, Action};
use crate::fetcher::Fetcher;
use crate::linker;
use crate::registry::Registry;
use crate::store::Store;
use crate::txlog::Transaction;
use crate::{absorber, lock};

/// Disk-space safety margin added on top of an estimated download size
/// before a pre-flight check is allowed to pass.
const DISK_SPACE_SAFETY_MARGIN: u64 = 1_000_000_000;

/// Per-platform size assumed for a pending download when the registry has
/// no existing store entries yet to average from.
const DEFAULT_PREDICTED_PLATFORM_BYTES: u64 = 50_000_000;

/// Default width of the bounded download concurrency limiter.
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 3;

/// One dependency's outcome from a `link` run.
#[derive(Debug, Clone)]
pub struct LinkedDependency {
    pub lib: String,
    pub commit: String,
    pub action: &'static str,
    pub linked_platforms: PlatformSet,
    pub skipped: bool,
}

#[derive(Debug, Default)]
pub struct LinkReport {
    pub dependencies: Vec<LinkedDependency>,
}

/// Everything `link`/`unlink`/`clean` need in one place.
pub struct Engine {
    pub config_dir: PathBuf,
    pub store: Store,
    pub fetcher: Option<Fetcher>,
    pub download_concurrency: Option<usize>,
}

impl Engine {
    pub fn new(config_dir: impl Into<PathBuf>, store_root: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            store: Store::new(store_root),
            fetcher: None,
            download_concurrency: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn registry_path(&self) -> PathBuf {
        self.config_dir.join("registry.json")
    }

    fn tx_dir(&self) -> PathBuf {
        self.config_dir.join(".tx")
    }

    fn global_lock_path(&self) -> PathBuf {
        self.config_dir.join(".lock")
    }

    /// Run a full `link` invocation for one project.
    ///
    /// 1. Acquires the process-global lock and loads the registry.
    /// 2. Rolls back any orphan transaction left by a killed prior run.
    /// 3. Classifies every declared dependency against `requested`.
    /// 4. Disk-space pre-flights if any dependency will be downloaded.
    /// 5. Opens a transaction, executes every non-missing action in
    ///    declared order, then runs missing/partial downloads under a
    ///    bounded concurrency limiter.
    /// 6. Persists the project record, reconciles store references, saves
    ///    the registry, and commits the transaction.
    ///
    /// On any failure after the transaction opens, it is rolled back in
    /// reverse before the error is returned.
    pub fn link(
        &self,
        project_path: &Path,
        dep_config_rel_path: &str,
        dep_config: &DependencyConfig,
        requested: &PlatformSet,
    ) -> Result<LinkReport, CoreError> {
        crate::paths::reject_unsafe(self.store.root())?;
        let _guard = lock::acquire_global(&self.global_lock_path())?;
        let mut registry = Registry::load(&self.registry_path())?;

        for clean in crate::txlog::recover_orphans(&self.tx_dir())? {
            if !clean {
                tracing::warn!("an orphan transaction rollback did not fully clean up; inspect the store");
            }
        }

        struct Classified<'a> {
            entry: &'a RepoEntry,
            is_general: bool,
            action: Action,
        }

        let mut classified = Vec::new();
        for entry in dep_config.libraries() {
            let is_general = if self.store.commit_dir(&entry.dir, &entry.commit).is_dir() {
                linker::is_general_library(&self.store, &entry.dir, &entry.commit)
            } else {
                entry.is_general()
            };
            let local_path = project_path.join("3rdparty").join(&entry.dir);
            let action = classifier::classify(
                &self.store,
                &local_path,
                &entry.dir,
                &entry.commit,
                requested,
                is_general,
            );
            tracing::info!(lib = %entry.dir, commit = %entry.commit, action = ?action, "classified dependency");
            classified.push(Classified { entry, is_general, action });
        }

        let download_count = classified
            .iter()
            .filter(|c| matches!(c.action, Action::Missing | Action::LinkNew { .. }))
            .count();
        if download_count > 0 {
            self.preflight_disk_space(&registry, download_count)?;
        }

        let mut tx = Transaction::open(&self.tx_dir())?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let project_hash = Registry::path_hash(project_path);
        let old_linked: Vec<(String, String, Platform)> = registry
            .project(&project_hash)
            .map(|p| {
                p.linked
                    .iter()
                    .map(|l| (l.lib.clone(), l.commit.clone(), l.primary_platform.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let outcome = self.run_link_body(
            &classified
                .iter()
                .map(|c| (c.entry, c.is_general, c.action.clone()))
                .collect::<Vec<_>>(),
            project_path,
            dep_config_rel_path,
            &mut registry,
            &mut tx,
            &project_hash,
            requested,
            now_ms,
        );

        match outcome {
            Ok(report) => {
                let new_linked: BTreeSet<(String, String, Platform)> = report
                    .dependencies
                    .iter()
                    .filter(|d| !d.skipped)
                    .flat_map(|d| {
                        d.linked_platforms
                            .iter()
                            .map(move |p| (d.lib.clone(), d.commit.clone(), p.clone()))
                    })
                    .collect();

                for (lib, commit, platform) in &old_linked {
                    if !new_linked.contains(&(lib.clone(), commit.clone(), platform.clone())) {
                        registry.remove_store_reference(lib, commit, platform, &project_hash, now_ms);
                    }
                }
                for (lib, commit, platform) in &new_linked {
                    registry.add_store_reference(lib, commit, platform, &project_hash);
                }

                registry.save()?;
                tx.commit()?;
                Ok(report)
            }
            Err(e) => {
                let clean = tx.rollback().unwrap_or(false);
                if !clean {
                    tracing::warn!("rollback after failed link did not fully clean up; inspect the store and project directory");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_link_body(
        &self,
        classified: &[(&RepoEntry, bool, Action)],
        project_path: &Path,
        dep_config_rel_path: &str,
        registry: &mut Registry,
        tx: &mut Transaction,
        project_hash: &tanmi_schema::ProjectHash,
        requested: &PlatformSet,
        now_ms: i64,
    ) -> Result<LinkReport, CoreError> {
        let mut report = LinkReport::default();
        let mut linked_entries = Vec::new();

        // Synchronous phase: everything that doesn't need a download.
        for (entry, is_general, action) in classified {
            if matches!(action, Action::Missing | Action::LinkNew { .. }) {
                continue;
            }
            self.store.ensure_compatible(&entry.dir, &entry.commit)?;
            let local_path = project_path.join("3rdparty").join(&entry.dir);

            let linked_platforms =
                self.execute_action(entry, *is_general, action, &local_path, tx, registry, now_ms)?;

            report.dependencies.push(LinkedDependency {
                lib: entry.dir.clone(),
                commit: entry.commit.clone(),
                action: action_name(action),
                linked_platforms: linked_platforms.clone(),
                skipped: false,
            });
            for p in linked_platforms.iter() {
                linked_entries.push(tanmi_schema::registry::LinkedEntry {
                    lib: entry.dir.clone(),
                    commit: entry.commit.clone(),
                    primary_platform: p.clone(),
                    linked_path: local_path.to_string_lossy().to_string(),
                });
            }
        }

        // Download phase: bounded concurrency over Missing/LinkNew deps.
        let to_download: Vec<(&RepoEntry, bool, PlatformSet, PlatformSet)> = classified
            .iter()
            .filter_map(|(entry, is_general, action)| match action {
                Action::Missing => Some((*entry, *is_general, PlatformSet::new(), requested.clone())),
                Action::LinkNew { existing_in_store, missing_in_store } => {
                    Some((*entry, *is_general, existing_in_store.clone(), missing_in_store.clone()))
                }
                _ => None,
            })
            .collect();

        if !to_download.is_empty() {
            let results = self.run_downloads(&to_download)?;
            for (entry, is_general, download_ok, achieved_platforms) in results {
                let local_path = project_path.join("3rdparty").join(&entry.dir);
                if download_ok && !achieved_platforms.is_empty() {
                    self.store.ensure_compatible(&entry.dir, &entry.commit)?;
                    linker::link_lib(
                        &local_path,
                        &self.store.commit_dir(&entry.dir, &entry.commit),
                        &achieved_platforms,
                        is_general,
                    )?;
                    tx.append(tanmi_schema::TransactionRecord::new(
                        tanmi_schema::Operation::Absorb,
                        local_path.to_string_lossy().to_string(),
                        self.store.commit_dir(&entry.dir, &entry.commit).to_string_lossy().to_string(),
                    ))?;

                    for p in achieved_platforms.iter() {
                        let size = self.store.get_size(&entry.dir, &entry.commit, p).unwrap_or(0);
                        merge_store_entry(
                            registry,
                            StoreEntry {
                                lib: entry.dir.clone(),
                                commit: entry.commit.clone(),
                                platform: p.clone(),
                                branch: entry.branch.clone(),
                                url: entry.url.clone(),
                                size_bytes: size,
                                used_by: Default::default(),
                                created_at: now_ms,
                                last_access: now_ms,
                                unlinked_at: None,
                            },
                        );
                        linked_entries.push(tanmi_schema::registry::LinkedEntry {
                            lib: entry.dir.clone(),
                            commit: entry.commit.clone(),
                            primary_platform: p.clone(),
                            linked_path: local_path.to_string_lossy().to_string(),
                        });
                    }

                    report.dependencies.push(LinkedDependency {
                        lib: entry.dir.clone(),
                        commit: entry.commit.clone(),
                        action: "LINK_NEW",
                        linked_platforms: achieved_platforms,
                        skipped: false,
                    });
                } else {
                    tracing::warn!(lib = %entry.dir, commit = %entry.commit, "download yielded no usable platforms; skipping");
                    report.dependencies.push(LinkedDependency {
                        lib: entry.dir.clone(),
                        commit: entry.commit.clone(),
                        action: "MISSING",
                        linked_platforms: PlatformSet::new(),
                        skipped: true,
                    });
                }
            }
        }

        let platforms: BTreeSet<Platform> = requested.iter().cloned().collect();
        registry.upsert_project(
            project_hash,
            ProjectRecord {
                path: project_path.to_string_lossy().to_string(),
                dep_config_path: dep_config_rel_path.to_string(),
                platforms,
                linked: linked_entries,
            },
        );

        Ok(report)
    }

    fn execute_action(
        &self,
        entry: &RepoEntry,
        is_general: bool,
        action: &Action,
        local_path: &Path,
        tx: &mut Transaction,
        registry: &mut Registry,
        now_ms: i64,
    ) -> Result<PlatformSet, CoreError> {
        let commit_dir = self.store.commit_dir(&entry.dir, &entry.commit);

        match action {
            Action::Linked => {
                let linked = self.currently_linked_platforms(local_path, is_general);
                Ok(linked)
            }
            Action::Relink { existing_in_store } => {
                tx.append(tanmi_schema::TransactionRecord::new(
                    tanmi_schema::Operation::Unlink,
                    local_path.to_string_lossy().to_string(),
                    commit_dir.to_string_lossy().to_string(),
                ))?;
                linker::link_lib(local_path, &commit_dir, existing_in_store, is_general)?;
                tx.append(tanmi_schema::TransactionRecord::new(
                    tanmi_schema::Operation::Link,
                    local_path.to_string_lossy().to_string(),
                    commit_dir.to_string_lossy().to_string(),
                ))?;
                Ok(existing_in_store.clone())
            }
            Action::Replace { existing_in_store } => {
                tx.append(tanmi_schema::TransactionRecord::new(
                    tanmi_schema::Operation::Replace,
                    local_path.to_string_lossy().to_string(),
                    commit_dir.to_string_lossy().to_string(),
                ))?;
                std::fs::remove_dir_all(local_path)?;
                linker::link_lib(local_path, &commit_dir, existing_in_store, is_general)?;
                Ok(existing_in_store.clone())
            }
            Action::Absorb => {
                if is_general {
                    absorber::absorb_general(&self.store, local_path, &entry.dir, &entry.commit)?;
                } else {
                    let platforms: BTreeSet<Platform> = absorber::KNOWN_PLATFORM_TAGS
                        .iter()
                        .map(|p| Platform::new(*p))
                        .collect();
                    absorber::absorb_lib(&self.store, local_path, &platforms, &entry.dir, &entry.commit)?;
                }
                tx.append(tanmi_schema::TransactionRecord::new(
                    tanmi_schema::Operation::Absorb,
                    local_path.to_string_lossy().to_string(),
                    commit_dir.to_string_lossy().to_string(),
                ))?;

                let linked = if is_general {
                    PlatformSet::from_iter_sorted([Platform::general()])
                } else {
                    let (existing, _) = self.store.check_platform_completeness(
                        &entry.dir,
                        &entry.commit,
                        &PlatformSet::from_iter_sorted(
                            absorber::KNOWN_PLATFORM_TAGS.iter().map(|p| Platform::new(*p)),
                        ),
                    );
                    existing
                };

                for p in linked.iter() {
                    let size = self.store.get_size(&entry.dir, &entry.commit, p).unwrap_or(0);
                    merge_store_entry(
                        registry,
                        StoreEntry {
                            lib: entry.dir.clone(),
                            commit: entry.commit.clone(),
                            platform: p.clone(),
                            branch: entry.branch.clone(),
                            url: entry.url.clone(),
                            size_bytes: size,
                            used_by: Default::default(),
                            created_at: now_ms,
                            last_access: now_ms,
                            unlinked_at: None,
                        },
                    );
                }

                linker::link_lib(local_path, &commit_dir, &linked, is_general)?;
                tx.append(tanmi_schema::TransactionRecord::new(
                    tanmi_schema::Operation::Link,
                    local_path.to_string_lossy().to_string(),
                    commit_dir.to_string_lossy().to_string(),
                ))?;
                Ok(linked)
            }
            Action::Missing | Action::LinkNew { .. } => {
                unreachable!("download-requiring actions are handled in the download phase")
            }
        }
    }

    fn currently_linked_platforms(&self, local_path: &Path, is_general: bool) -> PlatformSet {
        if is_general {
            return PlatformSet::from_iter_sorted([Platform::general()]);
        }
        let Ok(entries) = std::fs::read_dir(local_path) else {
            return PlatformSet::new();
        };
        let platforms = entries
            .flatten()
            .filter(|e| linker::is_symlink(&e.path()))
            .map(|e| Platform::new(e.file_name().to_string_lossy().to_string()));
        PlatformSet::from_iter_sorted(platforms)
    }

    /// Run downloads for `to_download` under the bounded concurrency
    /// limiter, returning per-dependency outcomes. Registry and
    /// transaction-log mutation happens back in the caller, after every
    /// download task has resolved, so parallel work never touches shared
    /// state directly.
    fn run_downloads(
        &self,
        to_download: &[(&RepoEntry, bool, PlatformSet, PlatformSet)],
    ) -> Result<Vec<(RepoEntry, bool, bool, PlatformSet)>, CoreError> {
        let Some(fetcher) = &self.fetcher else {
            return Err(CoreError::FetcherError("no fetcher configured; cannot download missing dependencies".into()));
        };
        fetcher.check_present()?;

        let concurrency = self.download_concurrency.unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(concurrency.max(1))
            .enable_all()
            .build()
            .map_err(|e| CoreError::TransactionError(format!("failed to start download runtime: {e}")))?;

        let store = self.store.clone();
        let fetcher = fetcher.clone();
        let jobs: Vec<(RepoEntry, bool, PlatformSet, PlatformSet)> = to_download
            .iter()
            .map(|(e, g, existing, missing)| ((*e).clone(), *g, existing.clone(), missing.clone()))
            .collect();

        runtime.block_on(async move {
            let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
            let mut tasks = tokio::task::JoinSet::new();

            for (entry, is_general, existing_in_store, missing_in_store) in jobs {
                let semaphore = semaphore.clone();
                let store = store.clone();
                let fetcher = fetcher.clone();
                tasks.spawn_blocking(move || {
                    let _permit = blocking_acquire(&semaphore);
                    download_one(&store, &fetcher, &entry, is_general, &existing_in_store, &missing_in_store)
                });
            }

            let mut results = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let outcome = joined.map_err(|e| {
                    CoreError::TransactionError(format!("download task panicked: {e}"))
                })??;
                results.push(outcome);
            }
            Ok::<_, CoreError>(results)
        })
    }

    /// Pre-flight check per spec's step 4: require
    /// `(predicted size + 1 GB safety)` bytes free at the store's
    /// filesystem before any download is issued. The predicted size
    /// averages the sizes of platform directories already recorded in the
    /// registry (a proxy for "how big does a typical dependency run here")
    /// and falls back to a conservative fixed estimate when the store is
    /// still empty.
    fn preflight_disk_space(&self, registry: &Registry, download_count: usize) -> Result<(), CoreError> {
        std::fs::create_dir_all(self.store.root())?;
        let available = fs4::available_space(self.store.root())?;
        let needed = predicted_download_bytes(registry, download_count).saturating_add(DISK_SPACE_SAFETY_MARGIN);
        if available < needed {
            return Err(CoreError::DiskSpaceError { needed, available });
        }
        Ok(())
    }

    /// Reverse `link`: restore ordinary directories from every currently
    /// linked dependency, remove the project record, and drop the
    /// project's references from every store entry it used.
    pub fn unlink(&self, project_path: &Path) -> Result<(), CoreError> {
        crate::paths::reject_unsafe(self.store.root())?;
        let _guard = lock::acquire_global(&self.global_lock_path())?;
        let mut registry = Registry::load(&self.registry_path())?;
        let project_hash = Registry::path_hash(project_path);

        let Some(project) = registry.project(&project_hash).cloned() else {
            return Ok(());
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut seen_libs = BTreeSet::new();
        for linked in &project.linked {
            if !seen_libs.insert((linked.lib.clone(), linked.commit.clone())) {
                continue;
            }
            let local_path = project_path.join("3rdparty").join(&linked.lib);
            if linker::is_symlink(&local_path) {
                linker::restore_from_link(&local_path)?;
            } else if local_path.is_dir() {
                linker::restore_multi_platform(&local_path)?;
            }
        }

        for linked in &project.linked {
            registry.remove_store_reference(&linked.lib, &linked.commit, &linked.primary_platform, &project_hash, now_ms);
        }
        registry.remove_project(&project_hash);
        registry.save()?;
        Ok(())
    }

    /// Evict store entries per `strategy`, pruning empty commit/library
    /// directories as entries are removed.
    pub fn clean(&self, strategy: CleanStrategy, unused_days: u32) -> Result<Vec<String>, CoreError> {
        crate::paths::reject_unsafe(self.store.root())?;
        let _guard = lock::acquire_global(&self.global_lock_path())?;
        let mut registry = Registry::load(&self.registry_path())?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let candidates: Vec<StoreEntry> = match strategy {
            CleanStrategy::Unreferenced | CleanStrategy::Capacity => {
                registry.unreferenced_stores().into_iter().cloned().collect()
            }
            CleanStrategy::Unused => {
                let cutoff_ms = now_ms - i64::from(unused_days) * 24 * 60 * 60 * 1000;
                registry
                    .unreferenced_stores()
                    .into_iter()
                    .filter(|e| e.unlinked_at.map(|t| t < cutoff_ms).unwrap_or(false))
                    .cloned()
                    .collect()
            }
            CleanStrategy::Manual => Vec::new(),
        };

        let mut removed = Vec::new();
        for entry in candidates {
            self.store.remove(&entry.lib, &entry.commit, &entry.platform)?;
            registry.remove_store_entry(&entry.lib, &entry.commit, &entry.platform);
            removed.push(entry.own_key());
        }

        registry.save()?;
        Ok(removed)
    }

    /// Reconcile registry/filesystem drift that the crash-recovery
    /// transaction log doesn't cover, per spec's separate `repair` sweep:
    ///
    /// - project records whose path no longer exists are dropped, along
    ///   with every `usedBy` slot they held;
    /// - local symlinks whose store target has vanished are removed, and
    ///   the owning project's dependency entry for them is dropped;
    /// - commit directories present on disk but unknown to the registry are
    ///   either registered (`branch`/`url` = `"unknown"`) or, when
    ///   `prune_unknown` is set, deleted outright.
    ///
    /// Never invoked automatically; a caller runs it on request.
    pub fn repair(&self, prune_unknown: bool) -> Result<RepairReport, CoreError> {
        crate::paths::reject_unsafe(self.store.root())?;
        let _guard = lock::acquire_global(&self.global_lock_path())?;
        let mut registry = Registry::load(&self.registry_path())?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut report = RepairReport::default();

        // Stale project records: the project path no longer exists.
        for hash in registry.project_hashes() {
            let Some(project) = registry.project(&hash).cloned() else {
                continue;
            };
            if Path::new(&project.path).exists() {
                continue;
            }
            for linked in &project.linked {
                registry.remove_store_reference(&linked.lib, &linked.commit, &linked.primary_platform, &hash, now_ms);
            }
            registry.remove_project(&hash);
            report.stale_projects_removed.push(project.path);
        }

        // Dangling local symlinks: the project still exists but the store
        // target one of its links points at has vanished from disk.
        for hash in registry.project_hashes() {
            let Some(project) = registry.project(&hash).cloned() else {
                continue;
            };
            if !Path::new(&project.path).exists() {
                continue;
            }
            for linked in &project.linked {
                if self.store.exists(&linked.lib, &linked.commit, &linked.primary_platform) {
                    continue;
                }
                let local_path = PathBuf::from(&linked.linked_path);
                if linker::is_symlink(&local_path) {
                    let _ = std::fs::remove_file(&local_path).or_else(|_| std::fs::remove_dir(&local_path));
                } else {
                    let platform_link = local_path.join(linked.primary_platform.as_str());
                    if linker::is_symlink(&platform_link) {
                        let _ = std::fs::remove_file(&platform_link);
                    }
                }
                registry.remove_store_reference(&linked.lib, &linked.commit, &linked.primary_platform, &hash, now_ms);
                registry.remove_linked_entry(&hash, &linked.lib, &linked.commit, &linked.primary_platform);
                report.dangling_links_removed.push(format!(
                    "{}:{}:{}@{}",
                    linked.lib, linked.commit, linked.primary_platform, project.path
                ));
            }
        }

        // Commit directories on disk the registry doesn't know about.
        for (lib, commit, platform) in self.store.list_libraries()? {
            if registry.store_entry(&lib, &commit, &platform).is_some() {
                continue;
            }
            if prune_unknown {
                self.store.remove(&lib, &commit, &platform)?;
            } else {
                let size = self.store.get_size(&lib, &commit, &platform).unwrap_or(0);
                registry.upsert_store_entry(StoreEntry {
                    lib: lib.clone(),
                    commit: commit.clone(),
                    platform: platform.clone(),
                    branch: "unknown".to_string(),
                    url: "unknown".to_string(),
                    size_bytes: size,
                    used_by: Default::default(),
                    created_at: now_ms,
                    last_access: now_ms,
                    unlinked_at: Some(now_ms),
                });
            }
            report.unknown_commits.push(StoreEntry::key(&lib, &commit, &platform));
        }

        registry.save()?;
        Ok(report)
    }
}

/// Outcome of one [`Engine::repair`] sweep.
#[derive(Debug, Default, Clone)]
pub struct RepairReport {
    /// Project paths whose record was dropped because the path no longer
    /// exists on disk.
    pub stale_projects_removed: Vec<String>,
    /// `(lib, commit, platform)@projectPath` keys of links removed because
    /// their store target had vanished.
    pub dangling_links_removed: Vec<String>,
    /// `(lib, commit, platform)` keys found on disk with no registry entry,
    /// either newly registered or deleted depending on `prune_unknown`.
    pub unknown_commits: Vec<String>,
}

/// Create or refresh a store entry for `(lib, commit, platform)`, preserving
/// any existing `usedBy`/`createdAt`/`unlinkedAt` rather than wiping them.
/// The platform this entry names may already be in the store and
/// referenced by another project — e.g. a second project linking a commit a
/// first project already absorbed, or a `LINK_NEW`/`ABSORB` run reporting a
/// platform it found already present rather than one it just created —
/// and `Registry::upsert_store_entry` replaces the whole entry wholesale.
fn merge_store_entry(registry: &mut Registry, mut entry: StoreEntry) {
    if let Some(existing) = registry.store_entry(&entry.lib, &entry.commit, &entry.platform) {
        entry.used_by = existing.used_by.clone();
        entry.created_at = existing.created_at;
        entry.unlinked_at = existing.unlinked_at;
    }
    registry.upsert_store_entry(entry);
}

/// Estimate the total bytes `download_count` pending downloads will need.
fn predicted_download_bytes(registry: &Registry, download_count: usize) -> u64 {
    if download_count == 0 {
        return 0;
    }
    let sizes: Vec<u64> = registry
        .document()
        .stores
        .values()
        .map(|e| e.size_bytes)
        .filter(|&s| s > 0)
        .collect();
    let average = if sizes.is_empty() {
        DEFAULT_PREDICTED_PLATFORM_BYTES
    } else {
        sizes.iter().sum::<u64>() / sizes.len() as u64
    };
    average.saturating_mul(download_count as u64)
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::Linked => "LINKED",
        Action::Relink { .. } => "RELINK",
        Action::Replace { .. } => "REPLACE",
        Action::Absorb => "ABSORB",
        Action::Missing => "MISSING",
        Action::LinkNew { .. } => "LINK_NEW",
    }
}

/// Download one dependency into a temp directory, absorb whatever the
/// fetcher actually produced, and report the achieved platform set. Runs
/// inside a blocking task; touches only the filesystem and the store, never
/// the registry or transaction log directly — those are updated by the
/// caller after every task has resolved.
fn download_one(
    store: &Store,
    fetcher: &Fetcher,
    entry: &RepoEntry,
    is_general: bool,
    existing_in_store: &PlatformSet,
    missing_in_store: &PlatformSet,
) -> Result<(RepoEntry, bool, bool, PlatformSet), CoreError> {
    let temp_dir = tempfile::Builder::new()
        .prefix(&format!("tanmi-dock-{}-", entry.dir))
        .tempdir()?;

    let config_path = temp_dir.path().join("codepac-dep.json");
    std::fs::write(&config_path, b"{}")?;

    let requested_tags: Vec<Platform> = missing_in_store.iter().cloned().collect();
    let install_result = fetcher.install(temp_dir.path(), &config_path, &entry.commit, &requested_tags);

    if let Err(e) = install_result {
        tracing::warn!(lib = %entry.dir, error = %e, "fetcher failed for dependency");
        return Ok((entry.clone(), false, false, existing_in_store.clone()));
    }

    let absorbed = if is_general {
        absorber::absorb_general(store, temp_dir.path(), &entry.dir, &entry.commit).is_ok()
    } else {
        let wanted: BTreeSet<Platform> = missing_in_store.iter().cloned().collect();
        absorber::absorb_lib(store, temp_dir.path(), &wanted, &entry.dir, &entry.commit).is_ok()
    };

    let achieved_requested = existing_in_store
        .iter()
        .cloned()
        .chain(if absorbed { missing_in_store.iter().cloned().collect::<Vec<_>>() } else { Vec::new() })
        .collect::<Vec<_>>();

    let (achieved, _) = store.check_platform_completeness(
        &entry.dir,
        &entry.commit,
        &PlatformSet::from_iter_sorted(achieved_requested),
    );

    let ok = !achieved.is_empty();
    Ok((entry.clone(), ok, ok, achieved))
}

/// Acquire a semaphore permit synchronously from within a blocking task.
///
/// `tokio::sync::Semaphore::acquire` is async; since this runs inside
/// `spawn_blocking` (no executor to await on), block the OS thread on a
/// synchronous acquire instead via `blocking_acquire` semantics built on
/// `try_acquire` plus a short poll loop — the semaphore only ever guards a
/// handful of concurrent fetcher child processes, so coarse polling is
/// acceptable.
fn blocking_acquire(
    semaphore: &std::sync::Arc<tokio::sync::Semaphore>,
) -> tokio::sync::OwnedSemaphorePermit {
    loop {
        if let Ok(permit) = semaphore.clone().try_acquire_owned() {
            return permit;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
}
