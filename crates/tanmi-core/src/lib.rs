//! Store-and-link engine for the `tanmi-dock` content-addressed dependency
//! store.
//!
//! This crate implements the hard subsystem of `tanmi-dock`: the on-disk
//! layout and compatibility discipline of the content store, the
//! per-dependency status classifier, the linker, the absorb operation, the
//! registry's bidirectional reference graph, the crash-recoverable
//! transaction log, and the process-global/per-file lock discipline that
//! serialises mutating operations. [`orchestrator::Engine`] ties all of it
//! together into `link`, `unlink`, and `clean`.
//!
//! Everything here is synchronous and filesystem-bound except the bounded
//! download concurrency limiter in [`orchestrator`], which is the only
//! place real parallelism is needed.

/// Content-store move operation: absorbing a project-local directory into
/// the store.
pub mod absorber;
/// Per-dependency status classifier (`LINKED`/`RELINK`/`REPLACE`/`ABSORB`/
/// `MISSING`/`LINK_NEW`).
pub mod classifier;
/// Loading and persisting the store root's `config.json`.
pub mod config;
/// Invocation of the external VCS-fetcher binary.
pub mod fetcher;
/// Symlink/junction creation, verification, and shared-file materialisation.
pub mod linker;
/// Process-global mutex and per-file advisory locks.
pub mod lock;
/// Link orchestrator: drives `link`, `unlink`, and `clean`.
pub mod orchestrator;
/// Home-dir resolution and path-safety checks.
pub mod paths;
/// In-memory registry graph with JSON persistence.
pub mod registry;
/// Commit-directory versioning, platform-completeness checks, size
/// accounting.
pub mod store;
/// Append-only, crash-recoverable transaction log.
pub mod txlog;

pub use orchestrator::{Engine, LinkReport, LinkedDependency, RepairReport};
pub use store::Store;
