//! Shared wire types for the tanmi-dock content store.
//!
//! This crate defines the data structures the store-and-link engine
//! (`tanmi-core`) and its callers (`tanmi-cli`) agree on: platform tags, the
//! project-local dependency configuration document, the store root's
//! `config.json`, the persisted registry document, the transaction-log
//! record shape, and the tagged error enum every fallible `tanmi-core`
//! operation returns. No engine logic lives here — only `serde`/`thiserror`
//! derives and small validating constructors.

/// The store root's `config.json` document.
pub mod config;
/// The project-local dependency configuration document (`codepac-dep.json`).
pub mod depconfig;
/// The tagged error enum every `tanmi-core` operation returns.
pub mod error;
/// Typed wrapper for the BLAKE3 hash used for project-path identity.
pub mod hash;
/// Platform tags and platform sets.
pub mod platform;
/// The persisted registry document: projects, libraries, store entries.
pub mod registry;
/// The transaction log record shape.
pub mod txlog;

pub use config::{CleanStrategy, Config};
pub use depconfig::DependencyConfig;
pub use error::{CoreError, CoreResult};
pub use hash::{Blake3Hash, ProjectHash};
pub use platform::{Platform, PlatformSet};
pub use registry::{LibraryRecord, ProjectRecord, RegistryDocument, StoreEntry};
pub use txlog::{Operation, TransactionRecord};
