use thiserror::Error;

/// The tagged error kinds the store-and-link engine surfaces.
///
/// Every variant maps to a case called out by name; callers that need to
/// branch on kind (rather than just propagate and print) should match on
/// this rather than inspecting the display string.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or malformed dependency configuration, unknown platform tag,
    /// or a missing required argument.
    #[error("invalid input: {0}")]
    InputError(String),

    /// The store root has not been configured (`init` never ran).
    #[error("store is not initialized: {0}")]
    UninitialisedError(String),

    /// A requested path lies under a forbidden system directory.
    #[error("refusing to touch system path: {0}")]
    PathSafetyError(String),

    /// A legacy v0.5 commit directory layout was detected.
    #[error(
        "incompatible store layout at {path}: remove the directory and re-link ({hint})"
    )]
    IncompatibleStoreError { path: String, hint: String },

    /// A pre-flight free-space estimate exceeds available bytes.
    #[error("insufficient disk space: need {needed} bytes, {available} available")]
    DiskSpaceError { needed: u64, available: u64 },

    /// Attempt to absorb into an already-existing store target.
    #[error("conflict: {0} already exists in the store")]
    ConflictError(String),

    /// Unable to acquire a lock within the timeout, or stale-lock recovery
    /// failed.
    #[error("lock error: {0}")]
    LockError(String),

    /// The external fetcher was missing, exited non-zero, or produced no
    /// usable output.
    #[error("fetcher error: {0}")]
    FetcherError(String),

    /// The current operation's transaction journal could not be persisted
    /// or replayed.
    #[error("transaction error: {0}")]
    TransactionError(String),

    /// Ambient I/O failure not otherwise classified above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ambient JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
