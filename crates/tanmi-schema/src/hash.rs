use serde::{Deserialize, Serialize};

/// BLAKE3 hash for fast internal operations (project-hash derivation, CAS
/// bookkeeping).
///
/// BLAKE3 is used rather than a cryptographic-verification digest because
/// the store never verifies library contents against a hash — identity is
/// carried by the upstream VCS commit (spec Non-goals). This type exists
/// purely so two internal strings (a project path, say) can be compared by
/// their digest instead of their full length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blake3Hash(String);

impl Blake3Hash {
    /// Create a new `Blake3Hash` from a raw hex string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Compute the BLAKE3 hash of data, as a full 64-hex-char digest.
    pub fn compute(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self(hex::encode(hash.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Blake3Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A project's primary key in the registry: the first 12 hex characters of
/// the BLAKE3 digest of its canonicalized absolute path.
///
/// Deliberately short (48 bits) — collisions are a registry-repair problem,
/// not a security one, since the project path is also stored verbatim
/// alongside the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectHash(String);

impl ProjectHash {
    const LEN: usize = 12;

    /// Wrap an already-computed 12-hex-digit key (e.g. a registry document's
    /// `projects` map key) back into a `ProjectHash` without recomputing it.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive a `ProjectHash` from a project's absolute path.
    ///
    /// The path is hashed as-is (as a lossy UTF-8 byte string); callers are
    /// responsible for normalising it (e.g. via `dunce`-style canonicalization
    /// or the path utilities' home-contraction) before calling this so that
    /// two spellings of the same project don't hash differently.
    pub fn of_path(path: &std::path::Path) -> Self {
        let digest = blake3::hash(path.to_string_lossy().as_bytes());
        let hex = hex::encode(digest.as_bytes());
        Self(hex[..Self::LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
