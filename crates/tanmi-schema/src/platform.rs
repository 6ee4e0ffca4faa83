use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the small closed set of platform tags the store recognises, plus
/// the synthetic `general` tag for platform-agnostic content.
///
/// Represented as a newtype around the wire string rather than a closed
/// enum: the declared set (`macOS`, `macOS-asan`, `Win`, `iOS`, `iOS-asan`,
/// `android`, `android-asan`, `android-hwasan`, `ubuntu`, `wasm`, `ohos`) is
/// a build-target catalogue that grows over time without changing any
/// engine behavior, so a closed Rust enum would force a release for every
/// new target a downstream build adds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// The synthetic tag for platform-agnostic ("general") library content.
    pub const GENERAL: &'static str = "general";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn general() -> Self {
        Self(Self::GENERAL.to_string())
    }

    pub fn is_general(&self) -> bool {
        self.0 == Self::GENERAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Platform {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A set of platform tags requested or already linked for one dependency.
///
/// Thin wrapper over a sorted `Vec` rather than a `HashSet` so that
/// serialized order is stable across runs (the registry is a diffable JSON
/// document; nondeterministic key order makes diffs noisy for no benefit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformSet(Vec<Platform>);

impl PlatformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter_sorted(iter: impl IntoIterator<Item = Platform>) -> Self {
        let mut v: Vec<Platform> = iter.into_iter().collect();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn contains(&self, p: &Platform) -> bool {
        self.0.contains(p)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, p: Platform) {
        if !self.0.contains(&p) {
            self.0.push(p);
            self.0.sort();
        }
    }

    /// Split `requested` into the subset present in `self` (existing) and
    /// the subset absent (missing).
    pub fn partition_requested(&self, requested: &PlatformSet) -> (PlatformSet, PlatformSet) {
        let mut existing = Vec::new();
        let mut missing = Vec::new();
        for p in requested.iter() {
            if self.contains(p) {
                existing.push(p.clone());
            } else {
                missing.push(p.clone());
            }
        }
        (
            PlatformSet::from_iter_sorted(existing),
            PlatformSet::from_iter_sorted(missing),
        )
    }
}

impl IntoIterator for PlatformSet {
    type Item = Platform;
    type IntoIter = std::vec::IntoIter<Platform>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Platform> for PlatformSet {
    fn from_iter<T: IntoIterator<Item = Platform>>(iter: T) -> Self {
        Self::from_iter_sorted(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_is_general() {
        assert!(Platform::general().is_general());
        assert!(!Platform::new("macOS").is_general());
    }

    #[test]
    fn partition_requested_splits_correctly() {
        let store = PlatformSet::from_iter_sorted([Platform::new("macOS")]);
        let requested = PlatformSet::from_iter_sorted([Platform::new("macOS"), Platform::new("iOS")]);
        let (existing, missing) = store.partition_requested(&requested);
        assert_eq!(existing.len(), 1);
        assert!(existing.contains(&Platform::new("macOS")));
        assert_eq!(missing.len(), 1);
        assert!(missing.contains(&Platform::new("iOS")));
    }

    #[test]
    fn set_dedupes_and_sorts() {
        let set = PlatformSet::from_iter_sorted([
            Platform::new("Win"),
            Platform::new("android"),
            Platform::new("Win"),
        ]);
        assert_eq!(set.len(), 2);
    }
}
