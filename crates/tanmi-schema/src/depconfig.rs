use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::platform::Platform;

/// The sparse-checkout filter attached to a declared dependency.
///
/// Either a bare string placeholder (e.g. `${ALL_COMMON_SPARSE}`, expanded
/// by the external fetcher, opaque to the core) or an object keyed by
/// platform tag. A sparse object whose only key is `common` carries no
/// platform-specific filters and marks the library as *general*.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SparseSpec {
    /// An opaque placeholder string, expanded by the external fetcher.
    Placeholder(String),
    /// Sparse-checkout filters keyed by platform tag (or `common`).
    ByPlatform(HashMap<String, serde_json::Value>),
}

impl SparseSpec {
    /// Whether this sparse spec marks its library as platform-agnostic
    /// ("general" — realised as a single link to the commit's `_shared`).
    ///
    /// A bare string has no platform keys to inspect at all, so it can never
    /// assert generality; only an object whose keys are exactly `{"common"}`
    /// does.
    pub fn marks_general(&self) -> bool {
        match self {
            SparseSpec::Placeholder(_) => false,
            SparseSpec::ByPlatform(map) => map.len() == 1 && map.contains_key("common"),
        }
    }
}

/// One library entry under `repos.common` in a project's dependency
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
    pub url: String,
    pub commit: String,
    pub branch: String,
    /// Library name; the directory it is declared/linked under.
    pub dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseSpec>,
}

/// A post-fetch command hook declared in `actions.common`.
///
/// The core never executes these itself (build/compile is explicitly out of
/// scope); it only round-trips them for the external collaborator that does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub command: String,
}

/// The `repos` object of a dependency configuration document: today only a
/// `common` list is recognised, mirroring the wire shape exactly so an
/// unrecognised extra key round-trips rather than being rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repos {
    #[serde(default)]
    pub common: Vec<RepoEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default)]
    pub common: Vec<ActionEntry>,
}

/// The project-local dependency configuration document, conventionally
/// found at `3rdparty/codepac-dep.json` or the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub version: String,
    pub repos: Repos,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Actions>,
}

impl DependencyConfig {
    /// Parse and validate a dependency-configuration document.
    ///
    /// `version` and `repos.common` (as an array, even if empty) must be
    /// present; their absence is a fatal input error, never a silently
    /// empty default, since a config that can't name its own schema version
    /// is almost always evidence of a different file being pointed at.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::InputError("dependency config is not a JSON object".into()))?;

        if !obj.contains_key("version") {
            return Err(CoreError::InputError(
                "dependency config is missing required field `version`".into(),
            ));
        }
        let repos = obj
            .get("repos")
            .ok_or_else(|| CoreError::InputError("dependency config is missing required field `repos`".into()))?;
        let repos_obj = repos
            .as_object()
            .ok_or_else(|| CoreError::InputError("dependency config `repos` is not an object".into()))?;
        match repos_obj.get("common") {
            Some(v) if v.is_array() => {}
            _ => {
                return Err(CoreError::InputError(
                    "dependency config `repos.common` must be an array".into(),
                ));
            }
        }

        serde_json::from_value(value)
            .map_err(|e| CoreError::InputError(format!("malformed dependency config: {e}")))
    }

    pub fn libraries(&self) -> impl Iterator<Item = &RepoEntry> {
        self.repos.common.iter()
    }
}

impl RepoEntry {
    /// Whether this dependency's sparse spec marks it as platform-agnostic.
    pub fn is_general(&self) -> bool {
        self.sparse
            .as_ref()
            .map(SparseSpec::marks_general)
            .unwrap_or(false)
    }

    pub fn platform(&self, tag: impl Into<String>) -> Platform {
        Platform::new(tag.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let raw = r#"{
            "version": "1.0.0",
            "repos": { "common": [
                { "url": "https://example.com/libX.git", "commit": "cafe1234", "branch": "main", "dir": "libX" }
            ]}
        }"#;
        let cfg = DependencyConfig::parse(raw).unwrap();
        assert_eq!(cfg.repos.common.len(), 1);
        assert_eq!(cfg.repos.common[0].dir, "libX");
        assert!(!cfg.repos.common[0].is_general());
    }

    #[test]
    fn missing_version_is_input_error() {
        let raw = r#"{ "repos": { "common": [] } }"#;
        assert!(matches!(
            DependencyConfig::parse(raw),
            Err(CoreError::InputError(_))
        ));
    }

    #[test]
    fn non_array_repos_common_is_input_error() {
        let raw = r#"{ "version": "1.0.0", "repos": { "common": "oops" } }"#;
        assert!(matches!(
            DependencyConfig::parse(raw),
            Err(CoreError::InputError(_))
        ));
    }

    #[test]
    fn sparse_with_only_common_key_marks_general() {
        let raw = r#"{
            "version": "1.0.0",
            "repos": { "common": [
                { "url": "u", "commit": "c", "branch": "b", "dir": "libG",
                  "sparse": { "common": ["headers/"] } }
            ]}
        }"#;
        let cfg = DependencyConfig::parse(raw).unwrap();
        assert!(cfg.repos.common[0].is_general());
    }

    #[test]
    fn sparse_with_platform_key_is_not_general() {
        let raw = r#"{
            "version": "1.0.0",
            "repos": { "common": [
                { "url": "u", "commit": "c", "branch": "b", "dir": "libP",
                  "sparse": { "common": ["headers/"], "macOS": ["macOS/"] } }
            ]}
        }"#;
        let cfg = DependencyConfig::parse(raw).unwrap();
        assert!(!cfg.repos.common[0].is_general());
    }

    #[test]
    fn placeholder_sparse_string_is_not_general() {
        let raw = r#"{
            "version": "1.0.0",
            "repos": { "common": [
                { "url": "u", "commit": "c", "branch": "b", "dir": "libS",
                  "sparse": "${ALL_COMMON_SPARSE}" }
            ]}
        }"#;
        let cfg = DependencyConfig::parse(raw).unwrap();
        assert!(!cfg.repos.common[0].is_general());
    }
}
