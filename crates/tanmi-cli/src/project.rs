//! Discovery of a project's dependency-configuration document.
//!
//! Per the external-interface contract, the document lives at either
//! `3rdparty/codepac-dep.json` or the project root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tanmi_schema::DependencyConfig;

/// The two conventional locations, checked in order.
const CANDIDATES: &[&str] = ["3rdparty/codepac-dep.json", "codepac-dep.json"];

/// Locate and parse the dependency configuration for `project_path`.
///
/// Returns the parsed document and its path relative to `project_path`.
pub fn load(project_path: &Path) -> Result<(DependencyConfig, String)> {
    for candidate in CANDIDATES {
        let full = project_path.join(candidate);
        if full.is_file() {
            let raw = std::fs::read_to_string(&full)
                .with_context(|| format!("reading {}", full.display()))?;
            let config = DependencyConfig::parse(&raw)
                .with_context(|| format!("parsing {}", full.display()))?;
            return Ok((config, (*candidate).to_string()));
        }
    }
    bail!(
        "no dependency configuration found under {} (looked for {})",
        project_path.display(),
        CANDIDATES.join(" or ")
    )
}

/// Resolve the project directory argument against the current directory.
pub fn resolve_project_path(project: Option<PathBuf>) -> Result<PathBuf> {
    let path = match project {
        Some(p) => p,
        None => std::env::current_dir().context("determining current directory")?,
    };
    std::fs::canonicalize(&path).with_context(|| format!("resolving project path {}", path.display()))
}
