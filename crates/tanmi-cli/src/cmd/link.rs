//! `tanmi-dock link`: populate a project's third-party directory from the
//! shared content store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tanmi_schema::{Platform, PlatformSet};

use crate::project;

pub fn run(project_arg: Option<PathBuf>, platform_args: Vec<String>) -> Result<()> {
    let project_path = project::resolve_project_path(project_arg)?;
    let (dep_config, dep_config_rel_path) = project::load(&project_path)?;

    let (cfg, config_dir) = super::load_config()?;
    let requested = resolve_requested_platforms(&config_dir, &project_path, platform_args)?;

    let engine = super::build_engine(&cfg, &config_dir);
    let report = engine
        .link(&project_path, &dep_config_rel_path, &dep_config, &requested)
        .with_context(|| format!("linking {}", project_path.display()))?;

    for dep in &report.dependencies {
        if dep.skipped {
            tracing::warn!(lib = %dep.lib, commit = %dep.commit, "dependency skipped (no usable platforms)");
        } else {
            tracing::info!(
                lib = %dep.lib,
                commit = %dep.commit,
                action = dep.action,
                platforms = %format_platforms(&dep.linked_platforms),
                "linked"
            );
        }
    }
    Ok(())
}

/// Use explicit `--platform` flags if given; otherwise fall back to the
/// project's previously linked platform set, read directly from the
/// registry (interactive platform selection is out of this crate's scope).
fn resolve_requested_platforms(
    config_dir: &std::path::Path,
    project_path: &std::path::Path,
    platform_args: Vec<String>,
) -> Result<PlatformSet> {
    if !platform_args.is_empty() {
        return Ok(PlatformSet::from_iter_sorted(platform_args.into_iter().map(Platform::new)));
    }

    let registry_path = config_dir.join("registry.json");
    let registry = tanmi_core::registry::Registry::load(&registry_path).context("loading registry.json")?;
    let project_hash = tanmi_core::registry::Registry::path_hash(project_path);
    if let Some(record) = registry.project(&project_hash) {
        if !record.platforms.is_empty() {
            return Ok(PlatformSet::from_iter_sorted(record.platforms.iter().cloned()));
        }
    }

    anyhow::bail!(
        "no platforms requested and no prior record for {}; pass at least one --platform",
        project_path.display()
    )
}

fn format_platforms(platforms: &PlatformSet) -> String {
    platforms.iter().map(Platform::as_str).collect::<Vec<_>>().join(",")
}
