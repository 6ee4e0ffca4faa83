//! `tanmi-dock repair`: reconcile registry/filesystem drift on request.

use anyhow::{Context, Result};

pub fn run(prune_unknown: bool) -> Result<()> {
    let (cfg, config_dir) = super::load_config()?;
    let engine = super::build_engine(&cfg, &config_dir);

    let report = engine.repair(prune_unknown).context("running repair")?;

    for path in &report.stale_projects_removed {
        tracing::info!(project = %path, "dropped stale project record");
    }
    for link in &report.dangling_links_removed {
        tracing::warn!(entry = %link, "removed dangling link to a vanished store target");
    }
    for key in &report.unknown_commits {
        if prune_unknown {
            tracing::warn!(entry = %key, "deleted commit directory unknown to the registry");
        } else {
            tracing::info!(entry = %key, "registered commit directory unknown to the registry");
        }
    }
    if report.stale_projects_removed.is_empty()
        && report.dangling_links_removed.is_empty()
        && report.unknown_commits.is_empty()
    {
        tracing::info!("nothing to repair");
    }
    Ok(())
}
