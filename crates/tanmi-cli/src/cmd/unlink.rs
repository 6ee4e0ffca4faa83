//! `tanmi-dock unlink`: reverse `link` for one project.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::project;

pub fn run(project_arg: Option<PathBuf>) -> Result<()> {
    let project_path = project::resolve_project_path(project_arg)?;
    let (cfg, config_dir) = super::load_config()?;
    let engine = super::build_engine(&cfg, &config_dir);

    engine
        .unlink(&project_path)
        .with_context(|| format!("unlinking {}", project_path.display()))?;

    tracing::info!(project = %project_path.display(), "unlinked");
    Ok(())
}
