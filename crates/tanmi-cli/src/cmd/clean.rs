//! `tanmi-dock clean`: evict unreferenced store entries.

use anyhow::{Context, Result};
use tanmi_schema::config::CleanStrategy;

pub fn run(strategy_arg: Option<String>) -> Result<()> {
    let (cfg, config_dir) = super::load_config()?;
    let engine = super::build_engine(&cfg, &config_dir);

    let strategy = match strategy_arg.as_deref() {
        Some("unreferenced") => CleanStrategy::Unreferenced,
        Some("unused") => CleanStrategy::Unused,
        Some("capacity") => CleanStrategy::Capacity,
        Some("manual") => CleanStrategy::Manual,
        Some(other) => anyhow::bail!("unknown clean strategy: {other}"),
        None => cfg.clean_strategy,
    };

    let removed = engine.clean(strategy, cfg.unused_days).context("running clean")?;

    if removed.is_empty() {
        tracing::info!("nothing to clean");
    } else {
        for key in &removed {
            tracing::info!(entry = %key, "evicted store entry");
        }
    }
    Ok(())
}
