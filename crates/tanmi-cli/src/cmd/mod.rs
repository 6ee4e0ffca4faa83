//! Command handlers backing the subcommands declared in [`crate::Commands`].

/// `tanmi-dock clean`
pub mod clean;
/// `tanmi-dock link`
pub mod link;
/// `tanmi-dock unlink`
pub mod unlink;
/// `tanmi-dock repair`
pub mod repair;

use anyhow::{Context, Result};
use tanmi_core::config;
use tanmi_schema::Config;

/// Load the store root's `config.json`, erroring if the store has never
/// been initialised (`init` is out of this crate's scope per the store
/// engine's spec — operators run it through the external collaborator).
pub(crate) fn load_config() -> Result<(Config, std::path::PathBuf)> {
    let config_dir = tanmi_core::paths::config_dir();
    let config_path = config_dir.join("config.json");
    let cfg = config::load(&config_path).context("loading config.json")?;
    if !cfg.initialized || cfg.store_path.is_none() {
        anyhow::bail!(
            "store is not initialized at {}; run `init` before `link`/`unlink`/`clean`",
            config_dir.display()
        );
    }
    Ok((cfg, config_dir))
}

pub(crate) fn build_engine(cfg: &Config, config_dir: &std::path::Path) -> tanmi_core::Engine {
    let store_root = cfg.store_path.clone().expect("checked by load_config");
    let mut engine = tanmi_core::Engine::new(config_dir, store_root);
    if let Ok(fetcher) = tanmi_core::fetcher::Fetcher::discover("tanmi-dock-fetch") {
        engine = engine.with_fetcher(fetcher);
    }
    engine.download_concurrency = cfg.download_concurrency();
    engine
}
