//! Loading and persisting the store root's `config.json`.

use std::path::Path;

use tanmi_schema::{CoreError, Config};

/// Load `config.json` from `path`, or return the default configuration if
/// it doesn't exist yet (first run, before `init`).
pub fn load(path: &Path) -> Result<Config, CoreError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

/// Atomically persist `config` to `path` (write-temp + rename).
pub fn save(path: &Path, config: &Config) -> Result<(), CoreError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
