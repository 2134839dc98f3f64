use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

pub const ENV_STREAM_URL: &str = "STATELINK_STREAM_URL";
pub const ENV_API_URL: &str = "STATELINK_API_URL";
pub const ENV_LOG_LEVEL: &str = "STATELINK_LOG_LEVEL";

/// Default data directory: ~/.statelink
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".statelink"))
}

/// Loads configuration with the following priority (highest first):
/// environment variables, `~/.statelink/config.toml`, `./config.toml`,
/// built-in defaults.
pub fn load_default() -> anyhow::Result<AppConfig> {
    let user_config = get_data_dir().ok().map(|dir| dir.join("config.toml"));
    let local_config = Path::new("config.toml");

    let mut cfg = match user_config.as_deref().filter(|p| p.exists()) {
        Some(path) => load_from_path(path)?,
        None if local_config.exists() => load_from_path(local_config)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("parse config {}", path.display()))
}

/// Applies `STATELINK_*` overrides; blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get(ENV_STREAM_URL) {
        cfg.stream.url = v;
    }
    if let Some(v) = get(ENV_API_URL) {
        cfg.api.base_url = v;
    }
    if let Some(v) = get(ENV_LOG_LEVEL) {
        cfg.logging.level = v;
    }
}
