//! Initialize the configuration directory: create ~/.agent-bridge and a default config.json.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Create the config directory and write the default config if it does not exist.
/// Returns the config directory. An existing config file is left untouched.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        let default_config = serde_json::to_string_pretty(&config::Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config + "\n")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("agent-bridge-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn init_writes_loadable_default_config() {
        let dir = scratch_dir("init");
        let path = dir.join("nested").join("config.json");
        let returned = init_config_dir(&path).expect("init");
        assert_eq!(returned, dir.join("nested"));
        let text = std::fs::read_to_string(&path).expect("read config");
        let parsed: config::Config = serde_json::from_str(&text).expect("parse config");
        assert_eq!(parsed.gateway.port, 8787);
        assert_eq!(parsed.upstream.domain, config::DEFAULT_UPSTREAM_DOMAIN);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn init_keeps_existing_config() {
        let dir = scratch_dir("keep");
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"gateway":{"port":9000}}"#).expect("seed config");
        init_config_dir(&path).expect("init");
        let text = std::fs::read_to_string(&path).expect("read config");
        assert!(text.contains("9000"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
