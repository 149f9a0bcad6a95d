//! Configuration loading.
//!
//! The configuration shape lives in [`tracklift_core::config`]; this module
//! reads it from TOML and rejects values the import core cannot run with.

pub use tracklift_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./tracklift.toml", "~/.config/tracklift/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration: hard errors fail, soft issues are logged.
fn validate_config(config: &Config) -> Result<()> {
    config.check()?;

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracklift.toml");
        std::fs::write(&path, "[import]\nqueue_capacity = 8\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.import.queue_capacity, 8);
        assert_eq!(config.import.thread_name_prefix, "tracklift-import");
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracklift.toml");
        std::fs::write(&path, "[import]\nqueue_capacity = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_or_default(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
