//! YAML configuration loading and saving

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a configuration from a YAML file
///
/// A missing file gives the default configuration. An unreadable or invalid
/// file is logged and also gives the default; a broken config file must never
/// keep the audio chain from starting.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: Failed to read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("load_config: Loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: Failed to parse {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a configuration as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::timestretch::EngineKind;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: ChainConfig = load_config(Path::new("/nonexistent/path/battle.yaml"));
        assert_eq!(config, ChainConfig::default());
    }

    #[test]
    fn test_load_malformed_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battle.yaml");
        std::fs::write(&path, "sample_rate: [not, a, number]\n").unwrap();

        let config: ChainConfig = load_config(&path);
        assert_eq!(config, ChainConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("battle.yaml");

        let mut config = ChainConfig {
            sample_rate: 48000,
            preferred_engine: EngineKind::Balanced,
            disabled_engines: vec![EngineKind::Premium],
            ..Default::default()
        };
        config.parameters.effects.set_bass_boost_db(9.0);
        config.parameters.profile.battle_mode = true;

        save_config(&config, &path).unwrap();
        let loaded: ChainConfig = load_config(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battle.yaml");
        std::fs::write(&path, "channels: 1\npreferred_engine: reference\n").unwrap();

        let config: ChainConfig = load_config(&path);
        assert_eq!(config.channels, 1);
        assert_eq!(config.preferred_engine, EngineKind::Reference);
        assert_eq!(config.sample_rate, ChainConfig::default().sample_rate);
    }
}
