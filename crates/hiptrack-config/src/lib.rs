mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Returns the config directory: <config dir>/hiptrack/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("hiptrack");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the settings file path: <config dir>/hiptrack/settings.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.toml"))
}

/// Load settings from `path`. Errors if the file is missing or malformed.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    info!(?path, "Loaded settings");
    Ok(config)
}

/// Save settings to `path`, creating parent directories as needed.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    info!(?path, "Saved settings");
    Ok(())
}

/// Settings bound to the file they were loaded from.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigStore {
    pub fn new(path: PathBuf, config: AppConfig) -> Self {
        Self { path, config }
    }

    /// Load settings, never failing.
    ///
    /// A missing file is regenerated with defaults. An unreadable or corrupt
    /// file is left in place and defaults are used for this session.
    pub fn load_or_regenerate(path: PathBuf) -> Self {
        if !path.exists() {
            warn!(?path, "Settings not found, regenerating defaults");
            let store = Self::new(path, AppConfig::default());
            if let Err(e) = store.save() {
                warn!(?e, "Failed to write default settings");
            }
            return store;
        }

        match load_config(&path) {
            Ok(config) => Self::new(path, config),
            Err(e) => {
                warn!(?e, "Failed to read settings, using defaults");
                Self::new(path, AppConfig::default())
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn save(&self) -> Result<()> {
        save_config(&self.path, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};

    #[test]
    fn defaults_match_mount_geometry() {
        let offsets = CalibrationOffsets::default();
        assert_eq!(offsets.global_offset, DVec3::ZERO);
        assert_eq!(offsets.device_offset, DVec3::new(0.0, -0.045, 0.09));
        assert_eq!(offsets.tracker_offset, DVec3::new(0.0, -0.75, 0.0));
        assert_eq!(offsets.global_rotation, DQuat::IDENTITY);

        let network = NetworkConfig::default();
        assert_eq!(network.base_port, 6969);
        assert_eq!(network.discovery_port, 35903);
        assert!(!PredictionConfig::default().enabled);
    }

    #[test]
    fn save_then_load_preserves_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut config = AppConfig::default();
        config.offsets.global_rotation = DQuat::from_rotation_y(0.5);
        config.offsets.tracker_offset = DVec3::new(0.0, -0.9, 0.0);
        config.prediction.enabled = true;
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.offsets.tracker_offset, config.offsets.tracker_offset);
        assert!(loaded
            .offsets
            .global_rotation
            .abs_diff_eq(config.offsets.global_rotation, 1e-12));
        assert!(loaded.prediction.enabled);
    }

    #[test]
    fn missing_file_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let store = ConfigStore::load_or_regenerate(path.clone());
        assert_eq!(store.config(), &AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "offsets = [not toml").unwrap();

        let store = ConfigStore::load_or_regenerate(path.clone());
        assert_eq!(store.config(), &AppConfig::default());
        // Left untouched so it can be inspected.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "offsets = [not toml");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[offsets]\ntracker_offset = [0.0, -0.6, 0.0]\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.offsets.tracker_offset, DVec3::new(0.0, -0.6, 0.0));
        assert_eq!(config.offsets.device_offset, DVec3::new(0.0, -0.045, 0.09));
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn zero_rotation_is_rejected() {
        let text = "[offsets]\nlocal_rotation = [0.0, 0.0, 0.0, 0.0]\n";
        assert!(toml::from_str::<AppConfig>(text).is_err());
    }
}
