use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DATE_FORMAT: &str = "%d/%m %H:%M";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Display options for the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Merge consecutive bubbles from the same sender
    pub same_sender_spacing_enabled: bool,
    /// chrono format string for receipt and bubble timestamps
    pub date_format: String,
    pub log_level: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            same_sender_spacing_enabled: true,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            log_level: "info".to_string(),
        }
    }
}

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Use `path` instead of the per-user config location. Only the first call wins.
pub fn set_config_path_override(path: PathBuf) -> bool {
    CONFIG_PATH_OVERRIDE.set(path).is_ok()
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join("chatline").join("config.json"))
}

/// Load from `path`, or from the default location. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<TimelineConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(TimelineConfig::default());
    }

    let contents = fs::read_to_string(&path)?;
    let config: TimelineConfig = serde_json::from_str(&contents)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn save_config(config: &TimelineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    info!("Config saved to {}", path.display());
    Ok(())
}
