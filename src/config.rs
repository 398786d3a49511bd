//! Configuration and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Default EventBus channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Ingest pipeline tuning
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Records per transactional batch flush
    pub batch_size: usize,
    /// Parsed-but-uncommitted batches the parser may run ahead by
    ///
    /// This bounds ingest memory: at most `(channel_depth + 1) * batch_size`
    /// records exist outside the store at any moment.
    pub channel_depth: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            channel_depth: 1,
        }
    }
}

impl IngestConfig {
    /// Validate tuning values before use
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.channel_depth == 0 {
            return Err(Error::Config(
                "channel_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Data folder resolution priority order:
/// 1. Explicit argument (highest priority)
/// 2. `SCANLENS_DATA` environment variable
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(explicit: Option<&str>) -> Result<PathBuf> {
    // Priority 1: explicit argument
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var("SCANLENS_DATA") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_folder())
}

/// Locate the configuration file for the platform
fn locate_config_file() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .map(|d| d.join("scanlens").join("config.toml"))
        .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("config file not found: {:?}", path)))
    }
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scanlens"))
        .unwrap_or_else(|| PathBuf::from("./scanlens_data"))
}
