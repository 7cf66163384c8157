use std::path::Path;
use tracing::{debug, info};

use super::ChunkerConfig;
use crate::error::{AppError, Result};

/// Load configuration from a JSON file
///
/// Missing keys fall back to their defaults; the result is validated.
pub fn load_config(path: &Path) -> Result<ChunkerConfig> {
    let raw = std::fs::read(path).map_err(|e| {
        AppError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    let config: ChunkerConfig = serde_json::from_slice(&raw)?;
    config.validate()?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write configuration as pretty JSON, creating the parent directory
pub fn save_config(path: &Path, config: &ChunkerConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(config)?;
    std::fs::write(path, json)?;
    debug!("Saved configuration to {}", path.display());
    Ok(())
}
