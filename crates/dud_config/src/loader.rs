//! Configuration file loading and editing.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::types::{ConfigLayer, ProjectConfig};

/// Location of the project configuration, relative to the project root.
pub const CONFIG_FILE: &str = ".dud/config";

/// Returns the per-user configuration file path, if a home can be determined.
///
/// Uses `$XDG_CONFIG_HOME/dud/config.yaml`, falling back to
/// `$HOME/.config/dud/config.yaml`.
pub fn user_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("dud").join("config.yaml"))
}

/// Loads the effective configuration for the project rooted at `project_root`.
///
/// The user configuration is read first if it exists; `.dud/config` overrides
/// it key by key.
pub fn load_config(project_root: &Path) -> Result<ProjectConfig, ConfigError> {
    load_layered(project_root, user_config_path().as_deref())
}

/// Like [`load_config`], with an explicit user configuration file.
pub fn load_layered(
    project_root: &Path,
    user_config: Option<&Path>,
) -> Result<ProjectConfig, ConfigError> {
    let user = match user_config {
        Some(path) if path.is_file() => {
            debug!(path = %path.display(), "reading user config");
            read_layer(path)?
        }
        _ => ConfigLayer::default(),
    };
    let project = read_layer(&project_root.join(CONFIG_FILE))?;
    let config = ProjectConfig::from(project.over(user));
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates a single configuration document.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config = ProjectConfig::from(parse_layer(content)?);
    validate_config(&config)?;
    Ok(config)
}

fn read_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_layer(&content)
}

fn parse_layer(content: &str) -> Result<ConfigLayer, ConfigError> {
    // An empty document is a valid, empty configuration.
    if content.trim().is_empty() {
        return Ok(ConfigLayer::default());
    }
    serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.cache.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cache directory must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Returns the effective value of `key`, or `None` if it is unset.
pub fn get_value(config: &ProjectConfig, key: &str) -> Result<Option<String>, ConfigError> {
    match key {
        "cache" => Ok(Some(config.cache.clone())),
        "remote" => Ok(config.remote.clone()),
        other => Err(ConfigError::UnknownKey(other.to_string())),
    }
}

/// Sets `key` to `value` in the project's `.dud/config`, preserving other keys.
pub fn set_value(project_root: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    let path = project_root.join(CONFIG_FILE);
    let mut layer = if path.is_file() {
        read_layer(&path)?
    } else {
        ConfigLayer::default()
    };
    match key {
        "cache" => layer.cache = Some(value.to_string()),
        "remote" => layer.remote = Some(value.to_string()),
        other => return Err(ConfigError::UnknownKey(other.to_string())),
    }
    validate_config(&ProjectConfig::from(layer.clone()))?;
    let yaml = serde_yaml::to_string(&layer).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(&path, yaml).map_err(|source| ConfigError::Io { path, source })
}
