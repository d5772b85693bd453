//! Configuration data types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Cache location used when no configuration layer sets one.
pub const DEFAULT_CACHE_DIR: &str = ".dud/cache";

/// One configuration file as written on disk; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    /// Cache directory, relative to the project root unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    /// Remote passed verbatim to the remote-copy tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl ConfigLayer {
    /// Returns `self` with any unset key taken from `base`.
    pub fn over(self, base: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            cache: self.cache.or(base.cache),
            remote: self.remote.or(base.remote),
        }
    }
}

/// Effective project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Cache directory as configured.
    pub cache: String,
    /// Default remote for fetch and push, if any.
    pub remote: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            cache: DEFAULT_CACHE_DIR.to_string(),
            remote: None,
        }
    }
}

impl From<ConfigLayer> for ProjectConfig {
    fn from(layer: ConfigLayer) -> Self {
        Self {
            cache: layer.cache.unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()),
            remote: layer.remote,
        }
    }
}

impl ProjectConfig {
    /// Resolves the cache directory against the project root.
    pub fn cache_dir(&self, project_root: &Path) -> PathBuf {
        let cache = Path::new(&self.cache);
        if cache.is_absolute() {
            cache.to_path_buf()
        } else {
            project_root.join(cache)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_dir() {
        let config = ProjectConfig::default();
        assert_eq!(config.cache, ".dud/cache");
        assert_eq!(
            config.cache_dir(Path::new("/proj")),
            PathBuf::from("/proj/.dud/cache")
        );
    }

    #[test]
    fn absolute_cache_dir_is_kept() {
        let config = ProjectConfig {
            cache: "/mnt/shared/cache".to_string(),
            remote: None,
        };
        assert_eq!(
            config.cache_dir(Path::new("/proj")),
            PathBuf::from("/mnt/shared/cache")
        );
    }

    #[test]
    fn upper_layer_wins() {
        let user = ConfigLayer {
            cache: Some("/home/u/cache".to_string()),
            remote: Some("s3:bucket".to_string()),
        };
        let project = ConfigLayer {
            cache: None,
            remote: Some("gdrive:dud".to_string()),
        };
        let merged = ProjectConfig::from(project.over(user));
        assert_eq!(merged.cache, "/home/u/cache");
        assert_eq!(merged.remote.as_deref(), Some("gdrive:dud"));
    }
}
