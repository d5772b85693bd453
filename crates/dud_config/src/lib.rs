//! Loading and editing of dud project configuration.
//!
//! A project is configured by `.dud/config`, a YAML mapping layered on top of
//! an optional per-user file. The result is a strongly-typed [`ProjectConfig`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{
    get_value, load_config, load_config_from_str, load_layered, set_value, user_config_path,
    CONFIG_FILE,
};
pub use types::{ConfigLayer, ProjectConfig, DEFAULT_CACHE_DIR};
