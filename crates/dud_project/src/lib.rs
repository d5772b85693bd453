//! Project-level orchestration for dud.
//!
//! A [`Project`] ties together the `.dud/` directory on disk, the loaded
//! configuration, the local cache and the stage index, and exposes every
//! top-level operation the command line offers.

#![warn(missing_docs)]

pub mod error;
pub mod project;

pub use error::ProjectError;
pub use project::{Project, DUD_DIR, INDEX_FILE, RCLONE_CONFIG};
