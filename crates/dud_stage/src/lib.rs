//! Stage definitions.
//!
//! A stage is a reproducible unit of work: an optional shell command together
//! with the artifacts it reads (inputs) and produces (outputs). Each stage lives
//! in its own YAML file. This crate parses and validates stage files, writes
//! them back, and computes the stage checksum used to detect definition drift.

#![warn(missing_docs)]

pub mod error;
pub mod stage;
pub mod status;
pub mod validate;

pub use error::StageError;
pub use stage::Stage;
pub use status::StageStatus;
pub use validate::find_dir_artifact_owner;
