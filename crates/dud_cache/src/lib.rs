//! Content-addressed artifact cache.
//!
//! This crate stores workspace files and directories as immutable blobs keyed
//! by their BLAKE3 digest, reports how workspace copies compare to what was
//! committed, restores committed artifacts as links or copies, and exchanges
//! blobs with a remote cache.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
mod checkout;
mod commit;
pub mod error;
pub mod manifest;
pub mod progress;
pub mod remote;
mod status;
mod workers;

pub use artifact::{Artifact, ArtifactStatus};
pub use cache::{digest_path, Cache, LocalCache};
pub use error::CacheError;
pub use manifest::DirectoryManifest;
pub use progress::Progress;
pub use remote::{Rclone, RemoteCopy};
pub use workers::{MAX_DEDICATED_WORKERS, MAX_SHARED_WORKERS};
