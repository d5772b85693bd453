//! Shared foundational pieces used across the dud data-versioning tool.
//!
//! This crate provides content digests, filesystem probing, lexical path
//! cleaning, and the checkout strategy enum shared by the cache and the
//! stage index.

#![warn(missing_docs)]

pub mod checksum;
pub mod fsutil;
pub mod strategy;

pub use checksum::{checksum, checksum_bytes, checksum_copy, checksum_file};
pub use fsutil::FileStatus;
pub use strategy::CheckoutStrategy;
