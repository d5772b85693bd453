//! Directory manifests stored as cache blobs.
//!
//! Committing a directory stores one manifest per directory level. The
//! manifest lists every tracked entry by basename, and its canonical JSON
//! encoding is itself hashed and stored like any other blob. Identical trees
//! therefore always produce identical directory digests.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::CacheError;

/// The recorded contents of one committed directory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryManifest {
    /// Path of the directory, relative to where it was committed from.
    #[serde(rename = "Path")]
    pub path: String,
    /// Child artifacts keyed by basename.
    #[serde(rename = "Contents")]
    pub contents: BTreeMap<String, Artifact>,
}

impl DirectoryManifest {
    /// Creates an empty manifest for the directory at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: BTreeMap::new(),
        }
    }

    /// Encodes the manifest to its canonical byte form.
    ///
    /// Keys are emitted in sorted order with no insignificant whitespace and a
    /// single trailing newline.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, CacheError> {
        let mut bytes = serde_json::to_vec(self).map_err(|e| CacheError::ManifestParse {
            path: self.path.clone().into(),
            reason: e.to_string(),
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Reads and decodes the manifest blob at `blob_path`.
    pub fn load(blob_path: &Path) -> Result<Self, CacheError> {
        let bytes = std::fs::read(blob_path).map_err(CacheError::io(blob_path))?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::ManifestParse {
            path: blob_path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
