//! Tracked artifacts and their status reports.
//!
//! An [`Artifact`] is a file or directory that a stage reads or produces. Once
//! committed it carries the digest of its contents (for a directory, the digest
//! of its [`DirectoryManifest`](crate::manifest::DirectoryManifest)).
//! [`ArtifactStatus`] describes how the workspace copy relates to the cache and
//! renders the one-line messages shown by `dud status`.

use std::collections::BTreeMap;
use std::fmt;

use dud_common::FileStatus;
use serde::{Deserialize, Serialize};

/// A file or directory tracked by a stage.
///
/// Serialized with the keys `checksum`, `path`, `is-dir`, `disable-recursion`
/// and `skip-cache`; empty strings and `false` flags are omitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    /// Hex digest of the committed contents; empty until first commit.
    #[serde(rename = "checksum", default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    /// Path relative to the project root; for manifest entries, the
    /// basename within the parent directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Whether the artifact is a directory.
    #[serde(rename = "is-dir", default, skip_serializing_if = "is_false")]
    pub is_dir: bool,
    /// For directories: track only immediate files, ignore subdirectories.
    #[serde(rename = "disable-recursion", default, skip_serializing_if = "is_false")]
    pub disable_recursion: bool,
    /// Track the digest only; never store the contents in the cache.
    #[serde(rename = "skip-cache", default, skip_serializing_if = "is_false")]
    pub skip_cache: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Artifact {
    /// Creates an uncommitted file artifact.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Creates an uncommitted, recursive directory artifact.
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            ..Self::default()
        }
    }

    /// Returns `true` once the artifact has been committed at least once.
    pub fn has_digest(&self) -> bool {
        !self.digest.is_empty()
    }
}

/// The relationship between an artifact's workspace copy and the cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArtifactStatus {
    /// The artifact this status describes.
    pub artifact: Artifact,
    /// What currently exists at the artifact's workspace path.
    pub workspace_status: FileStatus,
    /// The artifact carries a well-formed digest.
    pub has_digest: bool,
    /// A blob for the digest exists in the cache.
    pub digest_in_cache: bool,
    /// The workspace contents correspond to the digest.
    pub contents_match: bool,
    /// For directories: statuses of entries, keyed by basename.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, ArtifactStatus>,
}

impl ArtifactStatus {
    /// Creates a status with nothing known about `artifact` yet.
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            workspace_status: FileStatus::Absent,
            has_digest: false,
            digest_in_cache: false,
            contents_match: false,
            children: BTreeMap::new(),
        }
    }

    /// Summarizes a directory status as `"<n>x <message>"` counts.
    ///
    /// Child directories count as `directory`; everything else counts under
    /// its rendered message. Groups are ordered by descending count, then
    /// lexically.
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for child in self.children.values() {
            let key = if child.artifact.is_dir {
                "directory".to_string()
            } else {
                child.to_string()
            };
            *counts.entry(key).or_default() += 1;
        }
        let mut groups: Vec<(String, usize)> = counts.into_iter().collect();
        groups.sort_by(|(a_msg, a_n), (b_msg, b_n)| b_n.cmp(a_n).then_with(|| a_msg.cmp(b_msg)));
        groups
            .iter()
            .map(|(msg, n)| format!("{n}x {msg}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn file_message(&self) -> String {
        match self.workspace_status {
            FileStatus::Absent => self.absent_message().to_string(),
            FileStatus::RegularFile if self.artifact.skip_cache => {
                format!("{} (not cached)", self.regular_message())
            }
            state if self.artifact.skip_cache => {
                format!("incorrect file type: {state} (not cached)")
            }
            FileStatus::RegularFile => self.regular_message().to_string(),
            FileStatus::Link => self.link_message().to_string(),
            FileStatus::Directory => format!("incorrect file type: {}", FileStatus::Directory),
            FileStatus::Other => "invalid file type".to_string(),
        }
    }

    fn absent_message(&self) -> &'static str {
        if !self.has_digest {
            "unknown artifact"
        } else if self.digest_in_cache {
            "missing from workspace"
        } else {
            "missing from cache and workspace"
        }
    }

    fn regular_message(&self) -> &'static str {
        if !self.has_digest {
            "not committed"
        } else if !self.artifact.skip_cache && !self.digest_in_cache {
            "missing from cache"
        } else if self.contents_match {
            "up-to-date"
        } else {
            "modified"
        }
    }

    fn link_message(&self) -> &'static str {
        if !self.has_digest {
            "link with no checksum"
        } else if !self.digest_in_cache {
            "broken link"
        } else if self.contents_match {
            "up-to-date (link)"
        } else {
            "incorrect link"
        }
    }

    fn dir_message(&self) -> String {
        match self.workspace_status {
            FileStatus::Absent => self.absent_message().to_string(),
            FileStatus::Directory => {
                let message = if !self.has_digest {
                    "not committed"
                } else if !self.digest_in_cache {
                    "missing from cache"
                } else if self.contents_match {
                    "up-to-date"
                } else {
                    "modified"
                };
                message.to_string()
            }
            state => format!("incorrect file type: {state}"),
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artifact.is_dir {
            f.write_str(&self.dir_message())
        } else {
            f.write_str(&self.file_message())
        }
    }
}
