//! The set of tracked stages and ownership lookups across them.

use std::collections::BTreeMap;
use std::path::Path;

use dud_cache::Artifact;
use dud_stage::{find_dir_artifact_owner, Stage};
use tracing::debug;

use crate::error::IndexError;

/// Tracked stages, keyed by the stage file's path relative to the project
/// root.
///
/// Every artifact path is owned by at most one stage. An input is owned when
/// it is an output of some stage, or lies inside a directory output that
/// covers it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    pub(crate) stages: BTreeMap<String, Stage>,
}

impl Index {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index file at `index_path`.
    ///
    /// The file lists one stage path per line, relative to `root`; blank lines
    /// are ignored. Each listed stage file is loaded and validated.
    pub fn from_file(root: &Path, index_path: &Path) -> Result<Self, IndexError> {
        let content = std::fs::read_to_string(index_path).map_err(|source| IndexError::Io {
            path: index_path.to_path_buf(),
            source,
        })?;
        let mut index = Self::new();
        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let stage = Stage::from_file(&root.join(line))?;
            index.add(line, stage)?;
        }
        debug!(stages = index.len(), path = %index_path.display(), "loaded index");
        Ok(index)
    }

    /// Writes the stage paths to `index_path`, one per line in sorted order.
    pub fn to_file(&self, index_path: &Path) -> Result<(), IndexError> {
        let mut content = String::new();
        for path in self.stages.keys() {
            content.push_str(path);
            content.push('\n');
        }
        std::fs::write(index_path, content).map_err(|source| IndexError::Io {
            path: index_path.to_path_buf(),
            source,
        })
    }

    /// Adds a stage under `stage_path`.
    ///
    /// Fails if the path is already tracked, or if any output of the new
    /// stage would share ownership of a path with an existing stage.
    pub fn add(&mut self, stage_path: &str, stage: Stage) -> Result<(), IndexError> {
        if self.stages.contains_key(stage_path) {
            return Err(IndexError::AlreadyPresent {
                stage: stage_path.to_string(),
            });
        }
        for path in stage.outputs.keys() {
            if let Some((owner, _)) = self.find_owner(path) {
                return Err(owned(stage_path, path, owner));
            }
        }
        // A new directory output must not swallow an existing output either.
        let new_outputs = artifact_refs(&stage.outputs);
        for (owner, existing) in &self.stages {
            for path in existing.outputs.keys() {
                if find_dir_artifact_owner(path, &new_outputs).is_some() {
                    return Err(owned(stage_path, path, owner));
                }
            }
        }
        self.stages.insert(stage_path.to_string(), stage);
        Ok(())
    }

    /// Removes and returns the stage at `stage_path`.
    pub fn remove(&mut self, stage_path: &str) -> Result<Stage, IndexError> {
        self.stages
            .remove(stage_path)
            .ok_or_else(|| unknown(stage_path))
    }

    /// Returns the stage at `stage_path`, if tracked.
    pub fn get(&self, stage_path: &str) -> Option<&Stage> {
        self.stages.get(stage_path)
    }

    pub(crate) fn stage(&self, stage_path: &str) -> Result<&Stage, IndexError> {
        self.get(stage_path).ok_or_else(|| unknown(stage_path))
    }

    /// Iterates over the tracked stages in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Stage)> {
        self.stages.iter().map(|(path, stage)| (path.as_str(), stage))
    }

    /// Tracked stage paths in sorted order.
    pub fn stage_paths(&self) -> Vec<String> {
        self.stages.keys().cloned().collect()
    }

    /// Number of tracked stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if no stages are tracked.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Finds the stage that owns `artifact_path`, along with the owning
    /// output artifact.
    ///
    /// A direct output match wins; otherwise a directory output that contains
    /// the path owns it (non-recursive directories only own their immediate
    /// children).
    pub fn find_owner(&self, artifact_path: &str) -> Option<(&str, &Artifact)> {
        for (stage_path, stage) in &self.stages {
            if let Some(artifact) = stage.outputs.get(artifact_path) {
                return Some((stage_path, artifact));
            }
        }
        for (stage_path, stage) in &self.stages {
            let outputs = artifact_refs(&stage.outputs);
            if let Some(artifact) = find_dir_artifact_owner(artifact_path, &outputs) {
                return Some((stage_path, artifact));
            }
        }
        None
    }

    /// The path of the stage owning `artifact_path`.
    pub(crate) fn owner_of(&self, artifact_path: &str) -> Option<String> {
        self.find_owner(artifact_path)
            .map(|(stage_path, _)| stage_path.to_string())
    }
}

fn artifact_refs(map: &BTreeMap<String, Artifact>) -> BTreeMap<&str, &Artifact> {
    map.iter().map(|(path, art)| (path.as_str(), art)).collect()
}

fn unknown(stage_path: &str) -> IndexError {
    IndexError::UnknownStage {
        stage: stage_path.to_string(),
    }
}

fn owned(stage_path: &str, artifact: &str, owner: &str) -> IndexError {
    IndexError::ArtifactOwned {
        stage: stage_path.to_string(),
        artifact: artifact.to_string(),
        owner: owner.to_string(),
    }
}
