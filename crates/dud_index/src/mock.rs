//! In-memory test doubles for the cache and command runner.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dud_cache::{digest_path, Artifact, ArtifactStatus, Cache, CacheError};
use dud_common::{CheckoutStrategy, FileStatus};
use dud_stage::Stage;

use crate::error::IndexError;
use crate::runner::CommandRunner;

/// Builds a stage from plain file paths.
pub(crate) fn stage(command: Option<&str>, inputs: &[&str], outputs: &[&str]) -> Stage {
    let mut stage = Stage {
        command: command.map(str::to_string),
        ..Stage::default()
    };
    for path in inputs {
        let mut art = Artifact::file(*path);
        art.skip_cache = true;
        stage.inputs.insert(path.to_string(), art);
    }
    for path in outputs {
        stage.outputs.insert(path.to_string(), Artifact::file(*path));
    }
    stage
}

/// A cache whose workspace is a map from artifact path to current digest.
#[derive(Default)]
pub(crate) struct MockCache {
    pub workspace: RefCell<BTreeMap<String, String>>,
    pub calls: RefCell<Vec<String>>,
}

impl MockCache {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let cache = Self::default();
        for (path, digest) in files {
            cache.set(path, digest);
        }
        cache
    }

    pub fn set(&self, path: &str, digest: &str) {
        self.workspace
            .borrow_mut()
            .insert(path.to_string(), digest.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, op: &str, path: &str) {
        self.calls.borrow_mut().push(format!("{op} {path}"));
    }
}

impl Cache for MockCache {
    fn commit(
        &self,
        _workspace_dir: &Path,
        artifact: &mut Artifact,
        _strategy: CheckoutStrategy,
    ) -> Result<(), CacheError> {
        self.record("commit", &artifact.path);
        let digest = self
            .workspace
            .borrow()
            .get(&artifact.path)
            .cloned()
            .ok_or_else(|| CacheError::NotFound {
                path: PathBuf::from(&artifact.path),
            })?;
        artifact.digest = digest;
        Ok(())
    }

    fn checkout(
        &self,
        _workspace_dir: &Path,
        artifact: &Artifact,
        _strategy: CheckoutStrategy,
    ) -> Result<(), CacheError> {
        self.record("checkout", &artifact.path);
        Ok(())
    }

    fn status(
        &self,
        _workspace_dir: &Path,
        artifact: &Artifact,
        _short_circuit: bool,
    ) -> Result<ArtifactStatus, CacheError> {
        self.record("status", &artifact.path);
        let mut status = ArtifactStatus::new(artifact.clone());
        status.has_digest = artifact.has_digest();
        status.digest_in_cache = status.has_digest;
        if let Some(current) = self.workspace.borrow().get(&artifact.path) {
            status.workspace_status = FileStatus::RegularFile;
            status.contents_match = *current == artifact.digest;
        }
        Ok(status)
    }

    fn fetch(&self, _remote: &str, artifacts: &[&Artifact]) -> Result<(), CacheError> {
        for art in artifacts {
            self.record("fetch", &art.path);
        }
        Ok(())
    }

    fn push(&self, _remote: &str, artifacts: &[&Artifact]) -> Result<(), CacheError> {
        for art in artifacts {
            self.record("push", &art.path);
        }
        Ok(())
    }

    fn path_for_digest(&self, digest: &str) -> Result<PathBuf, CacheError> {
        digest_path(digest)
    }
}

/// Records which stages were asked to run and optionally fails some.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    pub ran: RefCell<Vec<String>>,
    pub failing: Vec<String>,
}

impl CommandRunner for RecordingRunner {
    fn run(&self, stage_path: &str, _stage: &Stage, _root: &Path) -> Result<(), IndexError> {
        self.ran.borrow_mut().push(stage_path.to_string());
        if self.failing.iter().any(|s| s == stage_path) {
            return Err(IndexError::CommandFailed {
                stage: stage_path.to_string(),
                reason: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}
