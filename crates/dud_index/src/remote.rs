use dud_cache::{Artifact, Cache, CacheError};
use tracing::info;

use crate::error::IndexError;
use crate::index::Index;
use crate::traversal::Traversal;

impl Index {
    /// Downloads the blobs of a stage's outputs from `remote`, along with
    /// those of its upstream stages when `recursive` is set.
    pub fn fetch(
        &self,
        stage_path: &str,
        cache: &dyn Cache,
        remote: &str,
        recursive: bool,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        self.transfer(stage_path, recursive, traversal, &|stage_path, outputs| {
            info!(stage = stage_path, remote, "fetching stage");
            cache.fetch(remote, outputs)
        })
    }

    /// Uploads the blobs of a stage's outputs to `remote`, along with those
    /// of its upstream stages when `recursive` is set.
    pub fn push(
        &self,
        stage_path: &str,
        cache: &dyn Cache,
        remote: &str,
        recursive: bool,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        self.transfer(stage_path, recursive, traversal, &|stage_path, outputs| {
            info!(stage = stage_path, remote, "pushing stage");
            cache.push(remote, outputs)
        })
    }

    fn transfer(
        &self,
        stage_path: &str,
        recursive: bool,
        traversal: &mut Traversal,
        op: &dyn Fn(&str, &[&Artifact]) -> Result<(), CacheError>,
    ) -> Result<(), IndexError> {
        if !traversal.enter(stage_path)? {
            return Ok(());
        }
        let stage = self.stage(stage_path)?;
        if recursive {
            for path in stage.inputs.keys() {
                if let Some(owner) = self.owner_of(path) {
                    self.transfer(&owner, recursive, traversal, op)?;
                }
            }
        }
        let outputs: Vec<&Artifact> = stage.outputs.values().collect();
        op(stage_path, &outputs)?;
        traversal.leave(stage_path);
        Ok(())
    }
}
