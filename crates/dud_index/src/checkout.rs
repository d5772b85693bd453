use std::path::Path;

use dud_cache::Cache;
use dud_common::CheckoutStrategy;
use tracing::info;

use crate::error::IndexError;
use crate::index::Index;
use crate::traversal::Traversal;

impl Index {
    /// Checks out a stage's outputs, after those of its upstream stages when
    /// `recursive` is set.
    ///
    /// Orphan inputs are never in the cache and are left alone.
    pub fn checkout(
        &self,
        stage_path: &str,
        cache: &dyn Cache,
        root: &Path,
        strategy: CheckoutStrategy,
        recursive: bool,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        if !traversal.enter(stage_path)? {
            return Ok(());
        }
        let stage = self.stage(stage_path)?;
        if recursive {
            for path in stage.inputs.keys() {
                if let Some(owner) = self.owner_of(path) {
                    self.checkout(&owner, cache, root, strategy, recursive, traversal)?;
                }
            }
        }
        info!(stage = stage_path, %strategy, "checking out stage");
        for output in stage.outputs.values() {
            cache.checkout(root, output, strategy)?;
        }
        traversal.leave(stage_path);
        Ok(())
    }
}
