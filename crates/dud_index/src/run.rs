use std::collections::BTreeMap;
use std::path::Path;

use dud_cache::Cache;
use tracing::info;

use crate::error::IndexError;
use crate::index::Index;
use crate::runner::CommandRunner;
use crate::traversal::Traversal;

impl Index {
    /// Runs a stage's command if it is out of date, running upstream stages
    /// first when `recursive` is set.
    ///
    /// A stage is out of date when it has a command but no inputs, when its
    /// definition changed since the last commit, when an orphan input or an
    /// output no longer matches its committed digest, or when an upstream
    /// stage ran. Whether each visited stage was out of date is recorded in
    /// `ran`. Owned inputs are not checked in single-stage mode.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        stage_path: &str,
        cache: &dyn Cache,
        root: &Path,
        runner: &dyn CommandRunner,
        recursive: bool,
        ran: &mut BTreeMap<String, bool>,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        if !traversal.enter(stage_path)? {
            return Ok(());
        }
        let stage = self.stage(stage_path)?;
        let has_command = stage.command.is_some();

        let mut do_run = has_command && stage.inputs.is_empty();
        if !do_run {
            do_run = stage.checksum.is_empty() || stage.calculate_checksum()? != stage.checksum;
        }

        for (path, input) in &stage.inputs {
            match self.owner_of(path) {
                None => {
                    do_run |= !cache.status(root, input, true)?.contents_match;
                }
                Some(owner) if recursive => {
                    self.run(&owner, cache, root, runner, recursive, ran, traversal)?;
                    do_run |= ran.get(&owner).copied().unwrap_or(false);
                }
                Some(_) => {}
            }
        }
        if !do_run {
            for output in stage.outputs.values() {
                if !cache.status(root, output, true)?.contents_match {
                    do_run = true;
                    break;
                }
            }
        }

        if do_run && has_command {
            runner.run(stage_path, stage, root)?;
        } else {
            info!(stage = stage_path, "nothing to do");
        }
        ran.insert(stage_path.to_string(), do_run);
        traversal.leave(stage_path);
        Ok(())
    }
}
