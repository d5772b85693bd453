//! Execution of stage commands.

use std::path::Path;

use dud_stage::Stage;
use tracing::info;

use crate::error::IndexError;

/// Runs a stage's command.
pub trait CommandRunner {
    /// Runs the command of `stage` from the project `root`, blocking until it
    /// exits. Stages without a command must be treated as a no-op.
    fn run(&self, stage_path: &str, stage: &Stage, root: &Path) -> Result<(), IndexError>;
}

/// Runs commands through the user's shell with inherited standard streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, stage_path: &str, stage: &Stage, root: &Path) -> Result<(), IndexError> {
        let Some(mut cmd) = stage.create_command(root) else {
            return Ok(());
        };
        info!(
            stage = stage_path,
            command = stage.command.as_deref().unwrap_or_default(),
            "running stage"
        );
        let failed = |reason: String| IndexError::CommandFailed {
            stage: stage_path.to_string(),
            reason,
        };
        let status = cmd.status().map_err(|e| failed(e.to_string()))?;
        if !status.success() {
            return Err(failed(status.to_string()));
        }
        Ok(())
    }
}
