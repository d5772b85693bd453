//! `dud init`: project setup.

use std::path::Path;

use anyhow::Context;
use dud_project::{Project, RCLONE_CONFIG};

use crate::GlobalArgs;

/// Runs `dud init` in the current directory.
pub fn run(global: &GlobalArgs) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    init_in(&cwd, global)
}

fn init_in(dir: &Path, global: &GlobalArgs) -> anyhow::Result<i32> {
    Project::init(dir).with_context(|| format!("failed to initialize {}", dir.display()))?;
    if !global.quiet {
        eprintln!("  Initialized dud project in {}", dir.display());
        eprintln!("  Configure a remote in {RCLONE_CONFIG} and set it with `dud config set remote <remote>`");
    }
    Ok(0)
}
