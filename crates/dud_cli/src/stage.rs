//! `dud stage gen` and `dud stage add`.

use std::path::Path;

use crate::pipeline::{open_project, project_paths};
use crate::{AddArgs, StageGenArgs};

/// Runs `dud stage gen`, printing the generated stage file to stdout.
///
/// Artifact paths and the working directory are taken relative to the
/// current directory and stored relative to the project root.
pub fn generate(args: &StageGenArgs) -> anyhow::Result<i32> {
    let project = open_project()?;
    let inputs = project_paths(&project, &args.inputs)?;
    let outputs = project_paths(&project, &args.outputs)?;
    let work_dir = match &args.work_dir {
        Some(dir) => project.project_path(Path::new(dir))?,
        None => String::new(),
    };
    let stage = project.generate_stage(&args.command, &work_dir, &inputs, &outputs)?;
    print!("{}", stage.to_yaml()?);
    Ok(0)
}

/// Runs `dud add` / `dud stage add`.
pub fn add(args: &AddArgs) -> anyhow::Result<i32> {
    let mut project = open_project()?;
    let stages = project_paths(&project, &args.stages)?;
    project.add(&stages)?;
    Ok(0)
}
