//! `dud commit`, `checkout`, `run`, `fetch`, `push`, `pull` and `graph`.
//!
//! Each command discovers the project from the current directory, converts
//! the stage files named on the command line into project-relative paths,
//! and hands them to the matching [`Project`] operation.

use std::path::Path;

use anyhow::Context;
use dud_common::CheckoutStrategy;
use dud_index::ShellRunner;
use dud_project::Project;
use tracing::debug;

use crate::{CheckoutArgs, GraphArgs, StageSelection};

/// Finds the project enclosing the current directory.
pub fn open_project() -> anyhow::Result<Project> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let project = Project::discover(&cwd)?;
    debug!(root = %project.root().display(), "found project");
    Ok(project)
}

/// Converts paths given on the command line into project-relative paths.
pub fn project_paths(project: &Project, paths: &[String]) -> anyhow::Result<Vec<String>> {
    paths
        .iter()
        .map(|path| Ok(project.project_path(Path::new(path))?))
        .collect()
}

/// Runs `dud commit`.
pub fn commit(args: &CheckoutArgs) -> anyhow::Result<i32> {
    let mut project = open_project()?;
    let stages = project_paths(&project, &args.selection.stages)?;
    project.commit(
        &stages,
        CheckoutStrategy::from_copy_flag(args.copy),
        !args.selection.single_stage,
    )?;
    Ok(0)
}

/// Runs `dud checkout`.
pub fn checkout(args: &CheckoutArgs) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.selection.stages)?;
    project.checkout(
        &stages,
        CheckoutStrategy::from_copy_flag(args.copy),
        !args.selection.single_stage,
    )?;
    Ok(0)
}

/// Runs `dud run`.
pub fn run(args: &StageSelection) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.stages)?;
    let ran = project.run(&stages, &ShellRunner, !args.single_stage)?;
    let count = ran.values().filter(|&&ran| ran).count();
    debug!(ran = count, visited = ran.len(), "run finished");
    Ok(0)
}

/// Runs `dud fetch`.
pub fn fetch(args: &StageSelection) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.stages)?;
    project.fetch(&stages, !args.single_stage)?;
    Ok(0)
}

/// Runs `dud push`.
pub fn push(args: &StageSelection) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.stages)?;
    project.push(&stages, !args.single_stage)?;
    Ok(0)
}

/// Runs `dud pull`.
pub fn pull(args: &CheckoutArgs) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.selection.stages)?;
    project.pull(
        &stages,
        CheckoutStrategy::from_copy_flag(args.copy),
        !args.selection.single_stage,
    )?;
    Ok(0)
}

/// Runs `dud graph`, printing DOT to stdout.
pub fn graph(args: &GraphArgs) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.stages)?;
    let dot = project.graph(&stages, args.stages_only)?;
    print!("{dot}");
    Ok(0)
}
