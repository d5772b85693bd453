//! `dud status`: print the state of stages and their artifacts.
//!
//! The default output is an aligned two-column table:
//!
//! ```text
//! train.yaml   stage definition up-to-date
//!   data       up-to-date (5x up-to-date (link))
//!   model.bin  modified
//! ```
//!
//! With `--debug`, the full status map is printed as JSON instead.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use dud_stage::StageStatus;

use crate::pipeline::{open_project, project_paths};
use crate::StatusArgs;

/// Gap between the path column and the status column.
const PADDING: usize = 2;

/// Runs `dud status`.
pub fn run(args: &StatusArgs) -> anyhow::Result<i32> {
    let project = open_project()?;
    let stages = project_paths(&project, &args.selection.stages)?;
    let statuses = project.status(&stages, !args.selection.single_stage)?;
    if args.debug {
        println!("{}", serde_json::to_string(&statuses)?);
    } else {
        print!("{}", render(&statuses));
    }
    Ok(0)
}

/// Formats stage statuses as an aligned table, one blank line after each
/// stage.
pub fn render(statuses: &BTreeMap<String, StageStatus>) -> String {
    let mut rows: Vec<Option<(String, String)>> = Vec::new();
    for (stage_path, status) in statuses {
        rows.push(Some((
            stage_path.clone(),
            format!("stage definition {}", status.definition_message()),
        )));
        for (path, artifact) in &status.artifacts {
            let mut message = artifact.to_string();
            if artifact.artifact.is_dir && !artifact.children.is_empty() {
                message = format!("{message} ({})", artifact.summary());
            }
            rows.push(Some((format!("  {path}"), message)));
        }
        rows.push(None);
    }

    let width = rows
        .iter()
        .flatten()
        .map(|(left, _)| left.chars().count())
        .max()
        .unwrap_or(0)
        + PADDING;
    let mut out = String::new();
    for row in rows {
        match row {
            Some((left, right)) => {
                let _ = writeln!(out, "{left:<width$}{right}");
            }
            None => out.push('\n'),
        }
    }
    out
}
