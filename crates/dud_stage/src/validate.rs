//! Structural checks on stage definitions.

use std::collections::BTreeMap;
use std::path::Path;

use dud_cache::Artifact;
use dud_common::fsutil;

use crate::error::StageError;
use crate::stage::Stage;

impl Stage {
    /// Checks that the stage definition is well formed.
    ///
    /// Rejects working directories and artifact paths that are absolute or
    /// escape the project root, stages with no artifacts at all, paths that
    /// are both input and output, and artifacts nested inside a directory
    /// artifact of the same stage.
    pub fn validate(&self) -> Result<(), StageError> {
        check_relative("working directory", &self.working_dir)?;
        if self.inputs.is_empty() && self.outputs.is_empty() {
            return Err(StageError::invalid("declared no inputs and no outputs"));
        }

        let mut all: BTreeMap<&str, &Artifact> = BTreeMap::new();
        for (path, art) in &self.outputs {
            if self.inputs.contains_key(path) {
                return Err(StageError::invalid(format!(
                    "artifact {path} is both an input and an output"
                )));
            }
            all.insert(path, art);
        }
        for (path, art) in &self.inputs {
            all.insert(path, art);
        }

        for path in all.keys() {
            check_relative("artifact", path)?;
            if let Some(owner) = find_dir_artifact_owner(path, &all) {
                return Err(StageError::invalid(format!(
                    "artifact {path} conflicts with artifact {}",
                    owner.path
                )));
            }
        }
        Ok(())
    }
}

fn check_relative(what: &str, path: &str) -> Result<(), StageError> {
    if Path::new(path).is_absolute() {
        return Err(StageError::invalid(format!("{what} {path} is an absolute path")));
    }
    if fsutil::escapes_root(&fsutil::clean_path(path)) {
        return Err(StageError::invalid(format!(
            "{what} {path} is outside of the project root"
        )));
    }
    Ok(())
}

/// Finds the directory artifact in `artifacts` that contains `path`.
///
/// Ancestors are searched from the top down. A recursive directory owns
/// everything beneath it; a non-recursive one only owns its immediate
/// children.
pub fn find_dir_artifact_owner<'a>(
    path: &str,
    artifacts: &BTreeMap<&str, &'a Artifact>,
) -> Option<&'a Artifact> {
    let parent = Path::new(path).parent()?.to_str()?;
    let mut ancestor = String::new();
    for part in parent.split('/').filter(|part| !part.is_empty()) {
        if !ancestor.is_empty() {
            ancestor.push('/');
        }
        ancestor.push_str(part);
        if let Some(&owner) = artifacts.get(ancestor.as_str()) {
            if owner.is_dir && (!owner.disable_recursion || ancestor == parent) {
                return Some(owner);
            }
        }
    }
    None
}
