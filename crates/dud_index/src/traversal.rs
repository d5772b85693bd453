//! Bookkeeping shared by every depth-first walk of the stage graph.

use std::collections::BTreeSet;

use crate::error::IndexError;

/// Visit state for one traversal of the stage graph.
///
/// A stage moves into `in_progress` when the walk enters it and into `done`
/// once all of its upstream stages and its own work have completed. Reaching a
/// stage that is still in progress means the graph has a cycle. After a failed
/// traversal, `in_progress` holds the stages on the path that was being
/// walked, which for a cycle is exactly the cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traversal {
    /// Stages whose work has completed.
    pub done: BTreeSet<String>,
    /// Stages currently being walked.
    pub in_progress: BTreeSet<String>,
}

impl Traversal {
    /// Creates an empty traversal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `stage` as entered. Returns `false` if it is already done.
    pub(crate) fn enter(&mut self, stage: &str) -> Result<bool, IndexError> {
        if self.done.contains(stage) {
            return Ok(false);
        }
        if !self.in_progress.insert(stage.to_string()) {
            return Err(IndexError::CycleDetected {
                stage: stage.to_string(),
            });
        }
        Ok(true)
    }

    /// Marks `stage` as done.
    pub(crate) fn leave(&mut self, stage: &str) {
        self.in_progress.remove(stage);
        self.done.insert(stage.to_string());
    }
}
