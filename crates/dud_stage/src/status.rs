//! Status of a stage definition and its artifacts.

use std::collections::BTreeMap;

use dud_cache::ArtifactStatus;
use serde::Serialize;

/// Status of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageStatus {
    /// The stage has been committed at least once.
    pub has_checksum: bool,
    /// The stored checksum matches the current definition.
    pub checksum_matches: bool,
    /// Status of each artifact, keyed by path.
    pub artifacts: BTreeMap<String, ArtifactStatus>,
}

impl StageStatus {
    /// One-line description of the stage definition itself.
    pub fn definition_message(&self) -> &'static str {
        match (self.has_checksum, self.checksum_matches) {
            (false, _) => "not checksummed",
            (true, true) => "up-to-date",
            (true, false) => "modified",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_messages() {
        let mut status = StageStatus::default();
        assert_eq!(status.definition_message(), "not checksummed");
        status.has_checksum = true;
        assert_eq!(status.definition_message(), "modified");
        status.checksum_matches = true;
        assert_eq!(status.definition_message(), "up-to-date");
    }
}
