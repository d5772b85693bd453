use std::collections::BTreeMap;
use std::path::Path;

use dud_cache::Cache;
use dud_stage::StageStatus;

use crate::error::IndexError;
use crate::index::Index;
use crate::traversal::Traversal;

impl Index {
    /// Collects the status of a stage into `out`, along with its upstream
    /// stages when `recursive` is set.
    ///
    /// Orphan inputs are reported under the stage that reads them; owned
    /// inputs are reported by their owner.
    pub fn status(
        &self,
        stage_path: &str,
        cache: &dyn Cache,
        root: &Path,
        recursive: bool,
        out: &mut BTreeMap<String, StageStatus>,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        if !traversal.enter(stage_path)? {
            return Ok(());
        }
        let stage = self.stage(stage_path)?;
        let mut status = StageStatus {
            has_checksum: !stage.checksum.is_empty(),
            ..StageStatus::default()
        };
        if status.has_checksum {
            status.checksum_matches = stage.calculate_checksum()? == stage.checksum;
        }

        for (path, input) in &stage.inputs {
            match self.owner_of(path) {
                None => {
                    let art_status = cache.status(root, input, false)?;
                    status.artifacts.insert(path.clone(), art_status);
                }
                Some(owner) if recursive => {
                    self.status(&owner, cache, root, recursive, out, traversal)?;
                }
                Some(_) => {}
            }
        }
        for (path, output) in &stage.outputs {
            let art_status = cache.status(root, output, false)?;
            status.artifacts.insert(path.clone(), art_status);
        }

        out.insert(stage_path.to_string(), status);
        traversal.leave(stage_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{stage, MockCache};

    fn status(
        index: &Index,
        cache: &MockCache,
        path: &str,
        recursive: bool,
    ) -> Result<BTreeMap<String, StageStatus>, IndexError> {
        let mut out = BTreeMap::new();
        index.status(
            path,
            cache,
            Path::new("/proj"),
            recursive,
            &mut out,
            &mut Traversal::new(),
        )?;
        Ok(out)
    }

    fn committed_pipeline() -> Index {
        let mut index = Index::new();
        let mut foo = stage(Some("gen"), &["seed.txt"], &["foo.bin"]);
        foo.inputs.get_mut("seed.txt").unwrap().digest = "5eed".to_string();
        foo.outputs.get_mut("foo.bin").unwrap().digest = "f00".to_string();
        foo.checksum = foo.calculate_checksum().unwrap();
        index.add("foo.yaml", foo).unwrap();
        let mut bar = stage(Some("use"), &["foo.bin"], &["bar.bin"]);
        bar.outputs.get_mut("bar.bin").unwrap().digest = "ba7".to_string();
        index.add("bar.yaml", bar).unwrap();
        index
    }

    #[test]
    fn recursive_status() {
        let cache = MockCache::with_files(&[
            ("seed.txt", "5eed"),
            ("foo.bin", "f00"),
            ("bar.bin", "xxx"),
        ]);
        let out = status(&committed_pipeline(), &cache, "bar.yaml", true).unwrap();

        assert_eq!(out.len(), 2);
        let foo = &out["foo.yaml"];
        assert_eq!(foo.definition_message(), "up-to-date");
        assert!(foo.artifacts["seed.txt"].contents_match);
        assert!(foo.artifacts["foo.bin"].contents_match);

        let bar = &out["bar.yaml"];
        assert_eq!(bar.definition_message(), "not checksummed");
        assert!(!bar.artifacts.contains_key("foo.bin"));
        assert!(!bar.artifacts["bar.bin"].contents_match);
    }

    #[test]
    fn single_stage_status() {
        let cache = MockCache::with_files(&[("bar.bin", "ba7")]);
        let out = status(&committed_pipeline(), &cache, "bar.yaml", false).unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), ["bar.yaml"]);
        assert_eq!(cache.calls(), ["status bar.bin"]);
    }

    #[test]
    fn modified_definition() {
        let mut index = committed_pipeline();
        let mut foo = index.remove("foo.yaml").unwrap();
        foo.command = Some("gen --fast".to_string());
        index.add("foo.yaml", foo).unwrap();
        let cache = MockCache::default();
        let out = status(&index, &cache, "foo.yaml", true).unwrap();
        assert_eq!(out["foo.yaml"].definition_message(), "modified");
    }

    #[test]
    fn unknown_stage() {
        let cache = MockCache::default();
        let err = status(&committed_pipeline(), &cache, "nope.yaml", true).unwrap_err();
        assert!(matches!(err, IndexError::UnknownStage { .. }));
    }
}
