use std::path::Path;

use dud_cache::Cache;
use dud_common::CheckoutStrategy;
use tracing::info;

use crate::error::IndexError;
use crate::index::Index;
use crate::traversal::Traversal;

impl Index {
    /// Commits a stage's outputs and records its input digests, committing
    /// upstream stages first when `recursive` is set.
    ///
    /// Orphan inputs are hashed in place as `skip_cache` artifacts. Inputs
    /// owned by another stage take that stage's current output digest. The
    /// stage's checksum is recomputed and the stage is only updated in the
    /// index once all of this has succeeded.
    pub fn commit(
        &mut self,
        stage_path: &str,
        cache: &dyn Cache,
        root: &Path,
        strategy: CheckoutStrategy,
        recursive: bool,
        traversal: &mut Traversal,
    ) -> Result<(), IndexError> {
        if !traversal.enter(stage_path)? {
            return Ok(());
        }
        let mut stage = self.stage(stage_path)?.clone();

        for (path, input) in stage.inputs.iter_mut() {
            let Some(owner) = self.owner_of(path) else {
                input.skip_cache = true;
                cache.commit(root, input, strategy)?;
                continue;
            };
            if recursive {
                self.commit(&owner, cache, root, strategy, recursive, traversal)?;
            }
            if let Some((_, upstream)) = self.find_owner(path) {
                input.digest = upstream.digest.clone();
            }
        }

        info!(stage = stage_path, "committing stage");
        for output in stage.outputs.values_mut() {
            cache.commit(root, output, strategy)?;
        }
        stage.checksum = stage.calculate_checksum()?;
        self.stages.insert(stage_path.to_string(), stage);

        traversal.leave(stage_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{stage, MockCache};

    fn commit(
        index: &mut Index,
        cache: &MockCache,
        path: &str,
        recursive: bool,
    ) -> Result<Traversal, IndexError> {
        let mut traversal = Traversal::new();
        index.commit(
            path,
            cache,
            Path::new("/proj"),
            CheckoutStrategy::Link,
            recursive,
            &mut traversal,
        )?;
        Ok(traversal)
    }

    #[test]
    fn orphan_input_is_hashed_not_cached() {
        let mut index = Index::new();
        index
            .add("s.yaml", stage(Some("make"), &["raw.csv"], &["out.bin"]))
            .unwrap();
        let cache = MockCache::with_files(&[("raw.csv", "aaa111"), ("out.bin", "bbb222")]);

        commit(&mut index, &cache, "s.yaml", true).unwrap();

        let s = index.get("s.yaml").unwrap();
        assert_eq!(s.inputs["raw.csv"].digest, "aaa111");
        assert!(s.inputs["raw.csv"].skip_cache);
        assert_eq!(s.outputs["out.bin"].digest, "bbb222");
        assert_eq!(s.checksum, s.calculate_checksum().unwrap());
        assert_eq!(cache.calls(), ["commit raw.csv", "commit out.bin"]);
    }

    #[test]
    fn upstream_committed_first_and_digest_borrowed() {
        let mut index = Index::new();
        index
            .add("foo.yaml", stage(Some("gen"), &[], &["foo.bin"]))
            .unwrap();
        index
            .add("bar.yaml", stage(Some("use"), &["foo.bin"], &["bar.bin"]))
            .unwrap();
        let cache = MockCache::with_files(&[("foo.bin", "f00f00"), ("bar.bin", "ba7ba7")]);

        let traversal = commit(&mut index, &cache, "bar.yaml", true).unwrap();

        assert_eq!(cache.calls(), ["commit foo.bin", "commit bar.bin"]);
        assert_eq!(index.get("bar.yaml").unwrap().inputs["foo.bin"].digest, "f00f00");
        assert!(!index.get("foo.yaml").unwrap().checksum.is_empty());
        assert_eq!(traversal.done.len(), 2);
        assert!(traversal.in_progress.is_empty());
    }

    #[test]
    fn single_stage_leaves_upstream_alone() {
        let mut index = Index::new();
        let mut foo = stage(Some("gen"), &[], &["foo.bin"]);
        foo.outputs.get_mut("foo.bin").unwrap().digest = "old000".to_string();
        index.add("foo.yaml", foo).unwrap();
        index
            .add("bar.yaml", stage(Some("use"), &["foo.bin"], &["bar.bin"]))
            .unwrap();
        let cache = MockCache::with_files(&[("foo.bin", "new000"), ("bar.bin", "ba7ba7")]);

        commit(&mut index, &cache, "bar.yaml", false).unwrap();

        assert_eq!(cache.calls(), ["commit bar.bin"]);
        assert_eq!(index.get("bar.yaml").unwrap().inputs["foo.bin"].digest, "old000");
        assert!(index.get("foo.yaml").unwrap().checksum.is_empty());
    }

    #[test]
    fn cycle_is_detected() {
        // a -> c, b -> a, c -> b, c -> d
        let mut index = Index::new();
        index
            .add("a.yaml", stage(Some("a"), &["c.out"], &["a.out"]))
            .unwrap();
        index
            .add("b.yaml", stage(Some("b"), &["a.out"], &["b.out"]))
            .unwrap();
        index
            .add("c.yaml", stage(Some("c"), &["b.out", "d.out"], &["c.out"]))
            .unwrap();
        index.add("d.yaml", stage(Some("d"), &[], &["d.out"])).unwrap();
        let cache = MockCache::with_files(&[
            ("a.out", "a0a0"),
            ("b.out", "b0b0"),
            ("c.out", "c0c0"),
            ("d.out", "d0d0"),
        ]);

        let mut traversal = Traversal::new();
        let err = index
            .commit(
                "c.yaml",
                &cache,
                Path::new("/proj"),
                CheckoutStrategy::Link,
                true,
                &mut traversal,
            )
            .unwrap_err();

        assert!(matches!(err, IndexError::CycleDetected { stage } if stage == "c.yaml"));
        let expected: Vec<&str> = vec!["a.yaml", "b.yaml", "c.yaml"];
        assert_eq!(traversal.in_progress.iter().collect::<Vec<_>>(), expected);
        assert!(traversal.done.is_empty());
        assert!(cache.calls().is_empty());
        assert!(index.iter().all(|(_, s)| s.checksum.is_empty()));
    }

    #[test]
    fn unknown_stage() {
        let mut index = Index::new();
        let cache = MockCache::default();
        let err = commit(&mut index, &cache, "nope.yaml", true).unwrap_err();
        assert!(matches!(err, IndexError::UnknownStage { stage } if stage == "nope.yaml"));
    }

    #[test]
    fn failed_output_leaves_stage_unchanged() {
        let mut index = Index::new();
        index
            .add("s.yaml", stage(Some("make"), &["raw.csv"], &["out.bin"]))
            .unwrap();
        let cache = MockCache::with_files(&[("raw.csv", "aaa111")]);

        let err = commit(&mut index, &cache, "s.yaml", true).unwrap_err();

        assert!(matches!(err, IndexError::Cache(_)));
        let s = index.get("s.yaml").unwrap();
        assert!(s.inputs["raw.csv"].digest.is_empty());
        assert!(s.checksum.is_empty());
    }
}
