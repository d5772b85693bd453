//! The project handle and its top-level operations.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use dud_cache::{Artifact, LocalCache, Rclone, RemoteCopy};
use dud_common::{fsutil, CheckoutStrategy, FileStatus};
use dud_config::{ProjectConfig, CONFIG_FILE, DEFAULT_CACHE_DIR};
use dud_index::{CommandRunner, DotGraph, Index, Traversal};
use dud_stage::{Stage, StageStatus};
use tracing::{debug, info};

use crate::error::ProjectError;

/// Directory that marks a project root.
pub const DUD_DIR: &str = ".dud";

/// The index file, relative to the project root.
pub const INDEX_FILE: &str = ".dud/index";

/// rclone configuration used for `fetch` and `push`.
pub const RCLONE_CONFIG: &str = ".dud/rclone.conf";

const CONFIG_TEMPLATE: &str = "\
# dud project configuration
cache: .dud/cache
# To enable fetch and push, set 'remote' to an rclone remote path, for example
# a bucket called 'dud' on a remote called 's3' in .dud/rclone.conf:
#
# remote: s3:dud
";

const RCLONE_TEMPLATE: &str = "\
# rclone configuration for this project.
# Run 'rclone --config .dud/rclone.conf config' to set up a remote cache, then
# set 'remote' in .dud/config.
";

/// An opened dud project.
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
    cache: LocalCache,
    index: Index,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("stages", &self.index.len())
            .finish()
    }
}

impl Project {
    /// Creates the `.dud` layout in `dir`.
    pub fn init(dir: &Path) -> Result<(), ProjectError> {
        let root = fsutil::absolute(dir).map_err(ProjectError::io(dir))?;
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(ProjectError::AlreadyInitialized { root });
        }
        let cache_dir = root.join(DEFAULT_CACHE_DIR);
        fs::create_dir_all(&cache_dir).map_err(ProjectError::io(&cache_dir))?;
        for (path, content) in [
            (config_path, CONFIG_TEMPLATE),
            (root.join(RCLONE_CONFIG), RCLONE_TEMPLATE),
            (root.join(INDEX_FILE), ""),
        ] {
            fs::write(&path, content).map_err(ProjectError::io(&path))?;
        }
        info!(root = %root.display(), "initialized project");
        Ok(())
    }

    /// Finds the project containing `start` and opens it.
    pub fn discover(start: &Path) -> Result<Self, ProjectError> {
        let start = fsutil::absolute(start).map_err(ProjectError::io(start))?;
        let root = start
            .ancestors()
            .find(|dir| dir.join(DUD_DIR).is_dir())
            .ok_or_else(|| ProjectError::NotInitialized {
                start: start.clone(),
            })?;
        Self::open(root)
    }

    /// Opens the project rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, ProjectError> {
        let root = fsutil::absolute(root).map_err(ProjectError::io(root))?;
        let config = dud_config::load_config(&root)?;
        let cache = LocalCache::new(config.cache_dir(&root))?
            .with_remote(Rclone::new(root.join(RCLONE_CONFIG)));
        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            Index::from_file(&root, &index_path)?
        } else {
            Index::new()
        };
        debug!(root = %root.display(), stages = index.len(), "opened project");
        Ok(Self {
            root,
            config,
            cache,
            index,
        })
    }

    /// Replaces the collaborator used to move blobs to and from the remote.
    pub fn with_remote_copy(self, remote: impl RemoteCopy + 'static) -> Self {
        Self {
            cache: self.cache.with_remote(remote),
            ..self
        }
    }

    /// The project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The effective configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The project's local cache.
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// The stage index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Converts a path given relative to the current directory into a
    /// project-root-relative one.
    pub fn project_path(&self, path: &Path) -> Result<String, ProjectError> {
        let abs = fsutil::absolute(path).map_err(ProjectError::io(path))?;
        let rel = fsutil::relative_path(&self.root, &abs);
        let cleaned = fsutil::clean_path(&rel.to_string_lossy());
        if fsutil::escapes_root(&cleaned) {
            return Err(ProjectError::OutsideProject { path: abs });
        }
        Ok(cleaned)
    }

    /// Writes the index file.
    pub fn save_index(&self) -> Result<(), ProjectError> {
        self.index.to_file(&self.root.join(INDEX_FILE))?;
        Ok(())
    }

    /// Adds the stage files at `stage_paths` to the index and saves it.
    ///
    /// Nothing is saved unless every stage is added.
    pub fn add(&mut self, stage_paths: &[String]) -> Result<(), ProjectError> {
        for path in stage_paths {
            let stage = Stage::from_file(&self.root.join(path))?;
            self.index.add(path, stage)?;
            info!(stage = %path, "added stage");
        }
        self.save_index()
    }

    /// Builds a stage definition from root-relative artifact paths.
    ///
    /// Paths naming existing directories become directory artifacts.
    pub fn generate_stage(
        &self,
        command: &[String],
        working_dir: &str,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<Stage, ProjectError> {
        let mut stage = Stage {
            command: Some(command.join(" ")).filter(|cmd| !cmd.trim().is_empty()),
            working_dir: match fsutil::clean_path(working_dir) {
                dot if dot == "." => String::new(),
                cleaned => cleaned,
            },
            ..Stage::default()
        };
        for path in inputs {
            let mut artifact = self.artifact_for(path)?;
            artifact.skip_cache = true;
            stage.inputs.insert(artifact.path.clone(), artifact);
        }
        for path in outputs {
            let artifact = self.artifact_for(path)?;
            stage.outputs.insert(artifact.path.clone(), artifact);
        }
        stage.validate()?;
        Ok(stage)
    }

    fn artifact_for(&self, path: &str) -> Result<Artifact, ProjectError> {
        let path = fsutil::clean_path(path);
        let full = self.root.join(&path);
        let status = fsutil::file_status(&full).map_err(ProjectError::io(&full))?;
        Ok(if status == FileStatus::Directory {
            Artifact::dir(path)
        } else {
            Artifact::file(path)
        })
    }

    fn targets(&self, stage_paths: &[String]) -> Result<Vec<String>, ProjectError> {
        if self.index.is_empty() {
            return Err(ProjectError::EmptyIndex);
        }
        if stage_paths.is_empty() {
            return Ok(self.index.stage_paths());
        }
        Ok(stage_paths.to_vec())
    }

    fn remote(&self) -> Result<&str, ProjectError> {
        self.config.remote.as_deref().ok_or(ProjectError::NoRemote)
    }

    /// Commits stages (all of them when `stage_paths` is empty), writing each
    /// committed stage file and the index back to disk.
    pub fn commit(
        &mut self,
        stage_paths: &[String],
        strategy: CheckoutStrategy,
        recursive: bool,
    ) -> Result<(), ProjectError> {
        let mut traversal = Traversal::new();
        let mut written = BTreeSet::new();
        for target in self.targets(stage_paths)? {
            self.index.commit(
                &target,
                &self.cache,
                &self.root,
                strategy,
                recursive,
                &mut traversal,
            )?;
            for path in &traversal.done {
                if written.insert(path.clone()) {
                    self.write_stage(path)?;
                }
            }
        }
        self.save_index()
    }

    fn write_stage(&self, stage_path: &str) -> Result<(), ProjectError> {
        if let Some(stage) = self.index.get(stage_path) {
            stage.write_file(&self.root.join(stage_path))?;
            debug!(stage = stage_path, "wrote stage file");
        }
        Ok(())
    }

    /// Checks out the outputs of stages.
    pub fn checkout(
        &self,
        stage_paths: &[String],
        strategy: CheckoutStrategy,
        recursive: bool,
    ) -> Result<(), ProjectError> {
        let mut traversal = Traversal::new();
        for target in self.targets(stage_paths)? {
            self.index.checkout(
                &target,
                &self.cache,
                &self.root,
                strategy,
                recursive,
                &mut traversal,
            )?;
        }
        Ok(())
    }

    /// Reports the status of stages, keyed by stage path.
    pub fn status(
        &self,
        stage_paths: &[String],
        recursive: bool,
    ) -> Result<BTreeMap<String, StageStatus>, ProjectError> {
        let mut out = BTreeMap::new();
        let mut traversal = Traversal::new();
        let mut targets = self.targets(stage_paths)?;
        targets.sort();
        for target in targets {
            self.index.status(
                &target,
                &self.cache,
                &self.root,
                recursive,
                &mut out,
                &mut traversal,
            )?;
        }
        Ok(out)
    }

    /// Runs out-of-date stages; returns whether each visited stage ran.
    pub fn run(
        &self,
        stage_paths: &[String],
        runner: &dyn CommandRunner,
        recursive: bool,
    ) -> Result<BTreeMap<String, bool>, ProjectError> {
        let mut ran = BTreeMap::new();
        let mut traversal = Traversal::new();
        for target in self.targets(stage_paths)? {
            self.index.run(
                &target,
                &self.cache,
                &self.root,
                runner,
                recursive,
                &mut ran,
                &mut traversal,
            )?;
        }
        Ok(ran)
    }

    /// Downloads missing blobs for stage outputs from the configured remote.
    pub fn fetch(&self, stage_paths: &[String], recursive: bool) -> Result<(), ProjectError> {
        let remote = self.remote()?;
        let mut traversal = Traversal::new();
        for target in self.targets(stage_paths)? {
            self.index
                .fetch(&target, &self.cache, remote, recursive, &mut traversal)?;
        }
        Ok(())
    }

    /// Uploads the blobs of stage outputs to the configured remote.
    pub fn push(&self, stage_paths: &[String], recursive: bool) -> Result<(), ProjectError> {
        let remote = self.remote()?;
        let mut traversal = Traversal::new();
        for target in self.targets(stage_paths)? {
            self.index
                .push(&target, &self.cache, remote, recursive, &mut traversal)?;
        }
        Ok(())
    }

    /// Fetches and then checks out stages.
    pub fn pull(
        &self,
        stage_paths: &[String],
        strategy: CheckoutStrategy,
        recursive: bool,
    ) -> Result<(), ProjectError> {
        self.fetch(stage_paths, recursive)?;
        self.checkout(stage_paths, strategy, recursive)
    }

    /// Builds the dependency graph of stages.
    pub fn graph(
        &self,
        stage_paths: &[String],
        stages_only: bool,
    ) -> Result<DotGraph, ProjectError> {
        let mut dot = DotGraph::new();
        let mut traversal = Traversal::new();
        for target in self.targets(stage_paths)? {
            self.index
                .graph(&target, &mut dot, stages_only, &mut traversal)?;
        }
        Ok(dot)
    }
}
