//! The stage value type and its YAML file format.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

use dud_cache::Artifact;
use dud_common::{checksum_bytes, fsutil};
use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// A reproducible unit of work.
///
/// Artifact maps are keyed by the artifact's cleaned, project-root-relative
/// path, which is also stored in [`Artifact::path`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    /// Digest of the stage definition; empty until first commit.
    pub checksum: String,
    /// Shell command that produces the outputs.
    pub command: Option<String>,
    /// Directory the command runs in, relative to the project root. Empty
    /// means the root itself.
    pub working_dir: String,
    /// Artifacts the command reads. Always `skip_cache`.
    pub inputs: BTreeMap<String, Artifact>,
    /// Artifacts the command produces and this stage owns.
    pub outputs: BTreeMap<String, Artifact>,
}

/// On-disk layout of a stage file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageFile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(rename = "working-dir", default, skip_serializing_if = "String::is_empty")]
    working_dir: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    inputs: BTreeMap<String, Option<Artifact>>,
    #[serde(default)]
    outputs: BTreeMap<String, Option<Artifact>>,
}

/// Canonical form hashed to produce the stage checksum.
#[derive(Serialize)]
struct ChecksumForm<'a> {
    command: &'a str,
    working_dir: &'a str,
    inputs: BTreeMap<&'a str, Artifact>,
    outputs: BTreeMap<&'a str, Artifact>,
}

impl Stage {
    /// Reads, normalizes and validates the stage file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, StageError> {
        let content = std::fs::read_to_string(path).map_err(|source| StageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, path)
    }

    /// Parses stage YAML; `origin` is only used in error messages.
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self, StageError> {
        let file: StageFile = serde_yaml::from_str(content).map_err(|e| StageError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        let stage = Self::from_file_format(file)?;
        stage.validate()?;
        Ok(stage)
    }

    fn from_file_format(file: StageFile) -> Result<Self, StageError> {
        let working_dir = match fsutil::clean_path(&file.working_dir) {
            dot if dot == "." => String::new(),
            cleaned => cleaned,
        };
        let mut stage = Stage {
            checksum: file.checksum,
            command: file.command.filter(|cmd| !cmd.trim().is_empty()),
            working_dir,
            ..Stage::default()
        };
        for (path, artifact) in file.inputs {
            let mut artifact = artifact.unwrap_or_default();
            // Only the owning stage ever stores an artifact's contents.
            artifact.skip_cache = true;
            insert_artifact(&mut stage.inputs, &path, artifact)?;
        }
        for (path, artifact) in file.outputs {
            insert_artifact(&mut stage.outputs, &path, artifact.unwrap_or_default())?;
        }
        Ok(stage)
    }

    fn to_file_format(&self) -> StageFile {
        StageFile {
            checksum: self.checksum.clone(),
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            // `skip-cache` is implied for inputs, so it is not written.
            inputs: file_entries(&self.inputs, |art| art.skip_cache = false),
            outputs: file_entries(&self.outputs, |_| {}),
        }
    }

    /// Encodes the stage in its file format.
    pub fn to_yaml(&self) -> Result<String, StageError> {
        serde_yaml::to_string(&self.to_file_format())
            .map_err(|e| StageError::Serialization(e.to_string()))
    }

    /// Writes the stage to `path`, replacing any existing file.
    pub fn write_file(&self, path: &Path) -> Result<(), StageError> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|source| StageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Computes the digest of the stage definition.
    ///
    /// Covers the command, working directory and every artifact's path and
    /// flags. The stored checksum and artifact digests are excluded, so the
    /// result is stable across recommits of changed contents.
    pub fn calculate_checksum(&self) -> Result<String, StageError> {
        fn clean(arts: &BTreeMap<String, Artifact>) -> BTreeMap<&str, Artifact> {
            arts.iter()
                .map(|(path, art)| {
                    let art = Artifact {
                        digest: String::new(),
                        ..art.clone()
                    };
                    (path.as_str(), art)
                })
                .collect()
        }

        let form = ChecksumForm {
            command: self.command.as_deref().unwrap_or_default(),
            working_dir: &self.working_dir,
            inputs: clean(&self.inputs),
            outputs: clean(&self.outputs),
        };
        let bytes =
            serde_json::to_vec(&form).map_err(|e| StageError::Serialization(e.to_string()))?;
        Ok(checksum_bytes(&bytes))
    }

    /// Builds the process that runs the stage's command from `root`.
    ///
    /// The shell is taken from `$SHELL`, falling back to `sh`. Standard
    /// streams are inherited. Returns `None` for stages without a command.
    pub fn create_command(&self, root: &Path) -> Option<Command> {
        let script = self.command.as_deref()?;
        let shell = std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.is_empty())
            .unwrap_or_else(|| "sh".to_string());
        let mut cmd = Command::new(shell);
        cmd.arg("-c")
            .arg(script)
            .current_dir(root.join(&self.working_dir))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Some(cmd)
    }
}

/// Converts an artifact map to file entries; the map key carries the path.
fn file_entries(
    map: &BTreeMap<String, Artifact>,
    adjust: impl Fn(&mut Artifact),
) -> BTreeMap<String, Option<Artifact>> {
    map.iter()
        .map(|(path, art)| {
            let mut entry = Artifact {
                path: String::new(),
                ..art.clone()
            };
            adjust(&mut entry);
            (path.clone(), Some(entry))
        })
        .collect()
}

fn insert_artifact(
    map: &mut BTreeMap<String, Artifact>,
    raw_path: &str,
    mut artifact: Artifact,
) -> Result<(), StageError> {
    let path = fsutil::clean_path(raw_path);
    if path == "." {
        return Err(StageError::invalid(format!(
            "artifact path {raw_path:?} names the project root"
        )));
    }
    artifact.path = path.clone();
    if map.insert(path.clone(), artifact).is_some() {
        return Err(StageError::invalid(format!(
            "artifact {path} is declared more than once"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN: &str = "\
command: python train.py
working-dir: ./models/
inputs:
  data/train.csv:
  models/train.py: {}
outputs:
  models/weights.bin:
    checksum: abc123
  models/plots:
    is-dir: true
";

    fn train() -> Stage {
        Stage::from_yaml(TRAIN, Path::new("train.yaml")).unwrap()
    }

    #[test]
    fn parses_and_normalizes() {
        let stage = train();
        assert_eq!(stage.command.as_deref(), Some("python train.py"));
        assert_eq!(stage.working_dir, "models");
        assert_eq!(stage.inputs.len(), 2);
        assert!(stage.inputs.values().all(|a| a.skip_cache));
        assert_eq!(stage.inputs["data/train.csv"].path, "data/train.csv");
        assert_eq!(stage.outputs["models/weights.bin"].digest, "abc123");
        assert!(stage.outputs["models/plots"].is_dir);
    }

    #[test]
    fn dot_working_dir_is_root() {
        let stage = Stage::from_yaml(
            "working-dir: .\noutputs:\n  out.txt:\n",
            Path::new("s.yaml"),
        )
        .unwrap();
        assert_eq!(stage.working_dir, "");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Stage::from_yaml("cmd: echo\noutputs:\n  a:\n", Path::new("s.yaml")).unwrap_err();
        assert!(matches!(err, StageError::Parse { .. }));

        let err = Stage::from_yaml("outputs:\n  a:\n    colour: red\n", Path::new("s.yaml"))
            .unwrap_err();
        assert!(matches!(err, StageError::Parse { .. }));
    }

    #[test]
    fn duplicate_paths_after_cleaning() {
        let err = Stage::from_yaml(
            "outputs:\n  out/:\n    is-dir: true\n  ./out:\n",
            Path::new("s.yaml"),
        )
        .unwrap_err();
        assert!(matches!(err, StageError::ValidationFailed { .. }));
    }

    #[test]
    fn write_back_elides_implied_fields() {
        let yaml = train().to_yaml().unwrap();
        assert!(!yaml.contains("skip-cache"));
        assert!(!yaml.contains("path:"));
        assert!(yaml.contains("working-dir: models"));
        assert_eq!(Stage::from_yaml(&yaml, Path::new("s.yaml")).unwrap(), train());
    }

    #[test]
    fn write_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.yaml");
        train().write_file(&path).unwrap();
        assert_eq!(Stage::from_file(&path).unwrap(), train());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Stage::from_file(Path::new("/nonexistent/stage.yaml")).unwrap_err();
        assert!(matches!(err, StageError::Io { .. }));
    }

    #[test]
    fn checksum_ignores_artifact_digests() {
        let stage = train();
        let before = stage.calculate_checksum().unwrap();
        let mut changed = stage.clone();
        changed.outputs.get_mut("models/weights.bin").unwrap().digest = "ffff".to_string();
        changed.inputs.get_mut("data/train.csv").unwrap().digest = "eeee".to_string();
        changed.checksum = before.clone();
        assert_eq!(changed.calculate_checksum().unwrap(), before);
    }

    #[test]
    fn checksum_tracks_definition() {
        let stage = train();
        let before = stage.calculate_checksum().unwrap();

        let mut cmd = stage.clone();
        cmd.command = Some("python train.py --epochs 3".to_string());
        assert_ne!(cmd.calculate_checksum().unwrap(), before);

        let mut flags = stage.clone();
        flags.outputs.get_mut("models/plots").unwrap().disable_recursion = true;
        assert_ne!(flags.calculate_checksum().unwrap(), before);

        let mut wd = stage;
        wd.working_dir = String::new();
        assert_ne!(wd.calculate_checksum().unwrap(), before);
    }

    #[test]
    fn command_runs_in_working_dir() {
        let cmd = train().create_command(Path::new("/proj")).unwrap();
        let args: Vec<String> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-c", "python train.py"]);
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/proj/models")));
    }

    #[test]
    fn no_command_no_process() {
        let stage = Stage::from_yaml("outputs:\n  a.txt:\n", Path::new("s.yaml")).unwrap();
        assert!(stage.create_command(Path::new("/proj")).is_none());
    }
}
