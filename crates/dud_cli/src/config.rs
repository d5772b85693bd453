//! `dud config get` and `dud config set`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use dud_project::DUD_DIR;

use crate::ConfigCommand;

/// Runs a `dud config` subcommand.
pub fn run(command: &ConfigCommand) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let root = find_root(&cwd)?;
    match command {
        ConfigCommand::Get { key } => {
            if let Some(value) = get(&root, key)? {
                println!("{value}");
            }
        }
        ConfigCommand::Set { key, value } => dud_config::set_value(&root, key, value)?,
    }
    Ok(0)
}

/// Locates the project root without loading the index, so a broken config
/// can still be repaired with `dud config set`.
fn find_root(start: &Path) -> anyhow::Result<PathBuf> {
    match start.ancestors().find(|dir| dir.join(DUD_DIR).is_dir()) {
        Some(root) => Ok(root.to_path_buf()),
        None => bail!("no project root found in {} or any parent directory", start.display()),
    }
}

fn get(root: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let config = dud_config::load_config(root)?;
    Ok(dud_config::get_value(&config, key)?)
}
