//! `dud checksum`: print BLAKE3 digests in `sum`-style format.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;

use crate::ChecksumArgs;

/// Runs `dud checksum`.
pub fn run(args: &ChecksumArgs) -> anyhow::Result<i32> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.files.is_empty() {
        let digest = dud_common::checksum(io::stdin().lock()).context("failed to read stdin")?;
        writeln!(out, "{digest}  -")?;
    } else {
        write_checksums(&args.files, &mut out)?;
    }
    Ok(0)
}

fn write_checksums(files: &[String], out: &mut impl Write) -> anyhow::Result<()> {
    for file in files {
        let digest = dud_common::checksum_file(Path::new(file))
            .with_context(|| format!("failed to checksum {file}"))?;
        writeln!(out, "{digest}  {file}")?;
    }
    Ok(())
}
