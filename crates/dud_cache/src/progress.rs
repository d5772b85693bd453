//! Terminal progress reports for long-running cache operations.
//!
//! Each top-level operation gets a [`Progress`] with a files bar and a bytes
//! bar. Totals grow as work is discovered, since a directory commit only
//! learns how many files it has as it walks the tree. When stderr is not a
//! terminal the bars are hidden but still count.

use std::io::{IsTerminal, Read};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const FILES_TEMPLATE: &str = "  {prefix:24}  files: {pos}/{len}  {percent:>3}%  {per_sec}";
const BYTES_TEMPLATE: &str =
    "  {prefix:24}  bytes: {bytes}/{total_bytes}  {percent:>3}%  {bytes_per_sec}  ETA: {eta}";

/// Returns whether progress bars should be drawn by default.
pub fn stderr_is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// File and byte counters for one cache operation.
#[derive(Debug, Clone)]
pub struct Progress {
    files: ProgressBar,
    bytes: ProgressBar,
}

impl Progress {
    /// Creates a report labelled `prefix`, drawn on stderr when `visible`.
    pub fn new(prefix: impl Into<String>, visible: bool) -> Self {
        if !visible {
            return Self::hidden();
        }
        let prefix = prefix.into();
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let files = multi.add(styled_bar(FILES_TEMPLATE, &prefix));
        let bytes = multi.add(styled_bar(BYTES_TEMPLATE, &prefix));
        Self { files, bytes }
    }

    /// Creates a report that counts without drawing anything.
    pub fn hidden() -> Self {
        Self {
            files: ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()),
            bytes: ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()),
        }
    }

    /// Adds `count` files to the expected total.
    pub fn add_files(&self, count: u64) {
        self.files.inc_length(count);
    }

    /// Adds `count` bytes to the expected total.
    pub fn add_bytes(&self, count: u64) {
        self.bytes.inc_length(count);
    }

    /// Marks one file as done.
    pub fn done_file(&self) {
        self.files.inc(1);
    }

    /// Wraps `reader` so that every byte read advances the bytes bar.
    pub fn reader<R: Read>(&self, reader: R) -> impl Read {
        self.bytes.wrap_read(reader)
    }

    /// Files completed so far.
    pub fn files_done(&self) -> u64 {
        self.files.position()
    }

    /// Files expected so far.
    pub fn files_total(&self) -> u64 {
        self.files.length().unwrap_or(0)
    }

    /// Bytes read so far.
    pub fn bytes_done(&self) -> u64 {
        self.bytes.position()
    }

    /// Stops both bars, leaving their final state on screen.
    pub fn finish(&self) {
        self.files.finish();
        self.bytes.finish();
    }
}

fn styled_bar(template: &str, prefix: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(0)
        .with_style(style)
        .with_prefix(prefix.to_string())
}
