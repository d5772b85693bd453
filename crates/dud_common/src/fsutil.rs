//! Filesystem probing and lexical path helpers.
//!
//! Classification never follows symlinks: a link into the cache is reported as
//! [`FileStatus::Link`], not as whatever it points at.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use serde::{Serialize, Serializer};

/// The state of a single path on the filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileStatus {
    /// Nothing exists at the path.
    Absent,
    /// A regular file.
    RegularFile,
    /// A symbolic link (whether or not its target exists).
    Link,
    /// A directory.
    Directory,
    /// Anything else: sockets, FIFOs, device nodes.
    Other,
}

impl FileStatus {
    /// Returns the human-readable name used in status messages.
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Absent => "absent",
            FileStatus::RegularFile => "regular file",
            FileStatus::Link => "link",
            FileStatus::Directory => "directory",
            FileStatus::Other => "other",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FileStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Classifies `path` without following symlinks.
pub fn file_status(path: &Path) -> io::Result<FileStatus> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileStatus::Absent),
        Err(e) => return Err(e),
    };
    let file_type = meta.file_type();
    Ok(if file_type.is_file() {
        FileStatus::RegularFile
    } else if file_type.is_dir() {
        FileStatus::Directory
    } else if file_type.is_symlink() {
        FileStatus::Link
    } else {
        FileStatus::Other
    })
}

/// Returns `true` if something exists at `path`.
///
/// With `follow_links` a dangling symlink counts as absent; without it the
/// link itself is what gets checked.
pub fn exists(path: &Path, follow_links: bool) -> io::Result<bool> {
    let result = if follow_links {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    };
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns the target of `path` if it is a symlink, `None` otherwise.
pub fn link_target(path: &Path) -> io::Result<Option<PathBuf>> {
    match file_status(path)? {
        FileStatus::Link => fs::read_link(path).map(Some),
        _ => Ok(None),
    }
}

/// Returns `true` iff both paths exist and hold byte-identical contents.
///
/// Symlinks are followed, so a link compares equal to its target.
pub fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    if !exists(a, true)? || !exists(b, true)? {
        return Ok(false);
    }
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    let mut buf_a = vec![0u8; crate::checksum::BUFFER_SIZE];
    let mut buf_b = vec![0u8; crate::checksum::BUFFER_SIZE];
    loop {
        let n = read_full(&mut file_a, &mut buf_a)?;
        let m = read_full(&mut file_b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fills `buf` as far as the reader allows; returns the byte count read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Returns `true` if both paths resolve (following links) to the same inode.
///
/// Returns `false` when either path does not resolve, e.g. a dangling link.
pub fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let (Some(meta_a), Some(meta_b)) = (metadata_if_exists(a)?, metadata_if_exists(b)?) else {
        return Ok(false);
    };
    Ok(meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino())
}

fn metadata_if_exists(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Returns `true` if both paths live on the same mounted filesystem.
///
/// A rename between them is then a cheap metadata operation.
pub fn same_filesystem(a: &Path, b: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    Ok(fs::metadata(a)?.dev() == fs::metadata(b)?.dev())
}

/// Lexically cleans a slash-separated path.
///
/// Removes `.` components, collapses `name/..` pairs, and drops trailing
/// slashes. Leading `..` components of a relative path are kept so callers can
/// detect paths that escape their root. An empty result is returned as `"."`.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in Path::new(path).components() {
        match component {
            Component::RootDir | Component::Prefix(_) => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Returns `true` if a cleaned relative path points outside its root.
pub fn escapes_root(cleaned: &str) -> bool {
    cleaned == ".." || cleaned.starts_with("../")
}

/// Returns `path` as a cleaned absolute path, resolving it against the
/// current directory if needed. Symlinks are not resolved.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot make an empty path absolute",
        ));
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(PathBuf::from(clean_path(&joined.to_string_lossy())))
}

/// Computes a relative path from directory `from` to `to`.
///
/// Both paths must be absolute; the computation is purely lexical.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}
