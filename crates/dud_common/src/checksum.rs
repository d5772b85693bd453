//! Streaming BLAKE3 content digests.
//!
//! Every blob in the cache is addressed by the lowercase hex BLAKE3 digest of
//! its bytes. Digests are computed over a stream so arbitrarily large files
//! never need to be held in memory.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Size of the read buffer used when streaming bytes into the hasher.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Reads `reader` to the end and returns the hex digest of its bytes.
///
/// Only I/O errors from the reader are reported; hashing itself cannot fail.
pub fn checksum<R: Read>(reader: R) -> io::Result<String> {
    checksum_copy(reader, io::sink())
}

/// Reads `reader` to the end, writing every byte to `writer` while hashing.
///
/// This is the single-pass "tee" used when copying a file into or out of the
/// cache: the destination receives the same bytes that produced the digest.
pub fn checksum_copy<R: Read, W: Write>(mut reader: R, mut writer: W) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n])?;
    }
    writer.flush()?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Returns the hex digest of an in-memory byte slice.
pub fn checksum_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Opens the file at `path` and returns the hex digest of its contents.
pub fn checksum_file(path: &Path) -> io::Result<String> {
    checksum(File::open(path)?)
}
