//! Off-thread content fingerprinting.
//!
//! The whole-file digest streams the source chunk by chunk through a
//! running md5 on a blocking worker, so the async scheduler never
//! touches file I/O or hashing. The resulting hex digest identifies the
//! file across sessions for resume discovery.

use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::debug;

use courier_core::{Error, Result};

use super::source::ChunkSource;

/// Streams the source through md5 on a worker thread.
pub(crate) async fn file_digest(source: Arc<dyn ChunkSource>, chunk_size: u64) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let len = source.len()?;
        let mut hasher = Md5::new();
        let mut offset = 0u64;
        while offset < len {
            let take = chunk_size.min(len - offset) as usize;
            let chunk = source.read_chunk(offset, take)?;
            if chunk.is_empty() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "source shrank while hashing",
                )));
            }
            hasher.update(&chunk);
            offset += chunk.len() as u64;
        }
        let digest = to_hex(hasher.finalize().as_slice());
        debug!(len, %digest, "file fingerprint computed");
        Ok(digest)
    })
    .await
    .map_err(|join| Error::Io(std::io::Error::other(join)))?
}

/// Lowercase hex rendering of a digest.
pub(crate) fn to_hex(digest: &[u8]) -> String {
    use std::fmt::Write;
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
