//! Upload payload sources.
//!
//! A [`ChunkSource`] exposes random-access reads over the payload so the
//! coordinator can fingerprint and slice it without buffering the whole
//! file. Reads are blocking and are always performed on a worker thread
//! (`spawn_blocking`), never on the async scheduler.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use bytes::Bytes;

/// Random-access byte source for chunked uploads.
pub trait ChunkSource: Send + Sync + 'static {
    /// Total payload length in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Reads up to `len` bytes starting at `offset`. Shorter reads are
    /// only valid at end of payload.
    fn read_chunk(&self, offset: u64, len: usize) -> io::Result<Bytes>;

    /// Filename hint forwarded in the multipart `file` part.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Whether the payload is empty.
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory source, mainly for tests and small payloads.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
    name: Option<String>,
}

impl BytesSource {
    /// Wraps a byte buffer.
    pub fn new(data: Bytes) -> Self {
        Self { data, name: None }
    }

    /// Sets the filename hint.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ChunkSource for BytesSource {
    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_chunk(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        if start > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "offset beyond end of payload",
            ));
        }
        let end = (start + len).min(self.data.len());
        Ok(self.data.slice(start..end))
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Filesystem source. The file is opened per read, so the source stays
/// cheap to share across chunk tasks.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Wraps a path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn read_chunk(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}
