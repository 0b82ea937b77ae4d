//! Positional reads from a local slide file.
//!
//! Slide files are large (1-10GB+) and read at scattered offsets, so the
//! reader uses pread-style positional I/O on a shared file descriptor
//! instead of seeking. Reads are dispatched through `spawn_blocking` to
//! keep the async runtime free while the kernel does the work.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

use super::RangeReader;

/// Range reader backed by a local file.
///
/// Cloning is cheap: clones share the underlying file descriptor.
/// Positional reads never touch the descriptor's seek position, so one
/// descriptor can serve concurrent readers.
#[derive(Debug, Clone)]
pub struct FileRangeReader {
    file: Arc<File>,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a file for positional reading.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_owned();
        let identifier = path.display().to_string();

        let (file, size) = tokio::task::spawn_blocking(move || {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            Ok::<_, std::io::Error>((file, size))
        })
        .await
        .map_err(|e| IoError::Open {
            path: identifier.clone(),
            message: e.to_string(),
        })?
        .map_err(|e| IoError::Open {
            path: identifier.clone(),
            message: e.to_string(),
        })?;

        Ok(FileRangeReader {
            file: Arc::new(file),
            size,
            identifier,
        })
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = self.file.clone();
        let buf = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            read_at(&file, &mut buf, offset)?;
            Ok::<_, std::io::Error>(buf)
        })
        .await
        .map_err(|e| IoError::Read {
            offset,
            message: e.to_string(),
        })?
        .map_err(|e| IoError::Read {
            offset,
            message: e.to_string(),
        })?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut read = 0;
    while read < buf.len() {
        let n = file.seek_read(&mut buf[read..], offset + read as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected end of file",
            ));
        }
        read += n;
    }
    Ok(())
}
