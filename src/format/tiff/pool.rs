//! Bounded pool of TIFF file handles.
//!
//! Every painter call holds exactly one handle for its whole run, so the
//! pool is what bounds concurrent file descriptors and per-handle block
//! caches. `get` waits when all handles are out; handles return to the
//! pool when the guard drops, on success and error paths alike.
//!
//! The parsed [`TiffInfo`] is shared across handles: structure is read
//! once at open, handles only ever read tile payloads and tag values.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::ScnError;
use crate::io::{BlockCache, FileRangeReader, RangeReader};

use super::directory::{TiffDirectory, TiffInfo};
use super::tags::TiffTag;
use super::values::ValueReader;

// =============================================================================
// TiffFile
// =============================================================================

/// One open handle on the slide file.
pub struct TiffFile {
    reader: BlockCache<FileRangeReader>,
    info: Arc<TiffInfo>,
}

impl TiffFile {
    async fn open(
        path: &Path,
        info: Arc<TiffInfo>,
        block_size: usize,
        cache_blocks: usize,
    ) -> Result<Self, ScnError> {
        let file = FileRangeReader::open(path).await?;
        Ok(TiffFile {
            reader: BlockCache::with_capacity(file, block_size, cache_blocks),
            info,
        })
    }

    /// The shared file structure.
    pub fn info(&self) -> &TiffInfo {
        &self.info
    }

    /// Validate that a directory index exists in this file.
    pub fn ensure_directory(&self, dir: usize) -> Result<(), ScnError> {
        if dir >= self.info.directory_count() {
            return Err(ScnError::bad_data("Cannot set TIFF directory"));
        }
        Ok(())
    }

    /// Read the raw (still compressed) bytes of one tile.
    ///
    /// A tile with a zero byte count is a hole in the file; it reads as
    /// empty and paints as transparent.
    pub async fn read_raw_tile(
        &self,
        dir: &TiffDirectory,
        tile_col: i64,
        tile_row: i64,
    ) -> Result<Bytes, ScnError> {
        let (offset, count) = dir.tile_location(tile_col, tile_row).ok_or_else(|| {
            ScnError::bad_data(format!(
                "Tile ({}, {}) out of range for directory {}",
                tile_col, tile_row, dir.dir
            ))
        })?;

        if count == 0 {
            return Ok(Bytes::new());
        }

        let bytes = self.reader.read_exact_at(offset, count as usize).await?;
        Ok(bytes)
    }

    /// Read a directory's ImageDescription, if it has one.
    pub async fn read_description(&self, dir: usize) -> Result<Option<String>, ScnError> {
        let ifd = match self.info.ifd(dir) {
            Some(ifd) => ifd,
            None => return Ok(None),
        };
        let entry = match ifd.ifd.get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let values = ValueReader::new(&self.reader, &self.info.header);
        let description = values.read_string(entry).await.map_err(ScnError::from)?;
        Ok(Some(description))
    }
}

// =============================================================================
// TiffPool
// =============================================================================

/// Bounded pool of [`TiffFile`] handles over one slide file.
pub struct TiffPool {
    path: PathBuf,
    info: Arc<TiffInfo>,
    block_size: usize,
    cache_blocks: usize,
    idle: Mutex<Vec<TiffFile>>,
    limit: Arc<Semaphore>,
}

impl TiffPool {
    /// Open the slide file, parse its structure, and set up the pool.
    ///
    /// The handle used for parsing becomes the first pooled handle.
    pub async fn open(
        path: impl AsRef<Path>,
        max_handles: usize,
        block_size: usize,
        cache_blocks: usize,
    ) -> Result<Self, ScnError> {
        let path = path.as_ref().to_owned();

        let file = FileRangeReader::open(&path).await?;
        let reader = BlockCache::with_capacity(file, block_size, cache_blocks);
        let info = Arc::new(TiffInfo::parse(&reader).await?);

        let first = TiffFile {
            reader,
            info: info.clone(),
        };

        Ok(TiffPool {
            path,
            info,
            block_size,
            cache_blocks,
            idle: Mutex::new(vec![first]),
            limit: Arc::new(Semaphore::new(max_handles)),
        })
    }

    /// The parsed file structure.
    pub fn info(&self) -> &Arc<TiffInfo> {
        &self.info
    }

    /// Acquire a handle, waiting if all handles are in use.
    ///
    /// Reuses an idle handle when one exists, otherwise opens a new file
    /// descriptor. The handle returns to the pool when the guard drops.
    pub async fn get(&self) -> Result<TiffHandle<'_>, ScnError> {
        let permit = self
            .limit
            .acquire()
            .await
            .map_err(|_| ScnError::bad_data("TIFF handle pool is closed"))?;

        let idle = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };

        let file = match idle {
            Some(file) => file,
            None => {
                TiffFile::open(
                    &self.path,
                    self.info.clone(),
                    self.block_size,
                    self.cache_blocks,
                )
                .await?
            }
        };

        Ok(TiffHandle {
            pool: self,
            file: Some(file),
            _permit: permit,
        })
    }

    fn put(&self, file: TiffFile) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.push(file);
    }
}

// =============================================================================
// TiffHandle
// =============================================================================

/// Scoped handle lease; dereferences to [`TiffFile`].
pub struct TiffHandle<'a> {
    pool: &'a TiffPool,
    file: Option<TiffFile>,
    _permit: SemaphorePermit<'a>,
}

impl std::ops::Deref for TiffHandle<'_> {
    type Target = TiffFile;

    fn deref(&self) -> &TiffFile {
        self.file.as_ref().expect("handle already returned")
    }
}

impl Drop for TiffHandle<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            self.pool.put(file);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal little-endian classic TIFF: one IFD with width/height.
    fn minimal_tiff() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00]); // II, 42
        data.extend_from_slice(&8u32.to_le_bytes()); // IFD at 8
        data.extend_from_slice(&2u16.to_le_bytes()); // 2 entries
        for (tag, value) in [(256u16, 640u32), (257, 480)] {
            data.extend_from_slice(&tag.to_le_bytes());
            data.extend_from_slice(&4u16.to_le_bytes()); // Long
            data.extend_from_slice(&1u32.to_le_bytes());
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
        data
    }

    fn write_tempfile(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_open_parses_structure() {
        let file = write_tempfile(&minimal_tiff());
        let pool = TiffPool::open(file.path(), 4, 4096, 8).await.unwrap();

        assert_eq!(pool.info().directory_count(), 1);
        assert_eq!(pool.info().ifd(0).unwrap().size, Some((640, 480)));
    }

    #[tokio::test]
    async fn test_handles_return_to_pool() {
        let file = write_tempfile(&minimal_tiff());
        let pool = TiffPool::open(file.path(), 2, 4096, 8).await.unwrap();

        {
            let a = pool.get().await.unwrap();
            let b = pool.get().await.unwrap();
            a.ensure_directory(0).unwrap();
            b.ensure_directory(0).unwrap();
            assert_eq!(pool.limit.available_permits(), 0);
        }
        assert_eq!(pool.limit.available_permits(), 2);

        // Both handles should now be idle and reusable
        let idle_count = pool.idle.lock().unwrap().len();
        assert_eq!(idle_count, 2);
    }

    #[tokio::test]
    async fn test_get_blocks_at_capacity() {
        let file = write_tempfile(&minimal_tiff());
        let pool = Arc::new(TiffPool::open(file.path(), 1, 4096, 8).await.unwrap());

        let held = pool.get().await.unwrap();

        let contender = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let handle = pool.get().await.unwrap();
                handle.ensure_directory(0).unwrap();
            })
        };

        // The contender cannot finish while we hold the only handle
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_directory_bounds() {
        let file = write_tempfile(&minimal_tiff());
        let pool = TiffPool::open(file.path(), 2, 4096, 8).await.unwrap();

        let handle = pool.get().await.unwrap();
        assert!(handle.ensure_directory(0).is_ok());
        let err = handle.ensure_directory(5).unwrap_err();
        assert!(err.to_string().contains("Cannot set TIFF directory"));
    }
}
