use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::types::Chunk;

/// Reads a source file in bounded chunks at caller-chosen offsets.
///
/// The cursor is repositioned on every read, so nothing is assumed about
/// where the previous connection left it.
pub struct ChunkReader {
    file: tokio::fs::File,
    path: PathBuf,
    chunk_size: usize,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, a 4 KiB default applies.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            chunk_size,
            file_size,
        })
    }

    /// Reads the chunk starting at `offset`. Returns `None` at or past EOF.
    ///
    /// The chunk is `min(chunk_size, file_size - offset)` bytes; a source
    /// that shrank underneath us is reported as [`TransferError::SourceChanged`].
    pub async fn read_at(&mut self, offset: u64) -> Result<Option<Chunk>, TransferError> {
        if offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - offset;
        let want = remaining.min(self.chunk_size as u64) as usize;
        self.file.seek(SeekFrom::Start(offset)).await?;

        let mut data = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.file.read(&mut data[filled..]).await?;
            if n == 0 {
                return Err(TransferError::SourceChanged {
                    offset,
                    expected: want,
                    actual: filled,
                });
            }
            filled += n;
        }

        Ok(Some(Chunk { offset, data }))
    }

    /// Total file size in bytes, fixed when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

const DEFAULT_CHUNK_SIZE: usize = 4096;
