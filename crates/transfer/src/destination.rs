use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::TransferError;

/// Append-only destination of an upload.
///
/// `stored_offset` always equals the number of bytes that reached stable
/// storage: it only moves after a write has been flushed and synced.
pub struct DestinationFile {
    file: tokio::fs::File,
    path: PathBuf,
    stored_offset: u64,
}

impl DestinationFile {
    /// Opens (creating if needed) `path` for appending.
    ///
    /// The parent directory is created first. The stored offset starts at
    /// the file's current size on disk.
    pub async fn open_append(path: &Path) -> Result<Self, TransferError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let stored_offset = file.metadata().await?.len();

        debug!(path = %path.display(), stored_offset, "destination opened for append");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            stored_offset,
        })
    }

    /// Appends `data`, then flushes and syncs it before advancing the offset.
    ///
    /// Returns the new stored offset.
    pub async fn append(&mut self, data: &[u8]) -> Result<u64, TransferError> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        self.stored_offset += data.len() as u64;
        Ok(self.stored_offset)
    }

    /// Flushes any pending state and closes the file.
    pub async fn close(mut self) -> Result<u64, TransferError> {
        self.file.flush().await?;
        debug!(path = %self.path.display(), stored_offset = self.stored_offset, "destination closed");
        Ok(self.stored_offset)
    }

    pub fn stored_offset(&self) -> u64 {
        self.stored_offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
