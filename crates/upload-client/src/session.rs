use std::path::Path;

use ferry_protocol::Request;
use ferry_transfer::{Chunk, ChunkReader, TransferError, TransferIdentity};

/// Client-side state of one logical transfer.
///
/// Lives for the whole upload and survives reconnects. `offset` only ever
/// takes values reported by the server.
pub struct ClientSession {
    identity: TransferIdentity,
    reader: ChunkReader,
    offset: u64,
    handshake_sent: bool,
}

impl ClientSession {
    /// Opens the source file and fixes its total size.
    pub async fn open(
        path: &Path,
        chunk_size: usize,
        identity: TransferIdentity,
    ) -> Result<Self, TransferError> {
        let reader = ChunkReader::open(path, chunk_size).await?;
        Ok(Self {
            identity,
            reader,
            offset: 0,
            handshake_sent: false,
        })
    }

    pub fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    pub fn total_size(&self) -> u64 {
        self.reader.file_size()
    }

    /// Bytes the server has confirmed as stored.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.total_size()
    }

    /// The handshake for the next connection: `FIRST` until one has been
    /// written, `RESUME` afterwards.
    pub fn handshake_request(&self) -> Request {
        if self.handshake_sent {
            Request::Resume {
                client_id: self.identity.client_id().to_string(),
                file_name: self.identity.file_name().to_string(),
            }
        } else {
            Request::First {
                client_id: self.identity.client_id().to_string(),
                file_name: self.identity.file_name().to_string(),
                total_size: self.total_size(),
            }
        }
    }

    pub fn mark_handshake_sent(&mut self) {
        self.handshake_sent = true;
    }

    /// Adopts a server-reported offset.
    ///
    /// Returns `false`, leaving the offset untouched, when `offset` lies
    /// beyond the source size.
    pub fn accept_offset(&mut self, offset: u64) -> bool {
        if offset > self.total_size() {
            return false;
        }
        self.offset = offset;
        true
    }

    /// Reads the chunk starting at the confirmed offset.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        self.reader.read_at(self.offset).await
    }
}
