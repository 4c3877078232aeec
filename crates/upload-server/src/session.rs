//! Per-connection server state.

use std::path::Path;

use ferry_transfer::{DestinationFile, TransferIdentity};
use tracing::{debug, warn};

use crate::ServerError;
use crate::leases::{PathLease, PathLeases};

/// State of one connection after a successful handshake.
///
/// Owned exclusively by the connection's handler and dropped with it; a
/// reconnect builds a fresh session whose offset is read back from disk.
pub struct ServerSession {
    identity: TransferIdentity,
    destination: DestinationFile,
    declared_size: Option<u64>,
    _lease: Option<PathLease>,
}

impl ServerSession {
    /// Opens the destination of `identity` under `root` for appending.
    ///
    /// Creates `<root>/<client_id>` if needed. The stored offset is the
    /// destination's size on disk (0 for a new file). When `leases` is
    /// given, the path is claimed first and [`ServerError::PathBusy`] is
    /// returned if another connection holds it.
    pub async fn open(
        root: &Path,
        identity: TransferIdentity,
        declared_size: Option<u64>,
        leases: Option<&PathLeases>,
    ) -> Result<Self, ServerError> {
        let path = identity.destination(root);

        let lease = match leases {
            Some(leases) => Some(
                leases
                    .try_acquire(&path)
                    .ok_or_else(|| ServerError::PathBusy(identity.to_string()))?,
            ),
            None => None,
        };

        tokio::fs::create_dir_all(identity.client_dir(root)).await?;
        let destination = DestinationFile::open_append(&path).await?;

        Ok(Self {
            identity,
            destination,
            declared_size,
            _lease: lease,
        })
    }

    pub fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    /// Bytes durably stored for this transfer.
    pub fn stored_offset(&self) -> u64 {
        self.destination.stored_offset()
    }

    /// Size announced by `FIRST`, if this connection started with one.
    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// Appends one payload and returns the new stored offset.
    ///
    /// The offset only advances once the bytes are flushed and synced.
    pub async fn store_chunk(&mut self, data: &[u8]) -> Result<u64, ServerError> {
        let stored = self.destination.append(data).await?;
        debug!(identity = %self.identity, len = data.len(), stored, "chunk stored");
        Ok(stored)
    }

    /// Closes the destination and returns the final stored offset.
    ///
    /// A mismatch with the declared size is logged; the wire reply does
    /// not change.
    pub async fn close(self) -> Result<u64, ServerError> {
        let stored = self.destination.close().await?;
        if let Some(declared) = self.declared_size
            && declared != stored
        {
            warn!(
                identity = %self.identity,
                declared,
                stored,
                "upload finished with a size different from the declared one"
            );
        }
        Ok(stored)
    }
}
