use std::fmt;
use std::path::{Path, PathBuf};

use crate::TransferError;
use crate::validation::validate_identity_component;

/// A slice of the source file ready to be framed as `DATA <n>`.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the source file.
    pub offset: u64,
    /// Raw chunk data (never empty).
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset just past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Identifies a logical transfer across reconnects.
///
/// Maps to `<root>/<client_id>/<file_name>` on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferIdentity {
    client_id: String,
    file_name: String,
}

impl TransferIdentity {
    /// Builds an identity after checking both components are safe path segments.
    pub fn new(
        client_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Self, TransferError> {
        let client_id = client_id.into();
        let file_name = file_name.into();
        validate_identity_component(&client_id)?;
        validate_identity_component(&file_name)?;
        Ok(Self {
            client_id,
            file_name,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Directory holding every upload of this client.
    pub fn client_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.client_id)
    }

    /// Destination path of this transfer under `root`.
    pub fn destination(&self, root: &Path) -> PathBuf {
        self.client_dir(root).join(&self.file_name)
    }
}

impl fmt::Display for TransferIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_id, self.file_name)
    }
}
