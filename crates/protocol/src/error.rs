//! Error types for the wire protocol.

/// Errors produced while framing or parsing protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The transport failed or closed in the middle of a message.
    ///
    /// Fatal to the connection, never to the logical transfer.
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unexpected message: {0}")]
    Unexpected(String),
}

impl ProtocolError {
    /// Returns `true` if the error came from the transport rather than the peer.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}
