use ferry_transfer::TransferIdentity;

/// Observable server activity, published per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A `FIRST` or `RESUME` handshake was answered with `ACK <stored_offset>`.
    Handshake {
        identity: TransferIdentity,
        resumed: bool,
        stored_offset: u64,
    },
    /// A `DATA` payload was appended, synced and acknowledged.
    ChunkStored {
        identity: TransferIdentity,
        len: usize,
        stored_offset: u64,
    },
    /// `FIN` was answered with `COMPLETE`.
    Completed {
        identity: TransferIdentity,
        stored_offset: u64,
    },
    /// The connection ended, for whatever reason.
    ConnectionClosed { peer: String, reason: CloseReason },
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Completed,
    /// The peer closed the stream between messages.
    Disconnected,
    Failed(String),
    /// The server shut down while the connection was open.
    Shutdown,
}

/// Result of a connection that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Completed {
        identity: TransferIdentity,
        stored_offset: u64,
    },
    Disconnected,
}
