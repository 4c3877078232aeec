//! Upload server for the Ferry resumable transfer protocol.
//!
//! Accepts any number of concurrent connections and runs one independent
//! [`handler`] task per connection. Connections share nothing in memory;
//! each logical transfer owns the path `<root>/<client_id>/<file_name>`,
//! and the stored offset is re-derived from disk on every handshake.

mod handler;
mod leases;
mod server;
mod session;
mod types;

pub use handler::{ConnectionHandler, HandlerContext};
pub use leases::{PathLease, PathLeases};
pub use server::{ServerConfig, UploadServer};
pub use session::ServerSession;
pub use types::{CloseReason, ConnectionOutcome, ServerEvent};

pub use ferry_transfer::TransferIdentity;

use ferry_protocol::ProtocolError;
use ferry_transfer::TransferError;

/// Capacity hint for event channels handed to [`UploadServer::with_events`].
///
/// Events are published with `try_send()`; a small buffer silently drops
/// per-chunk events under load.
pub const EVENT_BUFFER_SIZE: usize = 1024;

/// Errors produced by the upload server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("destination already in use by another connection: {0}")]
    PathBusy(String),
}
