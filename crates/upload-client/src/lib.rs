//! Client side of the Ferry resumable upload protocol.
//!
//! [`UploadDriver`] moves one file to a server over as many connections as
//! it takes. Every reconnect resumes at the offset the server reports as
//! durably stored; bytes already persisted are never sent again.

mod connector;
mod driver;
mod retry;
mod session;
mod types;

pub use connector::{Connector, TcpConnector};
pub use driver::{UploadConfig, UploadDriver};
pub use retry::RetryPolicy;
pub use session::ClientSession;
pub use types::{UploadEvent, UploadReport, UploadState};

use ferry_transfer::TransferError;

/// Errors that end an upload.
///
/// Transport failures never surface here directly: they are retried
/// according to the [`RetryPolicy`] and only reported once it gives up.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("chunk size {0} is outside 1..={max}", max = ferry_protocol::DEFAULT_MAX_PAYLOAD)]
    InvalidChunkSize(usize),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("finish failed: {0}")]
    Finish(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("gave up after {attempts} consecutive failed attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}
