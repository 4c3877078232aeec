//! File-side half of a resumable upload: chunked reads on the sender and
//! append-only, flush-before-acknowledge storage on the receiver.

mod chunked;
mod destination;
mod progress;
mod types;
mod validation;

pub use chunked::ChunkReader;
pub use destination::DestinationFile;
pub use progress::SpeedCalculator;
pub use types::{Chunk, TransferIdentity};
pub use validation::validate_identity_component;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid transfer identity: {0}")]
    InvalidIdentity(String),

    /// The source file no longer holds the bytes it had when the upload began.
    #[error("source file changed: expected {expected} bytes at offset {offset}, read {actual}")]
    SourceChanged {
        offset: u64,
        expected: usize,
        actual: usize,
    },
}
