//! Wire protocol for resumable single-file uploads.
//!
//! # Wire format
//!
//! ```text
//! HANDSHAKE (Client -> Server):  FIRST <client_id> <file_name> <total_size>\n
//!                           or:  RESUME <client_id> <file_name>\n
//! HANDSHAKE (Server -> Client):  ACK <stored_offset>\n
//!
//! PER CHUNK (Client -> Server):  DATA <n>\n  followed by exactly n raw bytes
//!           (Server -> Client):  ACK <stored_offset>\n
//!
//! FINISH    (Client -> Server):  FIN\n
//!           (Server -> Client):  COMPLETE\n
//! ```
//!
//! The server's `ACK` offset is authoritative: it always equals the number
//! of bytes durably stored for the transfer.

pub mod error;
pub mod framing;
pub mod messages;

pub use error::ProtocolError;
pub use framing::FramedStream;
pub use messages::{Reply, Request};

/// Maximum control line length in bytes. Longer lines are delivered truncated.
pub const MAX_LINE_LEN: usize = 2048;

/// Default chunk size used by clients (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default upper bound on a single `DATA` payload accepted by servers (1 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 4000;
