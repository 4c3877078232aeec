use std::fmt;
use std::time::Duration;

/// Phase of the upload state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Disconnected,
    Connecting,
    /// `FIRST`/`RESUME` sent, awaiting `ACK`.
    Handshake,
    Sending,
    /// `FIN` sent, awaiting `COMPLETE`.
    Finishing,
    /// The last attempt failed; waiting before reconnecting.
    FailedRetryable,
    Done,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshake => "handshake",
            Self::Sending => "sending",
            Self::Finishing => "finishing",
            Self::FailedRetryable => "failed-retryable",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Progress notifications published by the driver.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    StateChanged(UploadState),
    /// The server acknowledged `offset` bytes as durably stored.
    Acknowledged {
        offset: u64,
        total_size: u64,
        bytes_per_second: f64,
    },
    Retrying {
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Completed(UploadReport),
}

/// Summary of a finished upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub total_size: u64,
    /// Connections opened, including the one that finished.
    pub connections: u32,
    /// `DATA` messages written, including ones lost to a dropped connection.
    pub chunks_sent: u64,
    /// Payload bytes written across all connections.
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

impl UploadReport {
    /// Payload bytes resent because a connection dropped before their `ACK`.
    pub fn bytes_resent(&self) -> u64 {
        self.bytes_sent.saturating_sub(self.total_size)
    }

    pub fn average_bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_size as f64 / secs
    }
}
