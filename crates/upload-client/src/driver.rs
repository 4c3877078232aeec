//! Client upload state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Handshake -> Sending -> Finishing -> Done
//!                     ^             |           |
//!                     +---- FailedRetryable <---+
//! ```
//!
//! Transport failures while connecting, during the handshake or while
//! sending move to `FailedRetryable`; the next connection resumes with
//! `RESUME` at whatever offset the server reports. A rejected handshake and
//! any failure while finishing are fatal.

use std::path::PathBuf;
use std::time::Instant;

use ferry_protocol::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD, FramedStream, ProtocolError, Reply, Request,
};
use ferry_transfer::{SpeedCalculator, TransferError, TransferIdentity};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::UploadError;
use crate::connector::Connector;
use crate::retry::RetryPolicy;
use crate::session::ClientSession;
use crate::types::{UploadEvent, UploadReport, UploadState};

/// What to upload and how persistently.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub client_id: String,
    /// Source file; its base name becomes the remote file name.
    pub file_path: PathBuf,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
}

impl UploadConfig {
    pub fn new(client_id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            client_id: client_id.into(),
            file_path: file_path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    fn identity(&self) -> Result<TransferIdentity, TransferError> {
        let file_name = self
            .file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                TransferError::InvalidIdentity(format!(
                    "{} has no usable file name",
                    self.file_path.display()
                ))
            })?;
        TransferIdentity::new(self.client_id.clone(), file_name)
    }
}

/// How an attempt ended, short of success.
enum Failure {
    Retryable(String),
    Fatal(UploadError),
}

impl From<ProtocolError> for Failure {
    fn from(e: ProtocolError) -> Self {
        Failure::Retryable(e.to_string())
    }
}

struct Progress {
    started: Instant,
    connections: u32,
    chunks_sent: u64,
    bytes_sent: u64,
    /// Consecutive failed attempts since the last acknowledged progress.
    failures: u32,
    speed: SpeedCalculator,
}

impl Progress {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            connections: 0,
            chunks_sent: 0,
            bytes_sent: 0,
            failures: 0,
            speed: SpeedCalculator::new(None, None),
        }
    }
}

/// Drives one file to the server, reconnecting as needed.
pub struct UploadDriver<C> {
    connector: C,
    config: UploadConfig,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<UploadEvent>>,
}

impl<C: Connector> UploadDriver<C> {
    pub fn new(connector: C, config: UploadConfig, cancel: CancellationToken) -> Self {
        Self {
            connector,
            config,
            cancel,
            events: None,
        }
    }

    /// Publishes [`UploadEvent`]s on `tx`. Events are dropped when the
    /// channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Runs the upload to completion.
    pub async fn run(self) -> Result<UploadReport, UploadError> {
        // A default server drops the connection on a larger DATA without replying.
        let chunk_size = self.config.chunk_size;
        if chunk_size == 0 || chunk_size > DEFAULT_MAX_PAYLOAD {
            return Err(UploadError::InvalidChunkSize(chunk_size));
        }
        let identity = self.config.identity()?;
        let mut session =
            ClientSession::open(&self.config.file_path, self.config.chunk_size, identity).await?;
        info!(
            identity = %session.identity(),
            total_size = session.total_size(),
            peer = %self.connector.peer(),
            "starting upload"
        );

        let mut progress = Progress::new();
        self.set_state(UploadState::Disconnected);

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                result = self.attempt(&mut session, &mut progress) => result,
            };

            let reason = match result {
                Ok(()) => break,
                Err(Failure::Fatal(e)) => {
                    error!(identity = %session.identity(), offset = session.offset(), "upload failed: {e}");
                    return Err(e);
                }
                Err(Failure::Retryable(reason)) => reason,
            };

            progress.failures += 1;
            if self.config.retry.is_exhausted(progress.failures) {
                error!(attempts = progress.failures, "giving up: {reason}");
                return Err(UploadError::RetriesExhausted {
                    attempts: progress.failures,
                    last_error: reason,
                });
            }

            let delay = self.config.retry.delay_for_attempt(progress.failures);
            warn!(
                attempt = progress.failures,
                offset = session.offset(),
                delay_ms = delay.as_millis() as u64,
                "attempt failed, retrying: {reason}"
            );
            self.set_state(UploadState::FailedRetryable);
            self.emit(UploadEvent::Retrying {
                attempt: progress.failures,
                delay,
                error: reason,
            });
            progress.speed.reset();

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(UploadState::Done);
        let report = UploadReport {
            total_size: session.total_size(),
            connections: progress.connections,
            chunks_sent: progress.chunks_sent,
            bytes_sent: progress.bytes_sent,
            elapsed: progress.started.elapsed(),
        };
        info!(
            identity = %session.identity(),
            total_size = report.total_size,
            connections = report.connections,
            bytes_resent = report.bytes_resent(),
            "upload complete"
        );
        self.emit(UploadEvent::Completed(report.clone()));
        Ok(report)
    }

    /// One connection: handshake, send what is missing, finish.
    async fn attempt(
        &self,
        session: &mut ClientSession,
        progress: &mut Progress,
    ) -> Result<(), Failure> {
        self.set_state(UploadState::Connecting);
        let stream = self.connector.connect().await.map_err(|e| {
            Failure::Retryable(format!("connect to {} failed: {e}", self.connector.peer()))
        })?;
        progress.connections += 1;
        debug!(connection = progress.connections, "connected");

        let mut framed = FramedStream::new(stream);
        self.handshake(&mut framed, session, progress).await?;
        self.send_chunks(&mut framed, session, progress).await?;
        self.finish(&mut framed).await?;

        if let Err(e) = framed.shutdown().await {
            debug!("shutdown after COMPLETE failed: {e}");
        }
        Ok(())
    }

    async fn handshake<S>(
        &self,
        framed: &mut FramedStream<S>,
        session: &mut ClientSession,
        progress: &mut Progress,
    ) -> Result<(), Failure>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.set_state(UploadState::Handshake);
        let request = session.handshake_request();
        framed.send_request(&request).await?;
        session.mark_handshake_sent();

        let reply = match framed.read_reply().await {
            Ok(reply) => reply,
            Err(e) if e.is_connection_lost() => return Err(e.into()),
            Err(e) => return Err(Failure::Fatal(UploadError::Handshake(e.to_string()))),
        };
        let Reply::Ack { offset } = reply else {
            return Err(Failure::Fatal(UploadError::Handshake(format!(
                "expected ACK, got {reply}"
            ))));
        };

        let previous = session.offset();
        if !session.accept_offset(offset) {
            return Err(Failure::Fatal(UploadError::Handshake(format!(
                "server offset {offset} exceeds file size {}",
                session.total_size()
            ))));
        }
        if offset > previous {
            progress.failures = 0;
        }
        progress.speed.record(offset);

        info!(
            identity = %session.identity(),
            resumed = matches!(request, Request::Resume { .. }),
            offset,
            total_size = session.total_size(),
            "handshake acknowledged"
        );
        Ok(())
    }

    async fn send_chunks<S>(
        &self,
        framed: &mut FramedStream<S>,
        session: &mut ClientSession,
        progress: &mut Progress,
    ) -> Result<(), Failure>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if session.is_complete() {
            return Ok(());
        }
        self.set_state(UploadState::Sending);

        while !session.is_complete() {
            let Some(chunk) = session
                .next_chunk()
                .await
                .map_err(|e| Failure::Fatal(e.into()))?
            else {
                break;
            };

            framed.send_data(&chunk.data).await?;
            progress.chunks_sent += 1;
            progress.bytes_sent += chunk.len() as u64;

            // Anything but a usable ACK here is treated like a dropped
            // connection: the next handshake re-reads the stored offset.
            let reply = framed.read_reply().await?;
            let Reply::Ack { offset } = reply else {
                return Err(Failure::Retryable(format!(
                    "expected ACK after DATA, got {reply}"
                )));
            };
            let previous = session.offset();
            if !session.accept_offset(offset) {
                return Err(Failure::Retryable(format!(
                    "ACK {offset} exceeds file size {}",
                    session.total_size()
                )));
            }

            debug!(len = chunk.len(), offset, "chunk acknowledged");
            if offset > previous {
                progress.failures = 0;
            }
            progress.speed.record(offset);
            self.emit(UploadEvent::Acknowledged {
                offset,
                total_size: session.total_size(),
                bytes_per_second: progress.speed.bytes_per_second(),
            });
        }
        Ok(())
    }

    async fn finish<S>(&self, framed: &mut FramedStream<S>) -> Result<(), Failure>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.set_state(UploadState::Finishing);
        let fatal = |msg: String| Failure::Fatal(UploadError::Finish(msg));

        framed
            .send_request(&Request::Fin)
            .await
            .map_err(|e| fatal(e.to_string()))?;
        match framed.read_reply().await {
            Ok(Reply::Complete) => Ok(()),
            Ok(reply) => Err(fatal(format!("expected COMPLETE, got {reply}"))),
            Err(e) => Err(fatal(e.to_string())),
        }
    }

    fn set_state(&self, state: UploadState) {
        debug!(%state, "upload state");
        self.emit(UploadEvent::StateChanged(state));
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}
