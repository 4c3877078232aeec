//! Per-connection upload handler.
//!
//! Reads control lines in a loop and dispatches on the leading token:
//!
//! - `FIRST` / `RESUME` open the destination and answer `ACK <stored>`.
//! - `DATA <n>` reads exactly `n` bytes, appends, syncs, answers `ACK`.
//! - `FIN` closes the destination and answers `COMPLETE`.
//!
//! Anything else ends the connection without a reply. The destination is
//! closed on every exit path.

use std::path::PathBuf;

use ferry_protocol::{FramedStream, ProtocolError, Reply, Request};
use ferry_transfer::TransferIdentity;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ServerError;
use crate::leases::PathLeases;
use crate::session::ServerSession;
use crate::types::{CloseReason, ConnectionOutcome, ServerEvent};

/// Settings shared by every connection of one server.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Directory under which `<client_id>/<file_name>` paths live.
    pub root: PathBuf,
    /// Largest accepted `DATA` payload.
    pub max_payload: usize,
    /// Present when per-path exclusivity is enabled.
    pub leases: Option<PathLeases>,
    pub events: Option<mpsc::Sender<ServerEvent>>,
}

impl HandlerContext {
    pub(crate) fn emit(&self, event: ServerEvent) {
        if let Some(tx) = &self.events {
            // Non-blocking: a full channel drops the event.
            let _ = tx.try_send(event);
        }
    }
}

/// Serves one accepted connection until `FIN`, end-of-stream or error.
pub struct ConnectionHandler<S> {
    framed: FramedStream<S>,
    ctx: HandlerContext,
    peer: String,
    session: Option<ServerSession>,
    buf: Vec<u8>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, ctx: HandlerContext) -> Self {
        Self {
            framed: FramedStream::new(stream),
            ctx,
            peer: peer.into(),
            session: None,
            buf: Vec::new(),
        }
    }

    /// Runs the message loop to completion.
    pub async fn run(mut self) -> Result<ConnectionOutcome, ServerError> {
        let result = self.serve().await;

        if let Some(session) = self.session.take() {
            let identity = session.identity().clone();
            match session.close().await {
                Ok(stored) => {
                    debug!(peer = %self.peer, %identity, stored, "destination closed");
                }
                Err(e) => {
                    warn!(peer = %self.peer, %identity, "failed to close destination: {e}");
                }
            }
        }

        let reason = match &result {
            Ok(ConnectionOutcome::Completed { .. }) => CloseReason::Completed,
            Ok(ConnectionOutcome::Disconnected) => CloseReason::Disconnected,
            Err(e) => CloseReason::Failed(e.to_string()),
        };
        self.ctx.emit(ServerEvent::ConnectionClosed {
            peer: self.peer.clone(),
            reason,
        });

        result
    }

    async fn serve(&mut self) -> Result<ConnectionOutcome, ServerError> {
        loop {
            let Some(request) = self.framed.read_request().await? else {
                debug!(peer = %self.peer, "peer closed the connection");
                return Ok(ConnectionOutcome::Disconnected);
            };

            match request {
                Request::First {
                    client_id,
                    file_name,
                    total_size,
                } => self.handshake(client_id, file_name, Some(total_size)).await?,
                Request::Resume {
                    client_id,
                    file_name,
                } => self.handshake(client_id, file_name, None).await?,
                Request::Data { len } => self.receive_chunk(len).await?,
                Request::Fin => return self.finish().await,
            }
        }
    }

    async fn handshake(
        &mut self,
        client_id: String,
        file_name: String,
        declared_size: Option<u64>,
    ) -> Result<(), ServerError> {
        if let Some(session) = &self.session {
            return Err(ProtocolError::Unexpected(format!(
                "second handshake on a connection already bound to {}",
                session.identity()
            ))
            .into());
        }

        let identity = TransferIdentity::new(client_id, file_name)?;
        let resumed = declared_size.is_none();
        let session = ServerSession::open(
            &self.ctx.root,
            identity.clone(),
            declared_size,
            self.ctx.leases.as_ref(),
        )
        .await?;
        let stored_offset = session.stored_offset();
        self.session = Some(session);

        self.framed
            .send_reply(Reply::Ack {
                offset: stored_offset,
            })
            .await?;

        info!(
            peer = %self.peer,
            %identity,
            resumed,
            stored_offset,
            declared_size = ?declared_size,
            "handshake acknowledged"
        );
        self.ctx.emit(ServerEvent::Handshake {
            identity,
            resumed,
            stored_offset,
        });
        Ok(())
    }

    async fn receive_chunk(&mut self, len: usize) -> Result<(), ServerError> {
        let Some(session) = self.session.as_mut() else {
            return Err(ProtocolError::Unexpected("DATA before handshake".into()).into());
        };
        if len > self.ctx.max_payload {
            return Err(ProtocolError::Malformed(format!(
                "DATA length {len} exceeds limit {}",
                self.ctx.max_payload
            ))
            .into());
        }

        // A payload cut short leaves the file untouched: nothing is
        // appended until all `len` bytes are in memory.
        self.buf.resize(len, 0);
        self.framed.read_payload(&mut self.buf).await?;
        let stored_offset = session.store_chunk(&self.buf).await?;

        self.framed
            .send_reply(Reply::Ack {
                offset: stored_offset,
            })
            .await?;

        self.ctx.emit(ServerEvent::ChunkStored {
            identity: session.identity().clone(),
            len,
            stored_offset,
        });
        Ok(())
    }

    async fn finish(&mut self) -> Result<ConnectionOutcome, ServerError> {
        let Some(session) = self.session.take() else {
            return Err(ProtocolError::Unexpected("FIN before handshake".into()).into());
        };

        let identity = session.identity().clone();
        let stored_offset = session.close().await?;
        self.framed.send_reply(Reply::Complete).await?;

        info!(peer = %self.peer, %identity, stored_offset, "upload complete");
        self.ctx.emit(ServerEvent::Completed {
            identity: identity.clone(),
            stored_offset,
        });
        Ok(ConnectionOutcome::Completed {
            identity,
            stored_offset,
        })
    }
}
