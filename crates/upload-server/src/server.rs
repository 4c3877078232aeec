//! TCP accept loop.
//!
//! Binds a listener and spawns one [`ConnectionHandler`] task per accepted
//! connection. There is no cap on concurrent connections.

use std::net::SocketAddr;
use std::path::PathBuf;

use ferry_protocol::{DEFAULT_MAX_PAYLOAD, DEFAULT_PORT};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ServerError;
use crate::handler::{ConnectionHandler, HandlerContext};
use crate::leases::PathLeases;
use crate::types::{CloseReason, ConnectionOutcome, ServerEvent};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub bind: SocketAddr,
    /// Directory holding one sub-directory per client id.
    pub root: PathBuf,
    /// Refuse a handshake whose destination is already being written by
    /// another live connection.
    pub exclusive_paths: bool,
    /// Largest accepted `DATA` payload in bytes.
    pub max_payload: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            root: PathBuf::from("."),
            exclusive_paths: false,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Accepts upload connections until cancelled.
pub struct UploadServer {
    config: ServerConfig,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<ServerEvent>>,
}

impl UploadServer {
    pub fn new(config: ServerConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            events: None,
        }
    }

    /// Publishes [`ServerEvent`]s on `tx` (non-blocking; see
    /// [`EVENT_BUFFER_SIZE`](crate::EVENT_BUFFER_SIZE)).
    pub fn with_events(mut self, tx: mpsc::Sender<ServerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address.
    ///
    /// Split from [`serve`](Self::serve) so callers can learn the actual
    /// port before connections start.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(self.config.bind).await?;
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            root = %self.config.root.display(),
            exclusive_paths = self.config.exclusive_paths,
            "upload server listening"
        );
        Ok(listener)
    }

    /// Binds and serves until cancellation.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until cancellation.
    ///
    /// Each connection runs in its own task. On shutdown, in-flight
    /// connections are cancelled too; their destinations are closed as the
    /// tasks unwind.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        tokio::fs::create_dir_all(&self.config.root).await?;

        let ctx = HandlerContext {
            root: self.config.root.clone(),
            max_payload: self.config.max_payload,
            leases: self.config.exclusive_paths.then(PathLeases::new),
            events: self.events.clone(),
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("upload server shutting down");
                    return Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!(%peer_addr, "connection accepted");
                            let ctx = ctx.clone();
                            let cancel = self.cancel.clone();
                            tokio::spawn(async move {
                                handle_stream(stream, peer_addr, ctx, cancel).await;
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Stops the accept loop and every connection it spawned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn handle_stream(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: HandlerContext,
    cancel: CancellationToken,
) {
    // Control lines are tiny and strictly request/response.
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer_addr, "failed to set TCP_NODELAY: {e}");
    }

    let events = ctx.clone();
    let handler = ConnectionHandler::new(stream, peer_addr.to_string(), ctx);
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%peer_addr, "connection cancelled by shutdown");
            events.emit(ServerEvent::ConnectionClosed {
                peer: peer_addr.to_string(),
                reason: CloseReason::Shutdown,
            });
        }
        result = handler.run() => match result {
            Ok(ConnectionOutcome::Completed { identity, stored_offset }) => {
                debug!(%peer_addr, %identity, stored_offset, "connection finished");
            }
            Ok(ConnectionOutcome::Disconnected) => {
                info!(%peer_addr, "connection closed by peer");
            }
            Err(ServerError::Protocol(e)) if e.is_connection_lost() => {
                warn!(%peer_addr, "connection lost: {e}");
            }
            Err(e) => {
                error!(%peer_addr, "connection aborted: {e}");
            }
        }
    }
}
