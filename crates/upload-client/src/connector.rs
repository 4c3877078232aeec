use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens the byte streams an upload runs over.
///
/// Called once per connection attempt. Implemented for TCP by
/// [`TcpConnector`]; tests substitute in-memory streams.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect(&self) -> Pin<Box<dyn Future<Output = io::Result<Self::Stream>> + Send + '_>>;

    /// Human-readable peer description for logs.
    fn peer(&self) -> String;
}

/// Connects to `host:port` over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: format!("{}:{port}", host.into()),
            timeout: Duration::from_secs(10),
        }
    }

    /// Bounds each connection attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send + '_>> {
        Box::pin(async move {
            let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", self.addr),
                    )
                })??;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(addr = %self.addr, "failed to set TCP_NODELAY: {e}");
            }
            Ok(stream)
        })
    }

    fn peer(&self) -> String {
        self.addr.clone()
    }
}
