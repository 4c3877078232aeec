//! Framing of control lines and exact-length payloads on a byte stream.

use std::fmt::Display;
use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{trace, warn};

use crate::MAX_LINE_LEN;
use crate::error::ProtocolError;
use crate::messages::{Reply, Request};

/// A byte stream carrying `\n`-terminated control lines and raw payloads.
///
/// Reads go through an internal buffer; writes are passed straight to the
/// stream and flushed at the end of every message.
pub struct FramedStream<S> {
    inner: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Returns a mutable reference to the underlying stream.
    ///
    /// Bytes written here bypass framing; bytes read here bypass the
    /// internal read buffer.
    pub fn get_mut(&mut self) -> &mut S {
        self.inner.get_mut()
    }

    /// Reads one control line, without its terminator.
    ///
    /// Returns `None` on a clean end-of-stream between lines. A stream that
    /// ends inside a line yields [`ProtocolError::ConnectionLost`]; partial
    /// lines are never returned. Lines longer than [`MAX_LINE_LEN`] are
    /// returned truncated and the remainder stays in the stream.
    pub async fn read_line(&mut self) -> Result<Option<String>, ProtocolError> {
        let mut line: Vec<u8> = Vec::new();

        loop {
            let (consumed, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Err(ProtocolError::ConnectionLost(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream closed inside a control line",
                    )));
                }

                let room = MAX_LINE_LEN - line.len();
                let window = &available[..available.len().min(room)];
                match window.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&window[..pos]);
                        (pos + 1, true)
                    }
                    None => {
                        line.extend_from_slice(window);
                        (window.len(), line.len() >= MAX_LINE_LEN)
                    }
                }
            };
            self.inner.consume(consumed);

            if done {
                break;
            }
        }

        if line.len() >= MAX_LINE_LEN {
            warn!(max = MAX_LINE_LEN, "control line truncated");
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let text = String::from_utf8(line)
            .map_err(|e| ProtocolError::Malformed(format!("control line is not UTF-8: {e}")))?;
        trace!(line = %text, "control line received");
        Ok(Some(text))
    }

    /// Fills `buf` completely from the stream.
    pub async fn read_payload(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        self.inner.read_exact(buf).await?;
        Ok(())
    }

    /// Reads and parses the next client request.
    ///
    /// Returns `None` when the peer closed the stream between messages.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        match self.read_line().await? {
            Some(line) => Request::parse(&line).map(Some),
            None => Ok(None),
        }
    }

    /// Reads and parses the next server reply.
    ///
    /// A closed stream is a lost connection here: a reply was owed.
    pub async fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        match self.read_line().await? {
            Some(line) => Reply::parse(&line),
            None => Err(ProtocolError::ConnectionLost(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed while awaiting a reply",
            ))),
        }
    }

    /// Writes a single control line and flushes it.
    pub async fn write_line(&mut self, message: &impl Display) -> Result<(), ProtocolError> {
        let line = format!("{message}\n");
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        trace!(line = %message, "control line sent");
        Ok(())
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<(), ProtocolError> {
        self.write_line(request).await
    }

    pub async fn send_reply(&mut self, reply: Reply) -> Result<(), ProtocolError> {
        self.write_line(&reply).await
    }

    /// Writes a `DATA <n>` line followed by exactly `n` payload bytes.
    pub async fn send_data(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        let header = format!("{}\n", Request::Data { len: payload.len() });
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shuts down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
