//! Control messages exchanged on the wire.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// A control line sent by the uploading client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Opens the first connection of a logical transfer.
    First {
        client_id: String,
        file_name: String,
        total_size: u64,
    },
    /// Re-opens a transfer after a reconnect.
    Resume { client_id: String, file_name: String },
    /// Announces a payload of exactly `len` bytes.
    Data { len: usize },
    /// Signals that every byte has been acknowledged.
    Fin,
}

impl Request {
    /// Parses a control line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_ascii_whitespace();
        let command = tokens
            .next()
            .ok_or_else(|| ProtocolError::Malformed("empty control line".into()))?;
        let args: Vec<&str> = tokens.collect();

        match command {
            "FIRST" => {
                expect_args(command, &args, 3)?;
                Ok(Self::First {
                    client_id: args[0].to_string(),
                    file_name: args[1].to_string(),
                    total_size: parse_number(command, args[2])?,
                })
            }
            "RESUME" => {
                expect_args(command, &args, 2)?;
                Ok(Self::Resume {
                    client_id: args[0].to_string(),
                    file_name: args[1].to_string(),
                })
            }
            "DATA" => {
                expect_args(command, &args, 1)?;
                let len: usize = parse_number(command, args[0])?;
                if len == 0 {
                    return Err(ProtocolError::Malformed("DATA length must be positive".into()));
                }
                Ok(Self::Data { len })
            }
            "FIN" => {
                expect_args(command, &args, 0)?;
                Ok(Self::Fin)
            }
            other => Err(ProtocolError::Unexpected(format!("unknown command: {other}"))),
        }
    }

    /// Returns the `(client_id, file_name)` pair of a handshake request.
    pub fn identity(&self) -> Option<(&str, &str)> {
        match self {
            Self::First {
                client_id,
                file_name,
                ..
            }
            | Self::Resume {
                client_id,
                file_name,
            } => Some((client_id, file_name)),
            Self::Data { .. } | Self::Fin => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First {
                client_id,
                file_name,
                total_size,
            } => write!(f, "FIRST {client_id} {file_name} {total_size}"),
            Self::Resume {
                client_id,
                file_name,
            } => write!(f, "RESUME {client_id} {file_name}"),
            Self::Data { len } => write!(f, "DATA {len}"),
            Self::Fin => f.write_str("FIN"),
        }
    }
}

impl FromStr for Request {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// A control line sent by the receiving server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Number of bytes durably stored for the transfer.
    Ack { offset: u64 },
    /// The destination file was closed after `FIN`.
    Complete,
}

impl Reply {
    /// Parses a reply line (without its terminator).
    ///
    /// Any line beginning with `COMPLETE` is accepted as [`Reply::Complete`].
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if line.starts_with("COMPLETE") {
            return Ok(Self::Complete);
        }

        let mut tokens = line.split_ascii_whitespace();
        match tokens.next() {
            Some("ACK") => {
                let args: Vec<&str> = tokens.collect();
                expect_args("ACK", &args, 1)?;
                Ok(Self::Ack {
                    offset: parse_number("ACK", args[0])?,
                })
            }
            Some(other) => Err(ProtocolError::Unexpected(format!("unknown reply: {other}"))),
            None => Err(ProtocolError::Malformed("empty reply line".into())),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack { offset } => write!(f, "ACK {offset}"),
            Self::Complete => f.write_str("COMPLETE"),
        }
    }
}

impl FromStr for Reply {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn expect_args(command: &str, args: &[&str], expected: usize) -> Result<(), ProtocolError> {
    if args.len() != expected {
        return Err(ProtocolError::Malformed(format!(
            "{command} takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn parse_number<T: FromStr>(command: &str, token: &str) -> Result<T, ProtocolError> {
    // `u64::from_str` accepts a leading '+', the wire format does not.
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::Malformed(format!(
            "{command}: not a non-negative integer: {token}"
        )));
    }
    token
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("{command}: number out of range: {token}")))
}
