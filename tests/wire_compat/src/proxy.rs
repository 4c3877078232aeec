//! Recording TCP relay that can cut a connection at a scripted point.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// What to do to one relayed connection.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Cut both sides instead of forwarding the n-th server line (1-based).
    DropReply(usize),
    /// Forward only the first n client bytes, then cut both sides.
    CutUpload(usize),
}

/// Bytes forwarded in each direction of one connection.
#[derive(Debug, Default, Clone)]
pub struct Recording {
    pub upstream: Vec<u8>,
    pub downstream: Vec<u8>,
}

impl Recording {
    /// Control lines sent by the client, with `DATA` payloads skipped.
    pub fn requests(&self) -> Vec<String> {
        control_lines(&self.upstream, true)
    }

    pub fn replies(&self) -> Vec<String> {
        control_lines(&self.downstream, false)
    }

    /// Requests and replies interleaved as `> ` / `< ` lines.
    pub fn transcript(&self) -> Vec<String> {
        let requests = self.requests();
        let replies = self.replies();
        let mut lines = Vec::new();
        for i in 0..requests.len().max(replies.len()) {
            if let Some(req) = requests.get(i) {
                lines.push(format!("> {req}"));
            }
            if let Some(rep) = replies.get(i) {
                lines.push(format!("< {rep}"));
            }
        }
        lines
    }
}

pub struct Proxy {
    pub addr: SocketAddr,
    recordings: Arc<Mutex<Vec<Arc<Mutex<Recording>>>>>,
}

impl Proxy {
    /// Relays to `upstream`, applying `faults` to the first connections in
    /// order; later connections pass through untouched.
    pub async fn start(upstream: SocketAddr, faults: Vec<Fault>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recordings: Arc<Mutex<Vec<Arc<Mutex<Recording>>>>> = Arc::default();
        let mut faults: VecDeque<Fault> = faults.into();

        let all = Arc::clone(&recordings);
        tokio::spawn(async move {
            while let Ok((client, _)) = listener.accept().await {
                let recording = Arc::new(Mutex::new(Recording::default()));
                all.lock().unwrap().push(Arc::clone(&recording));
                let fault = faults.pop_front();
                tokio::spawn(relay(client, upstream, fault, recording));
            }
        });

        Self { addr, recordings }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Snapshot of every connection relayed so far, in accept order.
    pub fn recordings(&self) -> Vec<Recording> {
        self.recordings
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.lock().unwrap().clone())
            .collect()
    }
}

async fn relay(
    client: TcpStream,
    upstream: SocketAddr,
    fault: Option<Fault>,
    recording: Arc<Mutex<Recording>>,
) {
    let Ok(server) = TcpStream::connect(upstream).await else {
        return;
    };
    let (client_rx, client_tx) = client.into_split();
    let (server_rx, server_tx) = server.into_split();

    let upload_budget = match fault {
        Some(Fault::CutUpload(n)) => Some(n),
        _ => None,
    };
    let reply_cut = match fault {
        Some(Fault::DropReply(n)) => Some(n),
        _ => None,
    };

    // Whichever direction ends first tears down both sockets.
    tokio::select! {
        _ = pump_up(client_rx, server_tx, upload_budget, Arc::clone(&recording)) => {}
        _ = pump_down(server_rx, client_tx, reply_cut, recording) => {}
    }
}

async fn pump_up(
    mut from: OwnedReadHalf,
    mut to: OwnedWriteHalf,
    mut budget: Option<usize>,
    recording: Arc<Mutex<Recording>>,
) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = match from.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let allowed = budget.map_or(n, |b| b.min(n));
        recording
            .lock()
            .unwrap()
            .upstream
            .extend_from_slice(&buf[..allowed]);
        if to.write_all(&buf[..allowed]).await.is_err() {
            return;
        }
        if let Some(left) = budget.as_mut() {
            *left -= allowed;
            if *left == 0 {
                return;
            }
        }
    }
}

async fn pump_down(
    mut from: OwnedReadHalf,
    mut to: OwnedWriteHalf,
    cut_at_line: Option<usize>,
    recording: Arc<Mutex<Recording>>,
) {
    let mut buf = vec![0u8; 4096];
    let mut lines_seen = 0usize;
    loop {
        let n = match from.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        let mut forward = n;
        let mut cut_here = false;
        if let Some(cut) = cut_at_line {
            for (i, &b) in buf[..n].iter().enumerate() {
                if lines_seen + 1 == cut {
                    forward = i;
                    cut_here = true;
                    break;
                }
                if b == b'\n' {
                    lines_seen += 1;
                }
            }
        }

        recording
            .lock()
            .unwrap()
            .downstream
            .extend_from_slice(&buf[..forward]);
        if to.write_all(&buf[..forward]).await.is_err() || cut_here {
            return;
        }
    }
}

/// Splits a recorded byte stream into complete control lines.
fn control_lines(bytes: &[u8], skip_payloads: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pos = 0;
    while let Some(nl) = bytes[pos..].iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&bytes[pos..pos + nl]).into_owned();
        pos += nl + 1;
        if skip_payloads
            && let Some(len) = line
                .strip_prefix("DATA ")
                .and_then(|n| n.parse::<usize>().ok())
        {
            pos = (pos + len).min(bytes.len());
        }
        lines.push(line);
    }
    lines
}

#[test]
fn control_lines_skip_payload_bytes() {
    let stream = b"FIRST a b 3\nDATA 3\n\n\nxFIN\n";
    assert_eq!(
        control_lines(stream, true),
        vec!["FIRST a b 3", "DATA 3", "FIN"]
    );
}

#[test]
fn partial_trailing_line_is_ignored() {
    assert_eq!(control_lines(b"ACK 0\nACK 40", false), vec!["ACK 0"]);
}
