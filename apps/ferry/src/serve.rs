use ferry_server::{CloseReason, EVENT_BUFFER_SIZE, ServerConfig, ServerEvent, UploadServer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Running totals printed when the server stops.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    connections: u64,
    failed: u64,
    completed: u64,
    bytes_stored: u64,
}

impl Tally {
    fn record(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Handshake { .. } => {}
            ServerEvent::ChunkStored { len, .. } => self.bytes_stored += *len as u64,
            ServerEvent::Completed { .. } => self.completed += 1,
            ServerEvent::ConnectionClosed { reason, .. } => {
                self.connections += 1;
                if matches!(reason, CloseReason::Failed(_)) {
                    self.failed += 1;
                }
            }
        }
    }
}

/// Runs the upload server until Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let server = UploadServer::new(config, cancel.clone()).with_events(tx);
    let listener = server.bind().await?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        shutdown.cancel();
    });

    let tally = tokio::spawn(async move {
        let mut tally = Tally::default();
        while let Some(event) = rx.recv().await {
            tally.record(&event);
        }
        tally
    });

    server.serve(listener).await?;
    drop(server);

    // Handlers still unwinding hold senders; report what has arrived so far.
    let summary = tokio::time::timeout(std::time::Duration::from_secs(1), tally).await;
    if let Ok(Ok(tally)) = summary {
        info!(
            connections = tally.connections,
            failed = tally.failed,
            completed = tally.completed,
            bytes_stored = tally.bytes_stored,
            "server stopped"
        );
    }
    Ok(())
}
