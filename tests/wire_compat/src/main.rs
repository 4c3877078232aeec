fn main() {
    println!("Run `cargo test -p wire-compat` to execute end-to-end protocol tests.");
}

#[cfg(test)]
mod proxy;

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::SocketAddr;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use ferry_client::{
        RetryPolicy, TcpConnector, UploadConfig, UploadDriver, UploadError, UploadReport,
    };
    use ferry_protocol::{FramedStream, Reply, Request};
    use ferry_server::{ServerConfig, ServerEvent, UploadServer};
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::proxy::{Fault, Proxy};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a transcript fixture, dropping comments and blank lines.
    fn load_fixture(name: &str) -> Vec<String> {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        data.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect()
    }

    struct TestServer {
        root: TempDir,
        addr: SocketAddr,
        cancel: CancellationToken,
        events: mpsc::Receiver<ServerEvent>,
    }

    impl TestServer {
        async fn start() -> Self {
            let root = TempDir::new().unwrap();
            let cancel = CancellationToken::new();
            let (tx, events) = mpsc::channel(ferry_server::EVENT_BUFFER_SIZE);
            let server = UploadServer::new(
                ServerConfig {
                    bind: ([127, 0, 0, 1], 0).into(),
                    root: root.path().to_path_buf(),
                    ..ServerConfig::default()
                },
                cancel.clone(),
            )
            .with_events(tx);

            let listener = server.bind().await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { server.serve(listener).await });

            Self {
                root,
                addr,
                cancel,
                events,
            }
        }

        fn stored(&self, client_id: &str, file_name: &str) -> Vec<u8> {
            fs::read(self.root.path().join(client_id).join(file_name)).unwrap()
        }

        /// Collects events up to and including the next `Completed`.
        async fn events_until_completed(&mut self) -> Vec<ServerEvent> {
            let mut seen = Vec::new();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("no Completed event")
                    .expect("event channel closed");
                let done = matches!(event, ServerEvent::Completed { .. });
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn handshakes(events: &[ServerEvent]) -> Vec<(bool, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Handshake {
                    resumed,
                    stored_offset,
                    ..
                } => Some((*resumed, *stored_offset)),
                _ => None,
            })
            .collect()
    }

    fn stored_chunks(events: &[ServerEvent]) -> Vec<(usize, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::ChunkStored {
                    len, stored_offset, ..
                } => Some((*len, *stored_offset)),
                _ => None,
            })
            .collect()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn write_source(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    async fn upload(port: u16, client_id: &str, path: &Path) -> UploadReport {
        let config = UploadConfig {
            chunk_size: 4096,
            retry: RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(Some(20)),
            ..UploadConfig::new(client_id, path)
        };
        UploadDriver::new(
            TcpConnector::new("127.0.0.1", port),
            config,
            CancellationToken::new(),
        )
        .run()
        .await
        .unwrap()
    }

    // --- Reference scenarios ---

    #[tokio::test]
    async fn empty_file_goes_straight_to_fin() {
        let mut server = TestServer::start().await;
        let proxy = Proxy::start(server.addr, vec![]).await;
        let src = TempDir::new().unwrap();
        let path = write_source(&src, "empty.bin", b"");

        let report = upload(proxy.port(), "alice", &path).await;
        let events = server.events_until_completed().await;

        assert_eq!(report.total_size, 0);
        assert_eq!(report.chunks_sent, 0);
        assert_eq!(proxy.recordings()[0].transcript(), load_fixture("empty_file.txt"));
        assert!(server.stored("alice", "empty.bin").is_empty());
        assert!(stored_chunks(&events).is_empty());
    }

    #[tokio::test]
    async fn ten_thousand_bytes_in_three_chunks() {
        let mut server = TestServer::start().await;
        let proxy = Proxy::start(server.addr, vec![]).await;
        let src = TempDir::new().unwrap();
        let data = pattern(10_000);
        let path = write_source(&src, "payload.bin", &data);

        let report = upload(proxy.port(), "alice", &path).await;
        let events = server.events_until_completed().await;

        assert_eq!(report.connections, 1);
        assert_eq!(report.chunks_sent, 3);
        assert_eq!(
            proxy.recordings()[0].transcript(),
            load_fixture("ten_thousand_bytes.txt")
        );
        assert_eq!(
            stored_chunks(&events),
            vec![(4096, 4096), (4096, 8192), (1808, 10_000)]
        );
        assert_eq!(server.stored("alice", "payload.bin"), data);
    }

    #[tokio::test]
    async fn resumes_after_drop_following_second_ack() {
        let mut server = TestServer::start().await;
        // The handshake ACK is line 1; ACK 8192 (second DATA) is line 3.
        let proxy = Proxy::start(server.addr, vec![Fault::DropReply(3)]).await;
        let src = TempDir::new().unwrap();
        let data = pattern(10_000);
        let path = write_source(&src, "payload.bin", &data);

        let report = upload(proxy.port(), "alice", &path).await;
        let events = server.events_until_completed().await;

        let recordings = proxy.recordings();
        assert_eq!(recordings.len(), 2);
        assert_eq!(
            recordings[0].requests(),
            vec!["FIRST alice payload.bin 10000", "DATA 4096", "DATA 4096"]
        );
        assert_eq!(recordings[0].replies(), vec!["ACK 0", "ACK 4096"]);
        assert_eq!(
            recordings[1].transcript(),
            load_fixture("resume_after_second_ack.txt")
        );

        assert_eq!(handshakes(&events), vec![(false, 0), (true, 8192)]);
        assert_eq!(
            stored_chunks(&events),
            vec![(4096, 4096), (4096, 8192), (1808, 10_000)]
        );
        assert_eq!(report.connections, 2);
        assert_eq!(server.stored("alice", "payload.bin"), data);
    }

    #[tokio::test]
    async fn mid_chunk_drop_stores_nothing_from_the_partial_chunk() {
        let mut server = TestServer::start().await;
        let first = Request::First {
            client_id: "alice".into(),
            file_name: "payload.bin".into(),
            total_size: 10_000,
        };
        let budget = format!("{first}\n").len() + "DATA 4096\n".len() + 1000;
        let proxy = Proxy::start(server.addr, vec![Fault::CutUpload(budget)]).await;
        let src = TempDir::new().unwrap();
        let data = pattern(10_000);
        let path = write_source(&src, "payload.bin", &data);

        upload(proxy.port(), "alice", &path).await;
        let events = server.events_until_completed().await;

        assert_eq!(handshakes(&events), vec![(false, 0), (true, 0)]);
        assert_eq!(
            stored_chunks(&events),
            vec![(4096, 4096), (4096, 8192), (1808, 10_000)]
        );
        assert_eq!(
            proxy.recordings()[1].transcript(),
            load_fixture("resume_after_mid_chunk_drop.txt")
        );
        assert_eq!(server.stored("alice", "payload.bin"), data);
    }

    #[tokio::test]
    async fn first_on_existing_file_resumes_at_its_size() {
        let mut server = TestServer::start().await;
        let data = pattern(10_000);
        let dest_dir = server.root.path().join("alice");
        fs::create_dir_all(&dest_dir).unwrap();
        fs::write(dest_dir.join("payload.bin"), &data[..5000]).unwrap();

        let proxy = Proxy::start(server.addr, vec![]).await;
        let src = TempDir::new().unwrap();
        let path = write_source(&src, "payload.bin", &data);

        upload(proxy.port(), "alice", &path).await;
        let events = server.events_until_completed().await;

        assert_eq!(handshakes(&events), vec![(false, 5000)]);
        assert_eq!(
            proxy.recordings()[0].transcript(),
            load_fixture("first_on_partial_file.txt")
        );
        assert_eq!(server.stored("alice", "payload.bin"), data);
    }

    // --- Properties ---

    #[tokio::test]
    async fn output_is_byte_identical_for_all_sizes() {
        let mut server = TestServer::start().await;
        let src = TempDir::new().unwrap();

        for size in [0, 1, 4095, 4096, 4097, 12_288, 100_000] {
            let name = format!("size-{size}.bin");
            let data = pattern(size);
            let path = write_source(&src, &name, &data);

            let report = upload(server.addr.port(), "alice", &path).await;
            server.events_until_completed().await;

            assert_eq!(report.total_size, size as u64);
            assert_eq!(report.chunks_sent, size.div_ceil(4096) as u64);
            assert_eq!(server.stored("alice", &name), data, "size {size}");
        }
    }

    #[tokio::test]
    async fn resume_is_idempotent() {
        let server = TestServer::start().await;
        let data = pattern(3 * 4096);

        let mut conn = FramedStream::new(TcpStream::connect(server.addr).await.unwrap());
        conn.send_request(&Request::First {
            client_id: "alice".into(),
            file_name: "payload.bin".into(),
            total_size: data.len() as u64,
        })
        .await
        .unwrap();
        assert_eq!(conn.read_reply().await.unwrap(), Reply::Ack { offset: 0 });
        for (k, chunk) in data.chunks(4096).take(2).enumerate() {
            conn.send_data(chunk).await.unwrap();
            assert_eq!(
                conn.read_reply().await.unwrap(),
                Reply::Ack {
                    offset: (k as u64 + 1) * 4096
                }
            );
        }
        drop(conn);

        for _ in 0..3 {
            let mut conn = FramedStream::new(TcpStream::connect(server.addr).await.unwrap());
            conn.send_request(&Request::Resume {
                client_id: "alice".into(),
                file_name: "payload.bin".into(),
            })
            .await
            .unwrap();
            assert_eq!(conn.read_reply().await.unwrap(), Reply::Ack { offset: 8192 });
        }
        assert_eq!(server.stored("alice", "payload.bin"), &data[..8192]);
    }

    #[tokio::test]
    async fn concurrent_clients_write_separate_files() {
        let server = TestServer::start().await;
        let src = TempDir::new().unwrap();
        let alice = pattern(50_000);
        let bob: Vec<u8> = alice.iter().rev().copied().collect();
        let alice_path = write_source(&src, "alice.bin", &alice);
        let bob_dir = TempDir::new().unwrap();
        let bob_path = write_source(&bob_dir, "alice.bin", &bob);

        let port = server.addr.port();
        let (a, b) = tokio::join!(
            upload(port, "alice", &alice_path),
            upload(port, "bob", &bob_path)
        );

        assert_eq!(a.total_size, 50_000);
        assert_eq!(b.total_size, 50_000);
        assert_eq!(server.stored("alice", "alice.bin"), alice);
        assert_eq!(server.stored("bob", "alice.bin"), bob);
    }

    #[tokio::test]
    async fn chunk_larger_than_server_payload_limit_is_refused_up_front() {
        let server = TestServer::start().await;
        let src = TempDir::new().unwrap();
        let limit = ferry_protocol::DEFAULT_MAX_PAYLOAD;
        let path = write_source(&src, "big.bin", &pattern(3 * limit));

        let config = UploadConfig {
            chunk_size: 2 * limit,
            ..UploadConfig::new("alice", &path)
        };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            UploadDriver::new(
                TcpConnector::new("127.0.0.1", server.addr.port()),
                config,
                CancellationToken::new(),
            )
            .run(),
        )
        .await
        .expect("upload did not terminate");

        assert!(matches!(result, Err(UploadError::InvalidChunkSize(n)) if n == 2 * limit));
        assert!(!server.root.path().join("alice").join("big.bin").exists());
    }
}
