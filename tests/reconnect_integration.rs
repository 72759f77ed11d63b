//! End-to-end tests: the reconnecting client against the echo server over
//! real sockets.

use std::io;
use std::path::Path;
use std::time::Duration;

use resocket::{
    Address, ClientConfig, ClientError, ConnectionState, EchoServer, Framing, ReconnectPolicy,
    ReconnectingClient,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct ChannelSink(mpsc::UnboundedSender<Vec<u8>>);

impl io::Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    client: ReconnectingClient,
    cancel: CancellationToken,
    received: mpsc::UnboundedReceiver<Vec<u8>>,
    task: JoinHandle<Result<(), ClientError>>,
}

impl Harness {
    fn start(address: String, framing: Framing) -> Self {
        let client = ReconnectingClient::new(ClientConfig {
            framing,
            reconnect: ReconnectPolicy::Fixed { delay_ms: 20 },
            ..ClientConfig::default()
        });
        let cancel = CancellationToken::new();
        let (tx, received) = mpsc::unbounded_channel();

        let runner = client.clone();
        let runner_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            runner
                .connect(runner_cancel, &address, ChannelSink(tx))
                .await
        });

        Self {
            client,
            cancel,
            received,
            task,
        }
    }

    async fn wait_until(&self, pred: impl FnMut(&ConnectionState) -> bool) {
        let mut rx = self.client.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("Timed out waiting for state")
            .expect("State channel closed");
    }

    async fn next_message(&mut self) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("Timed out waiting for echo")
            .expect("Sink channel closed")
    }

    async fn stop(self) -> Result<(), ClientError> {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("connect did not return")
            .expect("connect task panicked")
    }
}

fn unix_address(path: &Path) -> Address {
    Address::Unix(path.to_path_buf())
}

#[tokio::test]
async fn test_framed_round_trip_over_unix_socket() {
    let tmp = tempfile::TempDir::new().unwrap();
    let address = unix_address(&tmp.path().join("echo.sock"));
    let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();

    let mut harness = Harness::start(address.to_string(), Framing::LengthPrefixed);
    harness.wait_until(|s| *s == ConnectionState::Connected).await;

    harness.client.write(b"hello").unwrap();
    assert_eq!(harness.next_message().await, b"hello");

    assert!(matches!(harness.stop().await, Err(ClientError::Cancelled)));
    server.shutdown();
}

#[tokio::test]
async fn test_frames_arrive_in_write_order() {
    let tmp = tempfile::TempDir::new().unwrap();
    let address = unix_address(&tmp.path().join("fifo.sock"));
    let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();

    let mut harness = Harness::start(address.to_string(), Framing::LengthPrefixed);
    for i in 0..20 {
        harness.client.write(format!("msg-{i}").as_bytes()).unwrap();
    }
    for i in 0..20 {
        assert_eq!(harness.next_message().await, format!("msg-{i}").into_bytes());
    }

    let _ = harness.stop().await;
    server.shutdown();
}

#[tokio::test]
async fn test_raw_mode_echo() {
    let tmp = tempfile::TempDir::new().unwrap();
    let address = unix_address(&tmp.path().join("raw.sock"));
    let server = EchoServer::start(&address, Framing::Raw).unwrap();

    let mut harness = Harness::start(address.to_string(), Framing::Raw);
    harness.client.write(b"hi").unwrap();

    let mut echoed = Vec::new();
    while echoed.len() < b"echo:hi".len() {
        echoed.extend(harness.next_message().await);
    }
    assert_eq!(echoed, b"echo:hi");

    let _ = harness.stop().await;
    server.shutdown();
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let server =
        EchoServer::start(&Address::Tcp("127.0.0.1:0".into()), Framing::LengthPrefixed).unwrap();

    let mut harness = Harness::start(server.local_address().to_string(), Framing::LengthPrefixed);
    harness.client.write(b"over tcp").unwrap();
    assert_eq!(harness.next_message().await, b"over tcp");

    let _ = harness.stop().await;
    server.shutdown();
}

#[tokio::test]
async fn test_client_waits_for_server_to_come_up() {
    let tmp = tempfile::TempDir::new().unwrap();
    let address = unix_address(&tmp.path().join("late.sock"));

    let mut harness = Harness::start(address.to_string(), Framing::LengthPrefixed);
    harness
        .wait_until(|s| matches!(s, ConnectionState::Reconnecting { attempt, .. } if *attempt >= 2))
        .await;

    // Queued while nothing is listening.
    harness.client.write(b"early").unwrap();

    let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();
    assert_eq!(harness.next_message().await, b"early");
    assert_eq!(harness.client.retry_attempt(), 0);

    let _ = harness.stop().await;
    server.shutdown();
}

#[tokio::test]
async fn test_reconnects_after_server_restart() {
    let tmp = tempfile::TempDir::new().unwrap();
    let address = unix_address(&tmp.path().join("restart.sock"));
    let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();

    let mut harness = Harness::start(address.to_string(), Framing::LengthPrefixed);
    harness.client.write(b"before").unwrap();
    assert_eq!(harness.next_message().await, b"before");

    server.shutdown();
    harness.wait_until(|s| *s != ConnectionState::Connected).await;

    // Survives in the queue until the next connection.
    harness.client.write(b"after").unwrap();

    let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();
    harness.wait_until(|s| *s == ConnectionState::Connected).await;
    assert_eq!(harness.next_message().await, b"after");

    let _ = harness.stop().await;
    server.shutdown();
}

#[tokio::test]
async fn test_close_ends_connect_and_rejects_writes() {
    let tmp = tempfile::TempDir::new().unwrap();
    let address = unix_address(&tmp.path().join("close.sock"));
    let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();

    let harness = Harness::start(address.to_string(), Framing::LengthPrefixed);
    harness.wait_until(|s| *s == ConnectionState::Connected).await;

    harness.client.close();
    let result = tokio::time::timeout(Duration::from_secs(5), harness.task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ClientError::Closed)));
    assert!(matches!(harness.client.write(b"late"), Err(ClientError::Closed)));
    assert_eq!(harness.client.state(), ConnectionState::Closed);

    server.shutdown();
}
