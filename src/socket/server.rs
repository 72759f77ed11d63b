//! Echo server for demos and integration tests.
//!
//! Listens on a Unix socket or TCP port and echoes whatever each connection
//! sends. In framed mode every frame comes back as a frame with the same
//! payload; in raw mode every read chunk comes back prefixed with `echo:`.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::address::Address;
use super::framing::{write_frame, FrameDecoder, FrameError};
use super::transport::BoxedStream;
use crate::config::Framing;
use crate::constants::{MAX_FRAME_SIZE, READ_BUFFER_SIZE};

/// Prefix raw mode puts in front of every echoed chunk.
pub const RAW_ECHO_PREFIX: &[u8] = b"echo:";

// sun_path is 104 on macOS, 108 on Linux; use the conservative limit
const MAX_SOCKET_PATH: usize = 104;

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    async fn accept(&self) -> std::io::Result<(BoxedStream, String)> {
        match self {
            Self::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok((Box::new(stream), "unix peer".to_string()))
            }
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), addr.to_string()))
            }
        }
    }
}

/// Running echo server.
///
/// Dropping the value leaves the accept loop running; call
/// [`shutdown`](Self::shutdown) to stop it.
#[derive(Debug)]
pub struct EchoServer {
    /// Address clients should dial (TCP port 0 resolved to the real port).
    address: Address,
    framing: Framing,
    shutdown: CancellationToken,
    accept_handle: JoinHandle<()>,
}

impl EchoServer {
    /// Bind `address` and spawn the accept loop.
    ///
    /// For Unix sockets, removes any stale socket file, creates the parent
    /// directory, and restricts the socket to its owner (0600).
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub fn start(address: &Address, framing: Framing) -> Result<Self> {
        let (listener, address) = match address {
            Address::Unix(path) => (Listener::Unix(bind_unix(path)?), address.clone()),
            Address::Tcp(target) => {
                let (listener, local) = bind_tcp(target)?;
                (Listener::Tcp(listener), Address::Tcp(local.to_string()))
            }
        };

        log::info!("[EchoServer] Listening on {address} ({framing:?})");

        let shutdown = CancellationToken::new();
        let accept_handle = tokio::spawn(accept_loop(listener, framing, shutdown.clone()));

        Ok(Self {
            address,
            framing,
            shutdown,
            accept_handle,
        })
    }

    /// Address the server is reachable at.
    pub fn local_address(&self) -> &Address {
        &self.address
    }

    /// Framing the server echoes with.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Stop accepting, drop every open connection, and remove the socket file.
    pub fn shutdown(self) {
        self.shutdown.cancel();
        self.accept_handle.abort();
        if let Address::Unix(path) = &self.address {
            if let Err(e) = std::fs::remove_file(path) {
                log::debug!("[EchoServer] Socket file cleanup for {}: {e}", path.display());
            }
        }
        log::info!("[EchoServer] Stopped listening on {}", self.address);
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener> {
    let path_len = path.as_os_str().len();
    if path_len >= MAX_SOCKET_PATH {
        anyhow::bail!(
            "Socket path too long ({path_len} bytes, max {}): {}",
            MAX_SOCKET_PATH - 1,
            path.display()
        );
    }

    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket: {}", path.display()))?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
    }

    let listener = std::os::unix::net::UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    listener.set_nonblocking(true)?;
    Ok(UnixListener::from_std(listener)?)
}

fn bind_tcp(target: &str) -> Result<(TcpListener, SocketAddr)> {
    let listener = std::net::TcpListener::bind(target)
        .with_context(|| format!("Failed to bind TCP listener: {target}"))?;
    let local = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    Ok((TcpListener::from_std(listener)?, local))
}

async fn accept_loop(listener: Listener, framing: Framing, shutdown: CancellationToken) {
    let mut next_id: u64 = 0;
    loop {
        let accepted = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                next_id += 1;
                log::info!("[EchoServer] Client #{next_id} connected from {peer}");
                tokio::spawn(handle_connection(next_id, stream, framing, shutdown.clone()));
            }
            Err(e) => {
                log::error!("[EchoServer] Accept error: {e}");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
    log::debug!("[EchoServer] Accept loop stopped");
}

async fn handle_connection(
    id: u64,
    mut stream: BoxedStream,
    framing: Framing,
    shutdown: CancellationToken,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    log::warn!("[EchoServer] Client #{id} read error: {e}");
                    break;
                }
            },
        };

        let echoed = match framing {
            Framing::LengthPrefixed => echo_frames(&mut stream, &mut decoder, &buf[..n]).await,
            Framing::Raw => echo_raw(&mut stream, &buf[..n]).await,
        };
        if let Err(e) = echoed {
            log::warn!("[EchoServer] Client #{id} dropped: {e}");
            break;
        }
    }

    log::info!("[EchoServer] Client #{id} disconnected");
}

async fn echo_frames(
    stream: &mut BoxedStream,
    decoder: &mut FrameDecoder,
    bytes: &[u8],
) -> Result<(), FrameError> {
    for payload in decoder.feed(bytes)? {
        log::debug!("[EchoServer] Echoing {} byte frame", payload.len());
        write_frame(stream, &payload, MAX_FRAME_SIZE).await?;
    }
    Ok(())
}

async fn echo_raw(stream: &mut BoxedStream, chunk: &[u8]) -> Result<(), FrameError> {
    let mut reply = Vec::with_capacity(RAW_ECHO_PREFIX.len() + chunk.len());
    reply.extend_from_slice(RAW_ECHO_PREFIX);
    reply.extend_from_slice(chunk);
    stream
        .write_all(&reply)
        .await
        .map_err(FrameError::from_write_error)?;
    stream.flush().await.map_err(FrameError::from_write_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::framing::encode_frame;
    use std::time::Duration;
    use tokio::net::{TcpStream, UnixStream};

    async fn read_some(stream: &mut (impl AsyncReadExt + Unpin)) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("Timed out")
            .expect("Read failed");
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn test_framed_echo_over_unix_socket() {
        let tmp = tempfile::TempDir::new().unwrap();
        let address = Address::Unix(tmp.path().join("echo.sock"));
        let server = EchoServer::start(&address, Framing::LengthPrefixed).unwrap();

        let mut stream = UnixStream::connect(tmp.path().join("echo.sock")).await.unwrap();
        stream
            .write_all(&encode_frame(b"hello", MAX_FRAME_SIZE).unwrap())
            .await
            .unwrap();

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        while frames.is_empty() {
            frames.extend(decoder.feed(&read_some(&mut stream).await).unwrap());
        }
        assert_eq!(frames, vec![b"hello".to_vec()]);

        server.shutdown();
        assert!(!tmp.path().join("echo.sock").exists());
    }

    #[tokio::test]
    async fn test_raw_echo_prefixes_chunk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("raw.sock");
        let server = EchoServer::start(&Address::Unix(path.clone()), Framing::Raw).unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"hi").await.unwrap();
        let mut echoed = Vec::new();
        while echoed.len() < 7 {
            echoed.extend(read_some(&mut stream).await);
        }
        assert_eq!(echoed, b"echo:hi");

        server.shutdown();
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("stale.sock");
        std::fs::write(&path, b"leftover").unwrap();

        let server = EchoServer::start(&Address::Unix(path.clone()), Framing::Raw).unwrap();
        assert!(UnixStream::connect(&path).await.is_ok());
        server.shutdown();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("perm.sock");
        let server = EchoServer::start(&Address::Unix(path.clone()), Framing::Raw).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_tcp_port_zero_resolves() {
        let server =
            EchoServer::start(&Address::Tcp("127.0.0.1:0".into()), Framing::Raw).unwrap();
        let Address::Tcp(local) = server.local_address().clone() else {
            panic!("Expected TCP address");
        };
        assert!(!local.ends_with(":0"), "port should be resolved: {local}");

        let mut stream = TcpStream::connect(&local).await.unwrap();
        stream.write_all(b"x").await.unwrap();
        let mut echoed = Vec::new();
        while echoed.len() < 6 {
            echoed.extend(read_some(&mut stream).await);
        }
        assert_eq!(echoed, b"echo:x");
        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("down.sock");
        let server = EchoServer::start(&Address::Unix(path.clone()), Framing::Raw).unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        // Make sure the connection has been handed to its task.
        stream.write_all(b"a").await.unwrap();
        let _ = read_some(&mut stream).await;

        server.shutdown();
        assert!(read_some(&mut stream).await.is_empty(), "expected EOF after shutdown");
    }

    #[test]
    fn test_socket_path_length_validation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a".repeat(200)).join("test.sock");
        let err = bind_unix(&path).unwrap_err().to_string();
        assert!(err.contains("too long"), "Error should mention path too long: {err}");
    }
}
