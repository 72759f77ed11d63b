//! Byte-stream transports.
//!
//! The supervisor never names a concrete socket type. It asks a [`Dialer`]
//! for a [`BoxedStream`] and splits it into read and write halves, so Unix
//! sockets, TCP, and in-memory pipes in tests all go through the same path.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use super::address::Address;

/// Any bidirectional byte stream the pumps can drive.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Type-erased live connection.
pub type BoxedStream = Box<dyn ByteStream>;

/// Opens connections for the supervisor.
///
/// A dialer performs one attempt per call; timeouts and retries are the
/// supervisor's business.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the endpoint cannot be reached.
    async fn dial(&self, address: &Address) -> io::Result<BoxedStream>;
}

/// Dials real sockets: Unix domain sockets and TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketDialer;

#[async_trait]
impl Dialer for SocketDialer {
    async fn dial(&self, address: &Address) -> io::Result<BoxedStream> {
        match address {
            Address::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            Address::Tcp(host) => {
                let stream = TcpStream::connect(host.as_str()).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_socket_dialer_unix() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sock_path = tmp.path().join("dial.sock");
        let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();

        let mut stream = SocketDialer
            .dial(&Address::Unix(sock_path.clone()))
            .await
            .unwrap();
        let (mut accepted, _) = listener.accept().await.unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_socket_dialer_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = SocketDialer
            .dial(&Address::Tcp(format!("127.0.0.1:{port}")))
            .await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn test_socket_dialer_missing_socket() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = SocketDialer
            .dial(&Address::Unix(tmp.path().join("absent.sock")))
            .await;
        assert!(result.is_err());
    }
}
