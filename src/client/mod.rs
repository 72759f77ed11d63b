//! Reconnecting client.
//!
//! [`ReconnectingClient`] keeps a connection to a socket endpoint alive for
//! as long as [`ReconnectingClient::connect`] runs, and decouples callers
//! from the transport through a bounded write queue.
//!
//! # Architecture
//!
//! ```text
//! ReconnectingClient (cheap to clone)
//!     ├── WriteQueue      write()/send() enqueue, reject when full
//!     ├── Lifecycle       Running → Closed, once
//!     ├── live handle     Mutex<Option<LiveConnection>>, reached by close()
//!     ├── state           ConnectionState watch + retry counter
//!     └── connect()       supervisor loop: dial → pumps → redial
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let client = ReconnectingClient::new(ClientConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let runner = client.clone();
//! tokio::spawn(async move {
//!     runner.connect(cancel, "unix:///tmp/app.sock", std::io::stdout()).await
//! });
//!
//! client.write(b"hello")?;
//! client.close();
//! ```
//!
//! # Delivery
//!
//! At most once. A message leaves the queue when the write pump takes it;
//! if that write fails the message is gone. Nothing is acknowledged or
//! replayed across reconnects.

pub mod backoff;
pub mod lifecycle;
pub(crate) mod pumps;
pub mod queue;
pub mod sink;
mod supervisor;
pub mod state;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, Framing};
use crate::socket::address::{Address, AddressError};
use crate::socket::transport::{Dialer, SocketDialer};

pub use backoff::{Backoff, ReconnectPolicy};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use queue::{QueueError, WriteQueue};
pub use sink::MessageSink;
pub use state::{ConnectionState, SharedConnectionState};

/// Errors surfaced to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `close()` has been called; every later operation fails the same way.
    #[error("client closed")]
    Closed,
    /// The cancellation token passed to `connect` fired.
    #[error("connect cancelled")]
    Cancelled,
    /// The write queue is at capacity.
    #[error("write queue is full")]
    QueueFull,
    /// Framed mode cannot carry an empty message.
    #[error("empty payload cannot be sent as a frame")]
    EmptyPayload,
    /// Payload exceeds the frame size ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Payload length.
        size: usize,
        /// Ceiling in force.
        max: usize,
    },
    /// The address given to `connect` could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
    /// `connect` is already running on this client.
    #[error("client is already connected")]
    AlreadyConnected,
}

impl From<QueueError> for ClientError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full => Self::QueueFull,
        }
    }
}

/// The current connection, as seen from outside the pumps.
#[derive(Debug)]
struct LiveConnection {
    id: u64,
    peer: String,
    stop: CancellationToken,
}

/// State shared between the client handles and the supervisor.
struct ClientInner {
    config: ClientConfig,
    dialer: Arc<dyn Dialer>,
    queue: WriteQueue,
    lifecycle: Lifecycle,
    live: Mutex<Option<LiveConnection>>,
    state: SharedConnectionState,
    /// Fired by `close()` to interrupt dials and backoff waits.
    shutdown: CancellationToken,
    running: AtomicBool,
    connection_ids: AtomicU64,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle.state())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    fn next_connection_id(&self) -> u64 {
        self.connection_ids.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Clears the running flag when `connect` returns.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Durable client connection with automatic redial.
///
/// Clones share the same queue, lifecycle, and connection.
#[derive(Clone, Debug)]
pub struct ReconnectingClient {
    inner: Arc<ClientInner>,
}

impl ReconnectingClient {
    /// Client that dials real Unix/TCP sockets.
    pub fn new(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a client.
    pub fn builder() -> ReconnectingClientBuilder {
        ReconnectingClientBuilder::default()
    }

    /// Keep a connection to `address` alive until `cancel` fires or the
    /// client is closed, delivering inbound data to `sink`.
    ///
    /// Connection failures never end this call; they are logged and
    /// redialed.
    ///
    /// # Errors
    ///
    /// [`ClientError::Cancelled`] or [`ClientError::Closed`] on a normal
    /// stop; [`ClientError::InvalidAddress`] or
    /// [`ClientError::AlreadyConnected`] up front.
    pub async fn connect<S: MessageSink>(
        &self,
        cancel: CancellationToken,
        address: &str,
        sink: S,
    ) -> Result<(), ClientError> {
        if self.inner.lifecycle.is_closed() {
            return Err(ClientError::Closed);
        }
        let address = Address::parse(address)?;
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(ClientError::AlreadyConnected);
        }
        let _running = RunningGuard(&self.inner.running);

        let shared: sink::SharedSink = Arc::new(Mutex::new(sink));
        let err = supervisor::run(&self.inner, &cancel, &address, shared).await;

        if self.inner.lifecycle.is_closed() {
            self.inner.state.set(ConnectionState::Closed);
        } else {
            self.inner.state.set(ConnectionState::Disconnected);
        }
        Err(err)
    }

    /// Copy `data` into the write queue. Returns immediately.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after `close()`, [`ClientError::QueueFull`]
    /// when the queue is at capacity, and in framed mode
    /// [`ClientError::EmptyPayload`] / [`ClientError::FrameTooLarge`].
    pub fn write(&self, data: &[u8]) -> Result<usize, ClientError> {
        self.send(Bytes::copy_from_slice(data))
    }

    /// Queue an owned payload without copying.
    pub fn send(&self, payload: Bytes) -> Result<usize, ClientError> {
        if self.inner.lifecycle.is_closed() {
            return Err(ClientError::Closed);
        }

        match self.inner.config.framing {
            Framing::LengthPrefixed => {
                if payload.is_empty() {
                    return Err(ClientError::EmptyPayload);
                }
                let max = self.inner.config.max_frame_size;
                if payload.len() > max {
                    return Err(ClientError::FrameTooLarge {
                        size: payload.len(),
                        max,
                    });
                }
            }
            Framing::Raw if payload.is_empty() => return Ok(0),
            Framing::Raw => {}
        }

        Ok(self.inner.queue.enqueue(payload)?)
    }

    /// Close the client: stop the live connection, stop redialing, and fail
    /// every later write. Idempotent.
    pub fn close(&self) {
        if !self.inner.lifecycle.close() {
            return;
        }

        let live = self
            .inner
            .live
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(conn) = live {
            log::info!("[Client] Closing connection #{} to {}", conn.id, conn.peer);
            conn.stop.cancel();
        }
        self.inner.shutdown.cancel();
        self.inner.state.set(ConnectionState::Closed);
        log::info!("[Client] Client closed");
    }

    /// True once `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Consecutive failed dials in the current reconnect cycle.
    pub fn retry_attempt(&self) -> u32 {
        self.inner.state.retry_attempt()
    }

    /// Messages waiting in the write queue.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

/// Lets the client stand in wherever an `io::Write` is expected.
///
/// A full queue maps to `WouldBlock` and a closed client to `BrokenPipe`.
impl io::Write for ReconnectingClient {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ReconnectingClient::write(self, buf).map_err(|e| match e {
            ClientError::QueueFull => io::Error::new(io::ErrorKind::WouldBlock, e),
            ClientError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, e),
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Builder for [`ReconnectingClient`].
#[derive(Default)]
pub struct ReconnectingClientBuilder {
    config: ClientConfig,
    dialer: Option<Arc<dyn Dialer>>,
}

impl std::fmt::Debug for ReconnectingClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingClientBuilder")
            .field("config", &self.config)
            .field("custom_dialer", &self.dialer.is_some())
            .finish()
    }
}

impl ReconnectingClientBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Write queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Wire framing.
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Delay policy between failed dials.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Per-attempt dial timeout.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Use a custom transport instead of real sockets.
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Build the client.
    pub fn build(self) -> ReconnectingClient {
        let queue = WriteQueue::new(self.config.queue_capacity);
        let dialer = self.dialer.unwrap_or_else(|| Arc::new(SocketDialer));
        ReconnectingClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                dialer,
                queue,
                lifecycle: Lifecycle::default(),
                live: Mutex::new(None),
                state: SharedConnectionState::default(),
                shutdown: CancellationToken::new(),
                running: AtomicBool::new(false),
                connection_ids: AtomicU64::new(0),
            }),
        }
    }
}
