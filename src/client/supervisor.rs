//! Connection supervisor: dial, pump, tear down, redial.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► dial ──fail──► backoff wait ──► dial ...
//!                 │
//!                 ok ──► install live handle ──► read pump (task) + write pump
//!                                                      │
//!                              either pump exits ◄─────┘
//!                                      │
//!                        clear handle, redial (unless cancelled / closed)
//! ```
//!
//! Messages still queued when a connection drops stay queued for the next
//! connection; the one message a failed write was carrying is lost.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::pumps::{self, PumpExit, PumpSettings};
use super::sink::SharedSink;
use super::state::ConnectionState;
use super::{ClientError, ClientInner, LiveConnection};
use crate::socket::address::Address;
use crate::socket::transport::BoxedStream;

/// Outcome of one dial attempt.
enum DialOutcome {
    Connected(BoxedStream),
    Failed(io::Error),
    Cancelled,
    Closed,
}

/// Run the reconnect loop until cancellation or close.
pub(super) async fn run(
    inner: &ClientInner,
    cancel: &CancellationToken,
    address: &Address,
    sink: SharedSink,
) -> ClientError {
    let mut backoff = inner.config.reconnect.backoff();
    let settings = PumpSettings::from(&inner.config);

    loop {
        if inner.lifecycle.is_closed() {
            return ClientError::Closed;
        }

        inner.state.set(ConnectionState::Connecting);
        let stream = match dial(inner, cancel, address).await {
            DialOutcome::Connected(stream) => stream,
            DialOutcome::Cancelled => return ClientError::Cancelled,
            DialOutcome::Closed => return ClientError::Closed,
            DialOutcome::Failed(e) => {
                if cancel.is_cancelled() {
                    return ClientError::Cancelled;
                }
                let delay = backoff.next_delay();
                inner.state.set_retry_attempt(backoff.attempt());
                inner.state.set(ConnectionState::Reconnecting {
                    attempt: backoff.attempt(),
                    next_retry_ms: delay.as_millis() as u64,
                });
                log::warn!(
                    "[Supervisor] Dial attempt #{} to {} failed, retrying in {:?}: {}",
                    backoff.attempt(),
                    address,
                    delay,
                    e
                );
                if let Some(err) = wait(delay, inner, cancel).await {
                    return err;
                }
                continue;
            }
        };

        backoff.reset();
        inner.state.set_retry_attempt(0);

        let stop = CancellationToken::new();
        let Some(id) = inner.install(address, stop.clone()) else {
            // close() won the race between dial and install
            return ClientError::Closed;
        };
        inner.state.set(ConnectionState::Connected);
        log::info!("[Supervisor] Connected to {} (connection #{})", address, id);

        let (reader, writer) = tokio::io::split(stream);
        let read_task = tokio::spawn(pumps::read_pump(
            reader,
            Arc::clone(&sink),
            settings,
            cancel.clone(),
            stop.clone(),
        ));
        let write_exit = pumps::write_pump(writer, &inner.queue, settings, cancel, &stop).await;

        stop.cancel();
        let read_exit = match read_task.await {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("[Supervisor] Read pump task failed: {e}");
                PumpExit::Stopped
            }
        };

        inner.clear(id);
        inner.state.set(ConnectionState::Disconnected);
        log::info!(
            "[Supervisor] Disconnected from {} (write pump: {}, read pump: {})",
            address,
            write_exit,
            read_exit
        );

        if cancel.is_cancelled() {
            return ClientError::Cancelled;
        }
    }
}

/// One dial attempt bounded by the configured timeout.
async fn dial(inner: &ClientInner, cancel: &CancellationToken, address: &Address) -> DialOutcome {
    let timeout = inner.config.dial_timeout();
    tokio::select! {
        biased;
        () = cancel.cancelled() => DialOutcome::Cancelled,
        () = inner.shutdown.cancelled() => DialOutcome::Closed,
        result = tokio::time::timeout(timeout, inner.dialer.dial(address)) => match result {
            Ok(Ok(stream)) => DialOutcome::Connected(stream),
            Ok(Err(e)) => DialOutcome::Failed(e),
            Err(_) => DialOutcome::Failed(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dial timed out after {timeout:?}"),
            )),
        },
    }
}

/// Sleep out a backoff delay. Returns the error to stop with if cancelled or closed.
async fn wait(
    delay: Duration,
    inner: &ClientInner,
    cancel: &CancellationToken,
) -> Option<ClientError> {
    if delay.is_zero() {
        // Still give other tasks (and the cancel token) a turn.
        tokio::task::yield_now().await;
    } else {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            () = inner.shutdown.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    if cancel.is_cancelled() {
        log::info!("[Supervisor] Cancelled while waiting to redial");
        Some(ClientError::Cancelled)
    } else if inner.lifecycle.is_closed() {
        Some(ClientError::Closed)
    } else {
        None
    }
}

impl ClientInner {
    /// Record the live connection. Returns its id, or `None` if already closed.
    fn install(&self, address: &Address, stop: CancellationToken) -> Option<u64> {
        let mut live = self.live.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.lifecycle.is_closed() {
            return None;
        }
        let id = self.next_connection_id();
        *live = Some(LiveConnection {
            id,
            peer: address.to_string(),
            stop,
        });
        Some(id)
    }

    /// Forget the live connection if it is still connection `id`.
    fn clear(&self, id: u64) {
        let mut live = self.live.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if live.as_ref().is_some_and(|conn| conn.id == id) {
            *live = None;
        }
    }
}
