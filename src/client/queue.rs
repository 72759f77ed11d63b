//! Bounded outbound queue.
//!
//! `enqueue` never waits: when the queue is full the caller gets
//! [`QueueError::Full`] immediately. This is the only place the client
//! sheds load instead of stalling the caller.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, MutexGuard};

/// Errors from [`WriteQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Capacity reached; retry later or drop the message.
    #[error("write queue is full")]
    Full,
}

/// FIFO of payloads waiting for the write pump.
///
/// Messages leave the queue the moment the pump takes them; a message that
/// fails to write is not put back.
#[derive(Debug)]
pub struct WriteQueue {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
    capacity: usize,
}

impl WriteQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Queue a payload without blocking. Returns the payload length.
    pub fn enqueue(&self, payload: Bytes) -> Result<usize, QueueError> {
        let len = payload.len();
        match self.tx.try_send(payload) {
            Ok(()) => Ok(len),
            // The receiver lives as long as the queue, so Closed only shows
            // up during teardown; report it as no room.
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => Err(QueueError::Full),
        }
    }

    /// Maximum number of queued messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently waiting.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive access to the receiving end for one write pump.
    pub(crate) async fn receiver(&self) -> MutexGuard<'_, mpsc::Receiver<Bytes>> {
        self.rx.lock().await
    }
}
