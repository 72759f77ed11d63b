//! Observable connection state.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;

/// Where the supervisor currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not dialing.
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Connected; pumps running.
    Connected,
    /// Waiting to redial after a failed attempt.
    Reconnecting {
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// Milliseconds until next retry.
        next_retry_ms: u64,
    },
    /// Client closed; terminal.
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Connection state plus the retry counter, observable from outside the supervisor.
#[derive(Debug)]
pub struct SharedConnectionState {
    state: watch::Sender<ConnectionState>,
    retry_attempt: AtomicU32,
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            state,
            retry_attempt: AtomicU32::new(0),
        }
    }
}

impl SharedConnectionState {
    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Set the state. `Closed` is sticky.
    pub fn set(&self, new_state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == new_state {
                return false;
            }
            *current = new_state;
            true
        });
    }

    /// Receiver that sees every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), ConnectionState::Connected)
    }

    /// Consecutive failed dials in the current reconnect cycle.
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt.load(Ordering::Acquire)
    }

    pub(crate) fn set_retry_attempt(&self, attempt: u32) {
        self.retry_attempt.store(attempt, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_sticky() {
        let shared = SharedConnectionState::default();
        shared.set(ConnectionState::Connected);
        assert!(shared.is_connected());

        shared.set(ConnectionState::Closed);
        shared.set(ConnectionState::Connecting);
        assert_eq!(shared.get(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let shared = SharedConnectionState::default();
        let mut rx = shared.subscribe();

        shared.set(ConnectionState::Reconnecting {
            attempt: 2,
            next_retry_ms: 10,
        });
        rx.changed().await.unwrap();
        assert_eq!(
            *rx.borrow(),
            ConnectionState::Reconnecting {
                attempt: 2,
                next_retry_ms: 10
            }
        );
    }
}
