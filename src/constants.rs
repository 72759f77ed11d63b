//! Crate-wide constants for resocket.
//!
//! Defaults for the connection supervisor, the pumps, and the frame codec
//! live here so the config layer and the tests agree on them.
//!
//! # Categories
//!
//! - **Connection**: dial timeout, default address, reconnect backoff
//! - **Pumps**: read buffer and transient-error delay
//! - **Framing**: length prefix and sanity ceiling
//! - **Queue**: outbound capacity

use std::time::Duration;

// ============================================================================
// Connection
// ============================================================================

/// Socket used by `resocket serve` and `resocket connect` when no address is given.
pub const DEFAULT_ADDRESS: &str = "/tmp/codesocket.tmp";

/// Per-attempt dial timeout.
///
/// A dial that has not completed within this window counts as a failed
/// attempt and goes through the reconnect policy like any other failure.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between failed dials under the default reconnect policy.
pub const DIAL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Starting delay for the exponential reconnect policy.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Ceiling for the exponential reconnect policy (before jitter).
pub const BACKOFF_MAX: Duration = Duration::from_secs(20);

// ============================================================================
// Pumps
// ============================================================================

/// Size of the buffer each read pump reads into.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Pause after a transient read error before reading again on the same connection.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

// ============================================================================
// Framing
// ============================================================================

/// Length of the big-endian `u32` prefix in front of every frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a single frame may declare (10 MB).
///
/// Anything larger is a protocol violation and ends the connection; a
/// corrupted or hostile stream must not make us allocate unbounded memory.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

// ============================================================================
// Queue
// ============================================================================

/// Number of outbound messages the write queue holds before `write` fails.
pub const WRITE_QUEUE_CAPACITY: usize = 100;
