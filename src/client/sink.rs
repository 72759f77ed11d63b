//! Where inbound data goes.

use std::io;
use std::sync::{Arc, Mutex};

/// Receives inbound data from the read pump.
///
/// In framed mode each call carries one complete payload; in raw mode each
/// call carries one read chunk. Calls arrive in wire order. An error ends
/// the current connection.
pub trait MessageSink: Send + 'static {
    /// Deliver one payload or chunk.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

impl<W: io::Write + Send + 'static> MessageSink for W {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_all(data)?;
        self.flush()?;
        Ok(data.len())
    }
}

/// Sink shared by the read pumps of successive connections.
pub(crate) type SharedSink = Arc<Mutex<dyn MessageSink>>;

/// Hand `data` to the shared sink.
pub(crate) fn deliver(sink: &SharedSink, data: &[u8]) -> io::Result<usize> {
    let mut guard = sink
        .lock()
        .map_err(|_| io::Error::other("sink mutex poisoned"))?;
    guard.write(data)
}
