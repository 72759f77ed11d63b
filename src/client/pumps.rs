//! Read and write pumps for one connection.
//!
//! ```text
//!            ┌── read pump (spawned) ── transport → decoder → sink
//! stop ◄─────┤
//!            └── write pump (caller) ── queue → encoder → transport
//! ```
//!
//! Either pump fires the per-connection `stop` token on exit so the other
//! unwinds. Both also watch the client's cancellation token.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::queue::WriteQueue;
use super::sink::{deliver, SharedSink};
use crate::config::{ClientConfig, Framing};
use crate::socket::framing::{write_frame, FrameDecoder, FrameError};

/// Why a pump stopped.
#[derive(Debug)]
pub(crate) enum PumpExit {
    /// Caller's cancellation token fired.
    Cancelled,
    /// The other pump (or `close`) stopped this connection.
    Stopped,
    /// Peer closed the connection.
    Eof,
    /// Non-transient read error.
    ReadFailed(io::Error),
    /// The sink rejected data.
    SinkFailed(io::Error),
    /// Inbound stream broke the framing rules.
    Protocol(FrameError),
    /// Write or flush failed; the message in flight is dropped.
    WriteFailed(FrameError),
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Stopped => write!(f, "stopped"),
            Self::Eof => write!(f, "peer closed the connection"),
            Self::ReadFailed(e) => write!(f, "read error: {e}"),
            Self::SinkFailed(e) => write!(f, "sink error: {e}"),
            Self::Protocol(e) => write!(f, "protocol violation: {e}"),
            Self::WriteFailed(e) => write!(f, "write error: {e}"),
        }
    }
}

/// Per-connection pump settings, copied out of [`ClientConfig`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpSettings {
    pub framing: Framing,
    pub read_buffer_size: usize,
    pub read_retry_delay: Duration,
    pub max_frame_size: usize,
}

impl From<&ClientConfig> for PumpSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            framing: config.framing,
            read_buffer_size: config.read_buffer_size.max(1),
            read_retry_delay: config.read_retry_delay(),
            max_frame_size: config.max_frame_size,
        }
    }
}

/// Errors the transport expects to clear up on their own.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Drain the transport into the sink until EOF, error, stop, or cancellation.
pub(crate) async fn read_pump<R>(
    mut reader: R,
    sink: SharedSink,
    settings: PumpSettings,
    cancel: CancellationToken,
    stop: CancellationToken,
) -> PumpExit
where
    R: AsyncRead + Unpin,
{
    let mut decoder = match settings.framing {
        Framing::LengthPrefixed => Some(FrameDecoder::with_max_frame_size(settings.max_frame_size)),
        Framing::Raw => None,
    };
    let mut buf = vec![0u8; settings.read_buffer_size];

    let exit = loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => break PumpExit::Cancelled,
            () = stop.cancelled() => break PumpExit::Stopped,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                log::info!("[ReadPump] Server closed the connection");
                break PumpExit::Eof;
            }
            Ok(n) => {
                if let Err(exit) = dispatch(&buf[..n], decoder.as_mut(), &sink) {
                    break exit;
                }
            }
            Err(e) if is_transient(&e) => {
                log::warn!(
                    "[ReadPump] Transient read error, retrying in {:?}: {e}",
                    settings.read_retry_delay
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break PumpExit::Cancelled,
                    () = stop.cancelled() => break PumpExit::Stopped,
                    () = tokio::time::sleep(settings.read_retry_delay) => {}
                }
            }
            Err(e) => {
                log::error!("[ReadPump] Read error: {e}");
                break PumpExit::ReadFailed(e);
            }
        }
    };

    stop.cancel();
    exit
}

/// Forward one read chunk, decoding frames when a decoder is present.
fn dispatch(
    chunk: &[u8],
    decoder: Option<&mut FrameDecoder>,
    sink: &SharedSink,
) -> Result<(), PumpExit> {
    let Some(decoder) = decoder else {
        return deliver(sink, chunk).map(drop).map_err(|e| {
            log::error!("[ReadPump] Sink write error: {e}");
            PumpExit::SinkFailed(e)
        });
    };

    let payloads = decoder.feed(chunk).map_err(|e| {
        log::error!("[ReadPump] Protocol violation, closing connection: {e}");
        PumpExit::Protocol(e)
    })?;
    for payload in payloads {
        deliver(sink, &payload).map_err(|e| {
            log::error!("[ReadPump] Sink write error: {e}");
            PumpExit::SinkFailed(e)
        })?;
    }
    Ok(())
}

/// Drain the write queue into the transport until error, stop, or cancellation.
pub(crate) async fn write_pump<W>(
    mut writer: W,
    queue: &WriteQueue,
    settings: PumpSettings,
    cancel: &CancellationToken,
    stop: &CancellationToken,
) -> PumpExit
where
    W: AsyncWrite + Unpin,
{
    let mut rx = queue.receiver().await;

    let exit = loop {
        let payload = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                log::info!("[WritePump] Exiting due to cancellation");
                break PumpExit::Cancelled;
            }
            () = stop.cancelled() => {
                log::info!("[WritePump] Exiting: stop signal received");
                break PumpExit::Stopped;
            }
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break PumpExit::Stopped,
            },
        };

        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => break PumpExit::Cancelled,
            () = stop.cancelled() => break PumpExit::Stopped,
            written = send(&mut writer, &payload, settings) => written,
        };
        if let Err(e) = written {
            log::error!("[WritePump] Write error, dropping {} byte message: {e}", payload.len());
            break PumpExit::WriteFailed(e);
        }
    };

    stop.cancel();
    if let Err(e) = writer.shutdown().await {
        log::debug!("[WritePump] Shutdown after exit failed: {e}");
    }
    exit
}

/// Write one message and flush.
async fn send<W>(writer: &mut W, payload: &[u8], settings: PumpSettings) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    match settings.framing {
        Framing::LengthPrefixed => write_frame(writer, payload, settings.max_frame_size)
            .await
            .map(drop),
        Framing::Raw => {
            writer
                .write_all(payload)
                .await
                .map_err(FrameError::from_write_error)?;
            writer.flush().await.map_err(FrameError::from_write_error)
        }
    }
}
