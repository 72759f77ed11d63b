//! Length-prefixed frame codec.
//!
//! Every message on the wire is a 4-byte big-endian length followed by
//! exactly that many payload bytes:
//!
//! ```text
//! [u32 BE length] [payload: length bytes]
//! ```
//!
//! There is no terminator, checksum, or version byte. Payloads above the
//! sanity ceiling ([`MAX_FRAME_SIZE`] by default) are a protocol violation.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::{FRAME_HEADER_LEN, MAX_FRAME_SIZE};

/// Errors produced while encoding, decoding, or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Empty payloads cannot be framed; a zero length is a no-op on the wire.
    #[error("empty payload cannot be sent as a frame")]
    EmptyPayload,
    /// Declared or submitted payload exceeds the sanity ceiling.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Offending payload length.
        size: usize,
        /// Ceiling in force.
        max: usize,
    },
    /// The connection was already gone when the frame was written.
    #[error("connection closed")]
    ConnectionClosed,
    /// Any other transport error.
    #[error("frame I/O error: {0}")]
    Io(#[source] io::Error),
}

impl FrameError {
    /// Sort a transport write error into "connection is gone" or plain I/O.
    pub fn from_write_error(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Io(err),
        }
    }
}

/// Encode `payload` as a single frame.
///
/// # Errors
///
/// Returns [`FrameError::EmptyPayload`] for an empty payload and
/// [`FrameError::TooLarge`] when it exceeds `max_frame_size` (or `u32::MAX`).
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let length = match u32::try_from(payload.len()) {
        Ok(length) if payload.len() <= max_frame_size => length,
        _ => {
            return Err(FrameError::TooLarge {
                size: payload.len(),
                max: max_frame_size,
            })
        }
    };

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Write `payload` as one frame and flush.
///
/// The header and payload go out in a single write call so a frame is never
/// interleaved with another writer's bytes. Returns the payload length.
///
/// # Errors
///
/// Encoding errors as [`encode_frame`]; a dead connection is
/// [`FrameError::ConnectionClosed`], anything else [`FrameError::Io`].
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<usize, FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(payload, max_frame_size)?;
    writer
        .write_all(&frame)
        .await
        .map_err(FrameError::from_write_error)?;
    writer.flush().await.map_err(FrameError::from_write_error)?;
    Ok(frame.len() - FRAME_HEADER_LEN)
}

/// A frame whose payload has only partly arrived.
#[derive(Debug)]
struct PartialFrame {
    declared_len: usize,
    read_so_far: usize,
    buf: Vec<u8>,
}

impl PartialFrame {
    fn new(declared_len: usize) -> Self {
        Self {
            declared_len,
            read_so_far: 0,
            // Don't trust the declared length for the up-front allocation.
            buf: Vec::with_capacity(declared_len.min(64 * 1024)),
        }
    }

    fn remaining(&self) -> usize {
        self.declared_len - self.read_so_far
    }

    /// Append bytes and return how many have been read so far.
    fn put(&mut self, data: &[u8]) -> usize {
        self.buf.extend_from_slice(data);
        self.read_so_far += data.len();
        self.read_so_far
    }
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and collect complete payloads.
/// One decoder belongs to one connection; a new connection starts with a
/// fresh decoder so a half-received frame never leaks across a reconnect.
#[derive(Debug)]
pub struct FrameDecoder {
    header: [u8; FRAME_HEADER_LEN],
    header_len: usize,
    partial: Option<PartialFrame>,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default 10 MB ceiling.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a decoder that rejects frames larger than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            header: [0; FRAME_HEADER_LEN],
            header_len: 0,
            partial: None,
            max_frame_size,
        }
    }

    /// Feed bytes into the decoder and extract all complete payloads.
    ///
    /// Incomplete headers and payloads are buffered for the next call. A
    /// declared length of zero carries no message and is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] if a header declares more than the
    /// ceiling. The decoder is unusable afterwards; drop the connection.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut frames = Vec::new();

        while !bytes.is_empty() {
            if let Some(mut part) = self.partial.take() {
                let take = part.remaining().min(bytes.len());
                if part.put(&bytes[..take]) == part.declared_len {
                    frames.push(part.buf);
                } else {
                    self.partial = Some(part);
                }
                bytes = &bytes[take..];
                continue;
            }

            // Need the full 4-byte header before anything else
            let take = (FRAME_HEADER_LEN - self.header_len).min(bytes.len());
            self.header[self.header_len..self.header_len + take].copy_from_slice(&bytes[..take]);
            self.header_len += take;
            bytes = &bytes[take..];
            if self.header_len < FRAME_HEADER_LEN {
                break;
            }
            self.header_len = 0;

            let declared_len = u32::from_be_bytes(self.header) as usize;
            if declared_len == 0 {
                log::debug!("[Framing] Skipping zero-length frame");
                continue;
            }
            if declared_len > self.max_frame_size {
                return Err(FrameError::TooLarge {
                    size: declared_len,
                    max: self.max_frame_size,
                });
            }

            if bytes.len() >= declared_len {
                frames.push(bytes[..declared_len].to_vec());
                bytes = &bytes[declared_len..];
            } else {
                let mut part = PartialFrame::new(declared_len);
                part.put(bytes);
                bytes = &[];
                self.partial = Some(part);
            }
        }

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        self.header_len > 0 || self.partial.is_some()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
