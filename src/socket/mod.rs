//! Socket plumbing shared by the client and the echo server.
//!
//! # Architecture
//!
//! ```text
//! "unix:///tmp/app.sock" ──► Address ──► Dialer::dial ──► BoxedStream
//!                                                            │
//!                            FrameDecoder ◄── read half ─────┤
//!                            write_frame  ──► write half ────┘
//! ```
//!
//! - [`address`]: endpoint parsing (`unix://`, `tcp://`, bare path)
//! - [`transport`]: the [`Dialer`](transport::Dialer) seam and real sockets
//! - [`framing`]: `[u32 BE length][payload]` codec
//! - [`server`]: echo server used by the CLI and integration tests

pub mod address;
pub mod framing;
pub mod server;
pub mod transport;
