//! resocket: a durable, self-healing client connection to a streaming
//! socket endpoint.
//!
//! The [`ReconnectingClient`] dials a Unix or TCP endpoint, redials whenever
//! the connection drops, and decouples writers from the transport through a
//! bounded queue. Inbound data goes to a caller-supplied [`MessageSink`],
//! either as raw chunks or as reassembled length-prefixed frames.

pub mod client;
pub mod config;
pub mod constants;
pub mod socket;

pub use client::{
    ClientError, ConnectionState, MessageSink, ReconnectPolicy, ReconnectingClient,
    ReconnectingClientBuilder,
};
pub use config::{ClientConfig, Framing};
pub use socket::address::Address;
pub use socket::server::EchoServer;
pub use socket::transport::{Dialer, SocketDialer};
