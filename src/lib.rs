//! A standalone RFC 6455 WebSocket core: handshake validation, frame
//! codec, and the connection state machine, operating over any established
//! [`tokio::io::AsyncRead`] + [`tokio::io::AsyncWrite`] byte stream.
//!
//! This crate does not open sockets, speak TLS, or parse HTTP request
//! lines — it starts from an already-parsed [`http::Request`] /
//! [`http::Response`] and a stream, and takes it from there. See
//! [`ServerBuilder`] and [`ClientBuilder`] for the two entry points.

mod close;
mod codec;
mod connection;
mod error;
mod frame;
mod handshake;

pub use close::CloseCode;
pub use codec::Outgoing;
pub use connection::{Connection, ConnectionConfig, Event};
pub use error::{HandshakeRejected, WsError};
pub use frame::OpCode;
pub use handshake::{generate_key, Accepted, ClientBuilder, ServerBuilder};
