//! Collaborator boundary for onair remote-control clients.
//!
//! - [`transport`]: WebSocket and in-memory frame transports plus the
//!   [`Connector`] that opens them.
//! - [`handshake`]: the [`Handshake`] / [`SessionKeys`] traits the
//!   embedding application implements for its key exchange.
//! - [`rpc`]: the JSON-RPC session that runs inside the sealed channel.

pub mod error;
pub mod handshake;
pub mod rpc;
pub mod transport;

pub use error::Error;
pub use handshake::{Handshake, SessionKeys};
pub use rpc::{
    Notification, Notifications, OutputKind, OutputMap, OutputRecord, OutputState, PendingReply,
    RpcClient, RpcDriver, session,
};
pub use transport::{
    Connector, Endpoint, MemoryTransport, Transport, WebSocketConnector, WebSocketTransport,
    duplex,
};
