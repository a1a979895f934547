//! Transports carrying hub frames between client and server.
//!
//! The [`Transport`] trait is the seam between the connection state machine
//! and the network: [`WebSocketsTransport`] is the production implementation,
//! anything else (test doubles, proxies) can be plugged into
//! [`ClientBuilder::transport`](crate::ClientBuilder::transport).

mod session;
mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use session::{Auth, Session};
pub use websocket::WebSocketsTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SignalRError;
use crate::negotiate::NegotiateResponse;
use crate::protocol::HubInvocation;

/// Handshake and frame I/O for one connection.
///
/// The client calls `receive` from its listener task only, and `send` from
/// callers of [`SignalRClient::invoke`](crate::SignalRClient::invoke), so an
/// implementation must allow one reader and one writer at the same time.
/// `close` is called at most once per connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Requests a connection token for `hub_name`.
    async fn negotiate(&self, hub_name: &str) -> Result<NegotiateResponse, SignalRError>;

    /// Opens the socket and finalizes the handshake.
    async fn connect(&self, connection_token: &str, hub_name: &str) -> Result<(), SignalRError>;

    /// Waits for the next message. Empty messages yield `Ok(None)`.
    async fn receive(&self) -> Result<Option<Value>, SignalRError>;

    /// Writes one invocation frame.
    async fn send(&self, frame: &HubInvocation) -> Result<(), SignalRError>;

    /// Closes the socket, then releases the HTTP session.
    async fn close(&self) -> Result<(), SignalRError>;
}
