//! Rust client for classic ASP.NET SignalR hubs.
//!
//! This crate implements the `clientProtocol=1.5` handshake (negotiate,
//! WebSocket connect, start) and the JSON hub protocol on top of it: invoking
//! hub methods, receiving server calls by method name, and correlating server
//! errors with the invocation that caused them.
//!
//! # Quick start
//!
//! ```rust
//! use classic_signalr::protocol::{HubInvocation, JsonCodec};
//!
//! let frame = HubInvocation {
//!     hub: "chat".into(),
//!     method: "send".into(),
//!     arguments: vec!["hello".into()],
//!     invocation_id: 0,
//! };
//! let text = JsonCodec::encode(&frame).unwrap();
//! assert_eq!(text, r#"{"H":"chat","M":"send","A":["hello"],"I":0}"#);
//! ```
//!
//! For connecting to a hub, see [`SignalRClient`].

pub mod config;
pub mod connection;
pub mod error;
pub mod negotiate;
pub mod protocol;
pub mod transport;

pub use config::ClientOptions;
pub use connection::{
    ClientBuilder, ConnectionState, EventHook, HookHandler, HookResult, HubError,
    InvocationRecord, READY_EVENT, SignalRClient,
};
pub use error::{BoxError, SignalRError};
pub use negotiate::NegotiateResponse;
pub use protocol::{HubInvocation, InboundFrame, JsonCodec, SignalRProtocolError};
pub use transport::{Auth, Session, Transport, WebSocketsTransport};
