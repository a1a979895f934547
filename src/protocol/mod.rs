//! SignalR protocol implementation.
//!
//! This module provides the frame types and the JSON codec for the classic
//! SignalR hub protocol.

mod codec;
mod frame;

pub use codec::{JsonCodec, SignalRProtocolError};
pub use frame::{HubInvocation, HubMessage, InboundFrame};
