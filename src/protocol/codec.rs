//! JSON codec for SignalR frames.
//!
//! Classic SignalR exchanges one JSON document per WebSocket message, so the
//! codec is a thin layer over `serde_json` that also knows how to turn an
//! untyped value into an [`InboundFrame`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::InboundFrame;

/// Errors that can occur during protocol encoding or decoding.
#[derive(thiserror::Error, Debug)]
pub enum SignalRProtocolError {
    /// Failed to encode a value to JSON.
    #[error("JSON encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Failed to decode a message as JSON.
    #[error("JSON decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message is valid JSON but not a well-formed hub frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
}

/// Codec for the SignalR JSON protocol.
pub struct JsonCodec;

impl JsonCodec {
    /// Encodes a frame into its JSON text form.
    pub fn encode<T: Serialize + ?Sized>(frame: &T) -> Result<String, SignalRProtocolError> {
        serde_json::to_string(frame).map_err(SignalRProtocolError::Encode)
    }

    /// Converts a value into a JSON value.
    pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, SignalRProtocolError> {
        serde_json::to_value(value).map_err(SignalRProtocolError::Encode)
    }

    /// Decodes one text message. Empty messages decode to `None`.
    pub fn decode(text: &str) -> Result<Option<Value>, SignalRProtocolError> {
        Self::decode_slice(text.as_bytes())
    }

    /// Decodes one binary message. Empty messages decode to `None`.
    pub fn decode_slice(data: &[u8]) -> Result<Option<Value>, SignalRProtocolError> {
        if data.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(data)
            .map(Some)
            .map_err(SignalRProtocolError::Decode)
    }

    /// Interprets a decoded value as an [`InboundFrame`].
    ///
    /// Values that are not JSON objects carry no hub data and yield an empty
    /// frame.
    pub fn parse_frame(value: &Value) -> Result<InboundFrame, SignalRProtocolError> {
        if !value.is_object() {
            return Ok(InboundFrame::default());
        }
        InboundFrame::deserialize(value).map_err(SignalRProtocolError::MalformedFrame)
    }
}
