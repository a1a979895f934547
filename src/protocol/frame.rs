//! SignalR hub protocol frames.
//!
//! This module defines the frames exchanged with a classic ASP.NET SignalR
//! hub once the WebSocket is open. Every frame is a JSON object whose keys
//! are single upper-case letters:
//!
//! | Key | Direction | Meaning                                          |
//! |-----|-----------|--------------------------------------------------|
//! | `H` | out       | Hub name                                         |
//! | `M` | both      | Method name (out) or list of hub calls (in)      |
//! | `A` | both      | Positional arguments                             |
//! | `I` | both      | Invocation index (integer out, string in)        |
//! | `R` | in        | Result / ready data                              |
//! | `E` | in        | Error message for the invocation `I`             |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Invocation of a hub method, sent from client to server.
///
/// Example: `{"H": "chat", "M": "send", "A": ["hello"], "I": 0}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubInvocation {
    /// Hub the method belongs to.
    #[serde(rename = "H")]
    pub hub: String,
    /// Method name on the hub.
    #[serde(rename = "M")]
    pub method: String,
    /// Positional arguments.
    #[serde(rename = "A")]
    pub arguments: Vec<Value>,
    /// Client-assigned invocation index.
    #[serde(rename = "I")]
    pub invocation_id: u64,
}

/// A single server-to-client method call carried inside an inbound frame.
///
/// Example: `{"H": "chat", "M": "broadcast", "A": ["user", "hello"]}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "H", default)]
    pub hub: Option<String>,
    /// Target method name on the client. Entries without one are skipped.
    #[serde(rename = "M", default)]
    pub method: Option<String>,
    #[serde(rename = "A", default, deserialize_with = "null_as_empty")]
    pub arguments: Vec<Value>,
}

/// A decoded inbound frame.
///
/// All keys are optional. Keep-alive frames are plain `{}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundFrame {
    /// Result or ready data. `Some(Value::Null)` when the key is present
    /// with a `null` payload, `None` when the key is absent.
    #[serde(rename = "R", default, deserialize_with = "present")]
    pub result: Option<Value>,
    /// Server-to-client method calls.
    #[serde(rename = "M", default, deserialize_with = "null_as_empty")]
    pub messages: Vec<HubMessage>,
    /// Error reported for the invocation `I`.
    #[serde(rename = "E", default, deserialize_with = "present")]
    pub error: Option<Value>,
    /// Originating invocation index, string-encoded by the server.
    #[serde(rename = "I", default)]
    pub invocation_id: Option<Value>,
}

impl InboundFrame {
    /// Returns the ready/result payload unless it is a boolean.
    ///
    /// Boolean `R` values are plain acknowledgements and carry no data.
    pub fn ready_data(&self) -> Option<&Value> {
        self.result.as_ref().filter(|value| !value.is_boolean())
    }

    /// Whether the frame carries an `E` field, even a null one.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the error message, rendering non-string payloads as JSON.
    /// A null `E` has no message.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(message) => Some(message.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Returns the invocation index the frame refers to, or `-1` when the
    /// frame is uncorrelated.
    pub fn invocation_index(&self) -> i64 {
        let parsed = match &self.invocation_id {
            None | Some(Value::Null) => return -1,
            Some(Value::String(raw)) => raw.trim().parse::<i64>().ok(),
            Some(Value::Number(number)) => number.as_i64(),
            Some(_) => None,
        };
        parsed.unwrap_or_else(|| {
            warn!(invocation_id = ?self.invocation_id, "Unparseable invocation index");
            -1
        })
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: Value) -> InboundFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_invocation_serializes_in_wire_order() {
        let invocation = HubInvocation {
            hub: "chat".into(),
            method: "send".into(),
            arguments: vec![json!("hi"), json!(2)],
            invocation_id: 7,
        };
        assert_eq!(
            serde_json::to_string(&invocation).unwrap(),
            r#"{"H":"chat","M":"send","A":["hi",2],"I":7}"#
        );
    }

    #[test]
    fn test_empty_frame() {
        assert_eq!(frame(json!({})), InboundFrame::default());
    }

    #[test]
    fn test_null_result_is_present() {
        let decoded = frame(json!({"R": null, "I": "0"}));
        assert_eq!(decoded.result, Some(Value::Null));
        assert_eq!(decoded.ready_data(), Some(&Value::Null));
    }

    #[test]
    fn test_boolean_result_is_not_ready_data() {
        let decoded = frame(json!({"R": true}));
        assert!(decoded.result.is_some());
        assert!(decoded.ready_data().is_none());
    }

    #[test]
    fn test_hub_messages() {
        let decoded = frame(json!({
            "C": "d-1",
            "M": [{"H": "chat", "M": "foo", "A": [1, 2]}, {"M": "bar"}]
        }));
        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.messages[0].method.as_deref(), Some("foo"));
        assert_eq!(decoded.messages[0].arguments, vec![json!(1), json!(2)]);
        assert!(decoded.messages[1].arguments.is_empty());
    }

    #[test]
    fn test_null_messages() {
        assert!(frame(json!({"M": null})).messages.is_empty());
    }

    #[test]
    fn test_invocation_index() {
        assert_eq!(frame(json!({"E": "boom", "I": "2"})).invocation_index(), 2);
        assert_eq!(frame(json!({"E": "boom", "I": 3})).invocation_index(), 3);
        assert_eq!(frame(json!({"E": "boom"})).invocation_index(), -1);
        assert_eq!(frame(json!({"E": "boom", "I": "abc"})).invocation_index(), -1);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            frame(json!({"E": "boom"})).error_message().as_deref(),
            Some("boom")
        );
        assert_eq!(
            frame(json!({"E": {"code": 1}})).error_message().as_deref(),
            Some(r#"{"code":1}"#)
        );
        assert!(frame(json!({"R": 1})).error_message().is_none());
    }

    #[test]
    fn test_null_error_is_present_without_message() {
        let decoded = frame(json!({"E": null, "I": "0"}));
        assert!(decoded.has_error());
        assert!(decoded.error_message().is_none());
        assert!(!frame(json!({"R": 1})).has_error());
    }
}
