//! Client configuration.

use serde::Deserialize;

/// Tunables for a [`SignalRClient`](crate::SignalRClient).
///
/// Deserializable so applications can embed it in their own config files:
///
/// ```
/// use classic_signalr::ClientOptions;
///
/// let options: ClientOptions =
///     serde_json::from_str(r#"{"invocation_retention": 1000}"#).unwrap();
/// assert_eq!(options.invocation_retention, Some(1000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// How many invocation records to keep for error correlation.
    /// `None` keeps every record for the lifetime of the connection.
    pub invocation_retention: Option<usize>,
}
