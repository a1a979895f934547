//! Negotiation with the SignalR server and handshake URL building.
//!
//! Before the WebSocket is opened, the client performs an HTTP GET against
//! `<base>/negotiate` to obtain a connection token. The same query string
//! layout is then reused for `/connect` (the socket) and `/start`.
//!
//! Query values are form-quoted: alphanumerics and `-_.~` are kept, spaces
//! become `+`, everything else is percent-encoded. Servers compare the
//! `connectionData` of `/start` with the one sent to `/negotiate`, so the
//! encoding has to be stable byte for byte.

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::SignalRError;
use crate::protocol::JsonCodec;

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: &str = "1.5";

/// Transport name sent on `/connect` and `/start`.
pub const TRANSPORT_NAME: &str = "webSockets";

/// Response from the `/negotiate` endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NegotiateResponse {
    pub connection_token: String,
    pub connection_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Seconds between server keep-alive frames.
    #[serde(default)]
    pub keep_alive_timeout: Option<f64>,
    #[serde(default)]
    pub disconnect_timeout: Option<f64>,
    #[serde(default)]
    pub try_web_sockets: Option<bool>,
    /// Any other fields the server returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Builds the `connectionData` value for a hub: `[{"name": "<hub>"}]`.
pub fn connection_data(hub_name: &str) -> Result<String, SignalRError> {
    let name = JsonCodec::encode(hub_name)?;
    Ok(format!("[{{\"name\": {name}}}]"))
}

/// Builds `<base>/negotiate?connectionData=...&clientProtocol=1.5`.
///
/// # Example
///
/// ```
/// use classic_signalr::negotiate::negotiate_url;
///
/// let url = negotiate_url("http://x/y", "chat").unwrap();
/// assert_eq!(
///     url,
///     "http://x/y/negotiate?connectionData=%5B%7B%22name%22%3A+%22chat%22%7D%5D&clientProtocol=1.5"
/// );
/// ```
pub fn negotiate_url(base_url: &str, hub_name: &str) -> Result<String, SignalRError> {
    let data = connection_data(hub_name)?;
    Ok(endpoint_url(base_url, "negotiate", &[("connectionData", data.as_str())]))
}

/// Builds the `/connect` or `/start` URL for an established token.
pub fn action_url(
    base_url: &str,
    action: &str,
    connection_token: &str,
    hub_name: &str,
) -> Result<String, SignalRError> {
    let data = connection_data(hub_name)?;
    Ok(endpoint_url(
        base_url,
        action,
        &[
            ("transport", TRANSPORT_NAME),
            ("connectionToken", connection_token),
            ("connectionData", data.as_str()),
        ],
    ))
}

/// Rewrites an `http(s)` URL to the matching `ws(s)` scheme.
///
/// Only the scheme changes; host, path, query and fragment are kept as
/// written.
pub fn websocket_url(url: &str) -> Result<String, SignalRError> {
    let parsed = Url::parse(url)?;
    let (_, rest) = url
        .split_once("://")
        .ok_or_else(|| SignalRError::InvalidUrl(url.to_string()))?;
    let scheme = if parsed.scheme() == "https" { "wss" } else { "ws" };
    Ok(format!("{scheme}://{rest}"))
}

fn endpoint_url(base_url: &str, action: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .copied()
        .chain(std::iter::once(("clientProtocol", PROTOCOL_VERSION)))
        .map(|(key, value)| format!("{key}={}", quote_plus(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base_url}/{action}?{query}")
}

fn quote_plus(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_data() {
        assert_eq!(connection_data("chat").unwrap(), r#"[{"name": "chat"}]"#);
        assert_eq!(
            connection_data(r#"we"ird"#).unwrap(),
            r#"[{"name": "we\"ird"}]"#
        );
    }

    #[test]
    fn test_negotiate_url() {
        assert_eq!(
            negotiate_url("http://x/y", "chat").unwrap(),
            "http://x/y/negotiate?connectionData=%5B%7B%22name%22%3A+%22chat%22%7D%5D&clientProtocol=1.5"
        );
    }

    #[test]
    fn test_connect_url() {
        assert_eq!(
            action_url("https://host/signalr", "connect", "tok/en+1", "chat").unwrap(),
            "https://host/signalr/connect?transport=webSockets&connectionToken=tok%2Fen%2B1\
             &connectionData=%5B%7B%22name%22%3A+%22chat%22%7D%5D&clientProtocol=1.5"
        );
    }

    #[test]
    fn test_start_url() {
        let url = action_url("http://host/signalr", "start", "abc", "chat").unwrap();
        assert!(url.starts_with("http://host/signalr/start?transport=webSockets&connectionToken=abc&"));
        assert!(url.ends_with("&clientProtocol=1.5"));
    }

    #[test]
    fn test_quote_plus() {
        assert_eq!(quote_plus("a b~c-d_e.f"), "a+b~c-d_e.f");
        assert_eq!(quote_plus("100%20"), "100%2520");
        assert_eq!(quote_plus("*"), "%2A");
    }

    #[test]
    fn test_websocket_url_secure() {
        assert_eq!(
            websocket_url("https://host/path/connect?a=1#frag").unwrap(),
            "wss://host/path/connect?a=1#frag"
        );
    }

    #[test]
    fn test_websocket_url_insecure() {
        assert_eq!(
            websocket_url("http://host:8080/path?q=%5B").unwrap(),
            "ws://host:8080/path?q=%5B"
        );
    }

    #[test]
    fn test_websocket_url_invalid() {
        assert!(matches!(
            websocket_url("not a url"),
            Err(SignalRError::UrlParse(_))
        ));
    }

    #[test]
    fn test_parse_negotiate_response() {
        let body = r#"{
            "Url": "/signalr",
            "ConnectionToken": "token",
            "ConnectionId": "id-1",
            "KeepAliveTimeout": 20.0,
            "DisconnectTimeout": 30.0,
            "TryWebSockets": true,
            "ProtocolVersion": "1.5",
            "TransportConnectTimeout": 5.0
        }"#;
        let response: NegotiateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.connection_token, "token");
        assert_eq!(response.connection_id, "id-1");
        assert_eq!(response.url.as_deref(), Some("/signalr"));
        assert_eq!(response.keep_alive_timeout, Some(20.0));
        assert_eq!(response.try_web_sockets, Some(true));
        assert_eq!(response.protocol_version.as_deref(), Some("1.5"));
        assert_eq!(
            response.extra.get("TransportConnectTimeout"),
            Some(&serde_json::json!(5.0))
        );
    }
}
