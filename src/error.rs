use thiserror::Error;

/// Boxed error returned by event handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the SignalR client.
#[derive(Error, Debug)]
pub enum SignalRError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// The `/negotiate` request returned a non-success status.
    #[error("Negotiation failed with status {status}: {body}")]
    Negotiation { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::SignalRProtocolError),

    /// A subscriber registered on an [`EventHook`](crate::EventHook) failed.
    #[error("Event handler failed: {0}")]
    Subscriber(#[source] BoxError),

    #[error("Connection already started")]
    AlreadyStarted,

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed by server{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConnectionClosed(Option<String>),
}
