//! WebSocket transport for classic SignalR.
//!
//! Handles the three-step handshake:
//! 1. `GET /negotiate` to obtain a connection token,
//! 2. WebSocket upgrade on `/connect`,
//! 3. `GET /start` to tell the server the transport is ready.
//!
//! The socket is split after the upgrade so the listener task can wait on the
//! read half while callers write through the other.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::SignalRError;
use crate::negotiate::{NegotiateResponse, action_url, negotiate_url, websocket_url};
use crate::protocol::{HubInvocation, JsonCodec};
use crate::transport::{Session, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Classic SignalR over WebSockets.
pub struct WebSocketsTransport {
    base_url: String,
    session: RwLock<Option<Session>>,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
}

impl WebSocketsTransport {
    /// Creates a transport for the hub endpoint at `base_url`
    /// (e.g. `http://localhost:8080/signalr`).
    pub fn new(base_url: impl Into<String>, session: Session) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: RwLock::new(Some(session)),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session(&self) -> Result<Session, SignalRError> {
        self.session.read().clone().ok_or(SignalRError::NotConnected)
    }
}

#[async_trait]
impl Transport for WebSocketsTransport {
    async fn negotiate(&self, hub_name: &str) -> Result<NegotiateResponse, SignalRError> {
        let url = negotiate_url(&self.base_url, hub_name)?;
        debug!(%url, "Negotiate URL");

        let response = self.session()?.get(&url)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignalRError::Negotiation {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn connect(&self, connection_token: &str, hub_name: &str) -> Result<(), SignalRError> {
        let session = self.session()?;
        let ws_url = websocket_url(&action_url(
            &self.base_url,
            "connect",
            connection_token,
            hub_name,
        )?)?;
        debug!(url = %ws_url, "WebSocket URL");

        let mut request = ws_url.as_str().into_client_request()?;
        request.headers_mut().extend(session.request_headers()?);
        let (ws_stream, _) = connect_async(request).await?;
        let (writer, reader) = ws_stream.split();
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);

        let start_url = action_url(&self.base_url, "start", connection_token, hub_name)?;
        debug!(url = %start_url, "Start URL");
        let response = session.get(&start_url)?.send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "Start request returned a failure status");
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Value>, SignalRError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(SignalRError::NotConnected)?;
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(message = %text.as_str(), "Received text message");
                    return Ok(JsonCodec::decode(text.as_str())?);
                }
                Some(Ok(Message::Binary(data))) => return Ok(JsonCodec::decode_slice(&data)?),
                // Pongs for incoming pings are queued by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(close_frame))) => {
                    let reason = close_frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty());
                    return Err(SignalRError::ConnectionClosed(reason));
                }
                Some(Err(e)) => return Err(SignalRError::WebSocket(e)),
                None => return Err(SignalRError::ConnectionClosed(None)),
            }
        }
    }

    async fn send(&self, frame: &HubInvocation) -> Result<(), SignalRError> {
        let text = JsonCodec::encode(frame)?;
        trace!(message = %text, "Sending frame");
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SignalRError::NotConnected)?;
        writer.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SignalRError> {
        let writer = self.writer.lock().await.take();
        let closed = match writer {
            Some(mut writer) => match writer.close().await {
                Ok(())
                | Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
                Err(e) => Err(SignalRError::WebSocket(e)),
            },
            None => Ok(()),
        };
        self.reader.lock().await.take();
        // Dropping the session releases its pooled HTTP connections.
        self.session.write().take();
        debug!("Transport closed");
        closed
    }
}
