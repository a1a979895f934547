//! Scripted in-memory transport for client tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_channel::mpsc;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::SignalRError;
use crate::negotiate::NegotiateResponse;
use crate::protocol::HubInvocation;
use crate::transport::Transport;

type Inbound = Result<Option<Value>, SignalRError>;

struct MockState {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    negotiate_status: Option<u16>,
    connect_fails: bool,
    send_fails: AtomicBool,
    sent: parking_lot::Mutex<Vec<HubInvocation>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// Cheaply cloneable handle; tests keep one clone and hand another to the
/// client.
#[derive(Clone)]
pub(crate) struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::build(None, false)
    }

    /// A transport whose negotiate request fails with `status`.
    pub(crate) fn failing_negotiate(status: u16) -> Self {
        Self::build(Some(status), false)
    }

    /// A transport that negotiates but fails to connect.
    pub(crate) fn failing_connect() -> Self {
        Self::build(None, true)
    }

    fn build(negotiate_status: Option<u16>, connect_fails: bool) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        Self {
            state: Arc::new(MockState {
                inbound_tx,
                inbound_rx: Mutex::new(inbound_rx),
                negotiate_status,
                connect_fails,
                send_fails: AtomicBool::new(false),
                sent: parking_lot::Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    /// Queues a frame for the listener.
    pub(crate) fn push(&self, frame: Value) {
        let _ = self.state.inbound_tx.unbounded_send(Ok(Some(frame)));
    }

    pub(crate) fn push_empty(&self) {
        let _ = self.state.inbound_tx.unbounded_send(Ok(None));
    }

    /// Makes the pending receive fail.
    pub(crate) fn fail(&self, error: SignalRError) {
        let _ = self.state.inbound_tx.unbounded_send(Err(error));
    }

    /// Makes subsequent sends fail until switched off again.
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.state.send_fails.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<HubInvocation> {
        self.state.sent.lock().clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn negotiate(&self, _hub_name: &str) -> Result<NegotiateResponse, SignalRError> {
        if let Some(status) = self.state.negotiate_status {
            return Err(SignalRError::Negotiation {
                status,
                body: String::new(),
            });
        }
        Ok(NegotiateResponse {
            connection_token: "token".into(),
            connection_id: "connection-1".into(),
            url: None,
            protocol_version: Some("1.5".into()),
            keep_alive_timeout: None,
            disconnect_timeout: None,
            try_web_sockets: Some(true),
            extra: Map::new(),
        })
    }

    async fn connect(&self, _connection_token: &str, _hub_name: &str) -> Result<(), SignalRError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.connect_fails {
            return Err(SignalRError::ConnectionClosed(Some("refused".into())));
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Value>, SignalRError> {
        let mut inbound = self.state.inbound_rx.lock().await;
        match inbound.next().await {
            Some(message) => message,
            None => Err(SignalRError::ConnectionClosed(None)),
        }
    }

    async fn send(&self, frame: &HubInvocation) -> Result<(), SignalRError> {
        if self.state.send_fails.load(Ordering::SeqCst) {
            return Err(SignalRError::ConnectionClosed(None));
        }
        self.state.sent.lock().push(frame.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), SignalRError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
