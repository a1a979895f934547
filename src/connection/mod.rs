//! SignalR client connection management.
//!
//! This module handles the connection lifecycle:
//! - Negotiating and opening the transport,
//! - Running the background listener that reads frames,
//! - Assigning invocation indices and recording invocations,
//! - Shutting down, either on request or after a receive failure.
//!
//! A connection moves through [`ConnectionState::Created`] →
//! [`Starting`](ConnectionState::Starting) → [`Open`](ConnectionState::Open) →
//! [`Closed`](ConnectionState::Closed) and is never reopened.
//!
//! Exactly one of two paths performs the `Open → Closed` transition and tears
//! the transport down:
//! - [`SignalRClient::close`] marks the connection closed, waits for the
//!   listener to exit, then closes the transport;
//! - the listener itself, when receiving or dispatching a frame fails. It
//!   publishes the error on [`SignalRClient::exception`] and closes the
//!   transport without waiting on anything.

mod bus;
mod hook;
mod invocations;

pub use bus::{HubError, READY_EVENT};
pub use hook::{EventHook, HookHandler, HookResult};
pub use invocations::InvocationRecord;

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientOptions;
use crate::error::SignalRError;
use crate::negotiate::NegotiateResponse;
use crate::protocol::{HubInvocation, JsonCodec};
use crate::transport::{Session, Transport, WebSocketsTransport};
use bus::MessageBus;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, `start()` not called yet.
    Created,
    /// Negotiating and connecting.
    Starting,
    /// Transport connected, listener running.
    Open,
    /// Closed by request, by a receive failure, or after a failed start.
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

struct Inner {
    url: String,
    hub_name: String,
    transport: Arc<dyn Transport>,
    /// Current state; also the listener's cancellation signal.
    state: watch::Sender<ConnectionState>,
    started: AtomicBool,
    negotiated: RwLock<Option<NegotiateResponse>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    bus: Arc<MessageBus>,
    received: EventHook<Value>,
    starting: EventHook<()>,
    stopping: EventHook<()>,
    exception: EventHook<SignalRError>,
}

impl Inner {
    fn is_open(&self) -> bool {
        self.state.borrow().is_open()
    }

    /// Performs the `Open → Closed` transition. Returns `true` for the one
    /// caller that made it.
    fn mark_closed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_open() {
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        })
    }

    async fn teardown(&self) -> Result<(), SignalRError> {
        let stopping = self.stopping.trigger_hooks(&());
        if let Err(err) = &stopping {
            warn!(error = %err, "Stopping handler failed");
        }
        self.transport.close().await?;
        info!(hub = %self.hub_name, "Connection closed");
        stopping
    }
}

async fn wait_closed(state: &mut watch::Receiver<ConnectionState>) {
    loop {
        let open = state.borrow_and_update().is_open();
        if !open || state.changed().await.is_err() {
            return;
        }
    }
}

/// Background task: reads frames until the connection closes.
async fn listen(inner: Arc<Inner>) {
    let mut state = inner.state.subscribe();
    loop {
        let received = tokio::select! {
            biased;
            () = wait_closed(&mut state) => break,
            received = inner.transport.receive() => received,
        };
        let outcome = match received {
            Ok(Some(frame)) => {
                trace!(?frame, "Received frame");
                inner.received.trigger_hooks(&frame)
            }
            Ok(None) => {
                trace!("Skipping empty message");
                continue;
            }
            Err(err) => Err(err),
        };
        let Err(err) = outcome else {
            continue;
        };

        if !inner.is_open() {
            debug!(error = %err, "Receive failed while closing");
            break;
        }
        error!(error = %err, "Failed to receive the data via transport");
        if let Err(hook_err) = inner.exception.trigger_hooks(&err) {
            warn!(error = %hook_err, "Exception handler failed");
        }
        if inner.mark_closed() {
            if let Err(close_err) = inner.teardown().await {
                warn!(error = %close_err, "Failed to close transport");
            }
        }
        break;
    }
    debug!(hub = %inner.hub_name, "Listener stopped");
}

/// Main client for interacting with a SignalR hub.
///
/// Cloning is cheap; clones share one connection.
///
/// # Example
///
/// ```no_run
/// use classic_signalr::SignalRClient;
///
/// # async fn example() -> Result<(), classic_signalr::SignalRError> {
/// let client = SignalRClient::new("http://localhost:8080/signalr", "chat");
/// client.subscribe_to_event("broadcast", |args| {
///     println!("broadcast: {args:?}");
///     Ok(())
/// });
/// client.error().add_hook(|error| {
///     eprintln!("hub error: {:?}", error.error);
///     Ok(())
/// });
///
/// client
///     .scoped(|client| async move {
///         client.invoke("send", &["user", "hello"]).await?;
///         client.run_while_open().await;
///         Ok::<_, classic_signalr::SignalRError>(())
///     })
///     .await
/// # }
/// ```
#[derive(Clone)]
pub struct SignalRClient {
    inner: Arc<Inner>,
}

impl SignalRClient {
    /// Creates a client for `hub_name` at `url` using a default session.
    ///
    /// The connection is not established until `start()` is called.
    pub fn new(url: impl Into<String>, hub_name: impl Into<String>) -> Self {
        Self::builder(url, hub_name).build()
    }

    /// Creates a client whose requests carry the headers, credentials and
    /// cookies of `session`.
    pub fn with_session(
        url: impl Into<String>,
        hub_name: impl Into<String>,
        session: Session,
    ) -> Self {
        Self::builder(url, hub_name).session(session).build()
    }

    /// Returns a builder for a client with a custom session, options or
    /// transport.
    ///
    /// # Arguments
    ///
    /// * `url` - Base URL of the SignalR endpoint (e.g., `http://localhost:8080/signalr`).
    /// * `hub_name` - Name of the hub to connect to.
    ///
    /// # Example
    ///
    /// ```
    /// use classic_signalr::{Auth, Session, SignalRClient};
    ///
    /// let client = SignalRClient::builder("http://localhost:8080/signalr", "chat")
    ///     .session(Session::default().with_auth(Auth::Bearer("token".into())))
    ///     .invocation_retention(1000)
    ///     .build();
    /// assert_eq!(client.hub_name(), "chat");
    /// ```
    pub fn builder(url: impl Into<String>, hub_name: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            url: url.into(),
            hub_name: hub_name.into(),
            session: None,
            options: ClientOptions::default(),
            transport: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn hub_name(&self) -> &str {
        &self.inner.hub_name
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Whether the connection ever reached [`ConnectionState::Open`].
    pub fn started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Connection id assigned by the server during negotiation.
    pub fn connection_id(&self) -> Option<String> {
        self.inner
            .negotiated
            .read()
            .as_ref()
            .map(|n| n.connection_id.clone())
    }

    pub fn connection_token(&self) -> Option<String> {
        self.inner
            .negotiated
            .read()
            .as_ref()
            .map(|n| n.connection_token.clone())
    }

    /// Full negotiate response, once `start()` got that far.
    pub fn negotiate_response(&self) -> Option<NegotiateResponse> {
        self.inner.negotiated.read().clone()
    }

    /// Returns the record of invocation `index`, if still retained.
    pub fn invocation(&self, index: u64) -> Option<InvocationRecord> {
        i64::try_from(index)
            .ok()
            .and_then(|index| self.inner.bus.invocations.get(index))
    }

    /// Every decoded inbound frame, before hub dispatch results are visible
    /// to later subscribers.
    pub fn received(&self) -> &EventHook<Value> {
        &self.inner.received
    }

    /// Server-reported errors, correlated with the invocation that caused them.
    pub fn error(&self) -> &EventHook<HubError> {
        &self.inner.bus.error
    }

    pub fn starting(&self) -> &EventHook<()> {
        &self.inner.starting
    }

    pub fn stopping(&self) -> &EventHook<()> {
        &self.inner.stopping
    }

    /// Failures of the background listener. The connection is closed right
    /// after the subscribers ran.
    pub fn exception(&self) -> &EventHook<SignalRError> {
        &self.inner.exception
    }

    /// Starts the connection: negotiate, connect, spawn the listener.
    ///
    /// Must be called from within a Tokio runtime. A client can be started
    /// once; later calls fail with [`SignalRError::AlreadyStarted`], and so
    /// does retrying after a failed start.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The connection is open and the listener is running.
    /// * `Err(SignalRError)` - If a `starting` handler, negotiation or the
    ///   handshake fails. The client is then closed.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use classic_signalr::SignalRClient;
    ///
    /// # async fn example() -> Result<(), classic_signalr::SignalRError> {
    /// let client = SignalRClient::new("http://localhost:8080/signalr", "chat");
    /// client.start().await?;
    /// assert!(client.is_open());
    /// client.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self) -> Result<(), SignalRError> {
        let inner = &self.inner;
        let fresh = inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Created {
                *state = ConnectionState::Starting;
                true
            } else {
                false
            }
        });
        if !fresh {
            return Err(SignalRError::AlreadyStarted);
        }

        info!(hub = %inner.hub_name, url = %inner.url, "Starting connection");
        if let Err(err) = self.open().await {
            inner.state.send_replace(ConnectionState::Closed);
            error!(error = %err, "Failed to start connection");
            return Err(err);
        }
        Ok(())
    }

    async fn open(&self) -> Result<(), SignalRError> {
        let inner = &self.inner;
        inner.starting.trigger_hooks(&())?;

        let negotiated = inner.transport.negotiate(&inner.hub_name).await?;
        debug!(connection_id = %negotiated.connection_id, "Negotiated connection");
        let token = negotiated.connection_token.clone();
        *inner.negotiated.write() = Some(negotiated);

        if let Err(err) = inner.transport.connect(&token, &inner.hub_name).await {
            // The socket may be up if only the start request failed
            if let Err(close_err) = inner.transport.close().await {
                debug!(error = %close_err, "Failed to release transport");
            }
            return Err(err);
        }

        // Held until the handle is stored so a concurrent close() joins it.
        let mut listener = inner.listener.lock();
        inner.state.send_replace(ConnectionState::Open);
        inner.started.store(true, Ordering::SeqCst);
        *listener = Some(tokio::spawn(listen(Arc::clone(inner))));
        info!(hub = %inner.hub_name, "Connection open");
        Ok(())
    }

    /// Closes the connection and waits for the listener to exit.
    ///
    /// Calling it again, or after the listener closed the connection itself,
    /// does nothing.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The connection is closed, or was never open.
    /// * `Err(SignalRError)` - If closing the transport or a `stopping`
    ///   handler failed. The connection is closed regardless.
    pub async fn close(&self) -> Result<(), SignalRError> {
        let inner = &self.inner;
        let closing = inner.mark_closed();
        if closing {
            info!(hub = %inner.hub_name, "Closing connection");
        }

        let listener = inner.listener.lock().take();
        if let Some(handle) = listener {
            if let Err(err) = handle.await {
                warn!(error = %err, "Listener task failed");
            }
        }

        if closing {
            inner.teardown().await
        } else {
            Ok(())
        }
    }

    /// Invokes `method` on the hub and returns its invocation index.
    ///
    /// Does not wait for the server. A failure reported later for this call
    /// arrives on [`error`](Self::error) with the record attached.
    ///
    /// # Arguments
    ///
    /// * `method` - Hub method name.
    /// * `args` - Positional arguments, each serialized to JSON.
    ///
    /// # Returns
    ///
    /// * `Ok(index)` - The invocation index sent as `I`.
    /// * `Err(SignalRError)` - If the connection is not open, an argument
    ///   cannot be serialized, or the send fails. A failed send still
    ///   consumes its index.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example(client: classic_signalr::SignalRClient) -> Result<(), classic_signalr::SignalRError> {
    /// let index = client.invoke("send", &["user", "hello"]).await?;
    /// if let Some(record) = client.invocation(index) {
    ///     assert_eq!(record.method, "send");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn invoke<T: Serialize>(&self, method: &str, args: &[T]) -> Result<u64, SignalRError> {
        if !self.is_open() {
            return Err(SignalRError::NotConnected);
        }
        let inner = &self.inner;
        let arguments = args
            .iter()
            .map(JsonCodec::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let index = inner
            .bus
            .invocations
            .record(&inner.hub_name, method, arguments.clone());
        debug!(index, method, "Invoking hub method");

        inner
            .transport
            .send(&HubInvocation {
                hub: inner.hub_name.clone(),
                method: method.to_string(),
                arguments,
                invocation_id: index,
            })
            .await?;
        Ok(index)
    }

    /// Registers a handler for server calls to `event_id`.
    ///
    /// The handler receives the call's positional arguments. Use
    /// [`READY_EVENT`] to receive `{"R": data}` for non-boolean results.
    pub fn subscribe_to_event<F>(&self, event_id: &str, handler: F)
    where
        F: Fn(&[Value]) -> HookResult + Send + Sync + 'static,
    {
        self.inner.bus.register_handler(event_id, handler);
    }

    /// Registers a handler that receives the arguments deserialized as `T`,
    /// typically a tuple.
    pub fn on<T, F>(&self, method: &str, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> HookResult + Send + Sync + 'static,
    {
        self.subscribe_to_event(method, move |args| {
            let parsed: T = serde_json::from_value(Value::Array(args.to_vec()))?;
            handler(parsed)
        });
    }

    /// Waits until the connection is no longer open.
    pub async fn run_while_open(&self) {
        let mut state = self.inner.state.subscribe();
        wait_closed(&mut state).await;
    }

    /// Starts the connection, runs `body`, then closes the connection whether
    /// `body` succeeded, failed or panicked.
    ///
    /// An error from `body` takes precedence over an error from closing. A
    /// panic in `body` is resumed once the connection is closed.
    pub async fn scoped<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(SignalRClient) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SignalRError>,
    {
        self.start().await?;
        let outcome = AssertUnwindSafe(body(self.clone())).catch_unwind().await;
        let closed = self.close().await;
        let value = match outcome {
            Ok(outcome) => outcome?,
            Err(payload) => panic::resume_unwind(payload),
        };
        closed?;
        Ok(value)
    }
}

impl fmt::Debug for SignalRClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRClient")
            .field("url", &self.inner.url)
            .field("hub_name", &self.inner.hub_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SignalRClient`].
pub struct ClientBuilder {
    url: String,
    hub_name: String,
    session: Option<Session>,
    options: ClientOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Session used by the default WebSocket transport.
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Keeps at most `limit` invocation records for error correlation.
    pub fn invocation_retention(mut self, limit: usize) -> Self {
        self.options.invocation_retention = Some(limit);
        self
    }

    /// Replaces the default [`WebSocketsTransport`].
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> SignalRClient {
        let ClientBuilder {
            url,
            hub_name,
            session,
            options,
            transport,
        } = self;
        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => Arc::new(WebSocketsTransport::new(
                url.clone(),
                session.unwrap_or_default(),
            )),
        };

        let bus = Arc::new(MessageBus::new(options.invocation_retention));
        let received = EventHook::new();
        let dispatcher = Arc::clone(&bus);
        received.add_hook(move |frame: &Value| dispatcher.dispatch(frame).map_err(Into::into));

        let (state, _) = watch::channel(ConnectionState::Created);
        SignalRClient {
            inner: Arc::new(Inner {
                url,
                hub_name,
                transport,
                state,
                started: AtomicBool::new(false),
                negotiated: RwLock::new(None),
                listener: Mutex::new(None),
                bus,
                received,
                starting: EventHook::new(),
                stopping: EventHook::new(),
                exception: EventHook::new(),
            }),
        }
    }
}
