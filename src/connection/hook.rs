//! Multi-subscriber callback registry.
//!
//! [`EventHook`] is the publish/subscribe primitive behind every asynchronous
//! notification of the client: lifecycle events, inbound frames, hub method
//! calls and server errors.
//!
//! Subscribers run synchronously, in registration order, on whichever task
//! triggers the hook (usually the connection's listener). A failing subscriber
//! aborts the remaining ones for that trigger and its error is returned to the
//! caller of [`EventHook::trigger_hooks`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BoxError, SignalRError};

/// Result returned by event handlers.
pub type HookResult = Result<(), BoxError>;

/// A registered subscriber.
pub type HookHandler<A> = Arc<dyn Fn(&A) -> HookResult + Send + Sync>;

/// Ordered list of subscribers for one event.
pub struct EventHook<A: ?Sized> {
    handlers: RwLock<Vec<HookHandler<A>>>,
}

impl<A: ?Sized> EventHook<A> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Appends a subscriber. Returns the hook to allow chaining.
    pub fn add_hook<F>(&self, handler: F) -> &Self
    where
        F: Fn(&A) -> HookResult + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
        self
    }

    /// Appends several subscribers, keeping their order.
    pub fn add_hooks<I>(&self, handlers: I) -> &Self
    where
        I: IntoIterator<Item = HookHandler<A>>,
    {
        self.handlers.write().extend(handlers);
        self
    }

    /// Calls every current subscriber with `args`.
    ///
    /// The subscriber list is snapshotted first, so handlers may subscribe
    /// further handlers; those only see later triggers.
    pub fn trigger_hooks(&self, args: &A) -> Result<(), SignalRError> {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            handler(args).map_err(SignalRError::Subscriber)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<A: ?Sized> Default for EventHook<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for EventHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHook")
            .field("handlers", &self.len())
            .finish()
    }
}
