//! Internal message bus dispatching inbound hub frames.
//!
//! This module provides the core infrastructure for:
//! - Recording client invocations (`invoke` → [`InvocationRecord`]),
//! - Dispatching server calls to handlers registered by method name,
//! - Correlating server errors with the invocation that caused them.
//!
//! The bus keeps no state about frames themselves: each frame is classified
//! into its `R`, `M` and `E` parts and fanned out to the matching hooks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::connection::hook::{EventHook, HookResult};
use crate::connection::invocations::{InvocationLog, InvocationRecord};
use crate::error::SignalRError;
use crate::protocol::{InboundFrame, JsonCodec};

/// Hook identifier receiving non-boolean `R` payloads.
pub const READY_EVENT: &str = "R";

/// Server error delivered through [`SignalRClient::error`](crate::SignalRClient::error).
#[derive(Debug, Clone, PartialEq)]
pub struct HubError {
    /// Error message sent by the server; `None` when it sent `"E": null`.
    pub error: Option<String>,
    /// The invocation the error refers to, when the server named a known one.
    pub call_arguments: Option<InvocationRecord>,
}

/// Internal message bus for the connection.
///
/// Not exposed to the user. The client subscribes [`MessageBus::dispatch`] to
/// its `received` hook at construction.
pub(crate) struct MessageBus {
    /// Hub method handlers, plus the [`READY_EVENT`] hook.
    handlers: RwLock<HashMap<String, Arc<EventHook<[Value]>>>>,
    pub(crate) invocations: InvocationLog,
    pub(crate) error: EventHook<HubError>,
}

impl MessageBus {
    pub(crate) fn new(invocation_retention: Option<usize>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            invocations: InvocationLog::new(invocation_retention),
            error: EventHook::new(),
        }
    }

    /// Registers a handler, creating the hook for `event_id` on first use.
    pub(crate) fn register_handler<F>(&self, event_id: &str, handler: F)
    where
        F: Fn(&[Value]) -> HookResult + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(event_id.to_string())
            .or_default()
            .add_hook(handler);
    }

    fn handler(&self, event_id: &str) -> Option<Arc<EventHook<[Value]>>> {
        self.handlers.read().get(event_id).cloned()
    }

    /// Classifies one decoded frame and fans it out.
    pub(crate) fn dispatch(&self, value: &Value) -> Result<(), SignalRError> {
        let frame = JsonCodec::parse_frame(value)?;
        self.handle_hub_message(&frame)?;
        self.handle_error(&frame)
    }

    /// Delivers ready data and server-to-client method calls.
    pub(crate) fn handle_hub_message(&self, frame: &InboundFrame) -> Result<(), SignalRError> {
        if let Some(data) = frame.ready_data() {
            if let Some(hook) = self.handler(READY_EVENT) {
                hook.trigger_hooks(&[json!({ READY_EVENT: data })])?;
            }
        }

        for message in &frame.messages {
            let Some(method) = message.method.as_deref() else {
                debug!("Skipping hub message without a method name");
                continue;
            };
            match self.handler(method) {
                Some(hook) => hook.trigger_hooks(&message.arguments)?,
                None => trace!(method, "No handler registered"),
            }
        }
        Ok(())
    }

    /// Publishes a server error together with the invocation it refers to.
    pub(crate) fn handle_error(&self, frame: &InboundFrame) -> Result<(), SignalRError> {
        if !frame.has_error() {
            return Ok(());
        }
        let error = frame.error_message();
        let index = frame.invocation_index();
        debug!(index, ?error, "Hub error");
        self.error.trigger_hooks(&HubError {
            error,
            call_arguments: self.invocations.get(index),
        })
    }
}
