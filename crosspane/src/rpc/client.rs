//! RPC client: correlation ids, pending callbacks, guarded calls.
//!
//! The client binds to a bus and a fixed target context. Each `invoke`
//! allocates the next correlation id, stores the caller's callback, and
//! sends a `rpc_request` envelope; a matching `rpc_response` resolves the
//! callback exactly once and removes the entry, which is also what makes a
//! duplicate response a no-op.
//!
//! Raw `invoke` carries no timeout: a call whose target never replies
//! leaves its entry pending for the client's lifetime. The async [`call`]
//! path composes every request with the deadline tracker instead, so an
//! awaited call always resolves.
//!
//! [`call`]: RpcClient::call

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::bus::{BusMessage, Handler, MessageBus};
use crate::context::ContextId;
use crate::error::{BusError, CallError};
use crate::rpc::wire::{CallPayload, ResponsePayload, RPC_REQUEST, RPC_RESPONSE};
use crate::track::DeadlineTracker;

/// Callback resolved with a response's argument list.
pub type ResponseCallback = Box<dyn FnOnce(Vec<Value>)>;

/// Client-side RPC configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Deadline applied to every awaited [`RpcClient::call`].
    pub default_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            // Matches the network client this pattern was lifted from.
            default_timeout: Duration::from_secs(60),
        }
    }
}

/// RPC client bound to one bus and one target context.
pub struct RpcClient {
    bus: Rc<MessageBus>,
    target: ContextId,
    config: RpcConfig,

    /// Next correlation id. Monotonic from 0, never reused within this
    /// client's lifetime.
    next_id: Cell<u64>,

    pending: Rc<RefCell<HashMap<u64, ResponseCallback>>>,
    tracker: Rc<DeadlineTracker<Vec<Value>>>,

    /// The response handler registered on the bus, kept so it can be
    /// unregistered again when the client is dropped.
    dispatch: Handler,
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.bus.unregister(RPC_RESPONSE, &self.dispatch);
    }
}

impl RpcClient {
    /// Create a client for `target` with the default configuration.
    pub fn new(bus: &Rc<MessageBus>, target: ContextId) -> Self {
        Self::with_config(bus, target, RpcConfig::default())
    }

    /// Create a client for `target` with an explicit configuration.
    ///
    /// Registers the `rpc_response` handler on the bus immediately; the
    /// registration is removed again when the client is dropped.
    pub fn with_config(bus: &Rc<MessageBus>, target: ContextId, config: RpcConfig) -> Self {
        let pending: Rc<RefCell<HashMap<u64, ResponseCallback>>> =
            Rc::new(RefCell::new(HashMap::new()));

        let pending_ref = pending.clone();
        let dispatch: Handler = Rc::new(move |message: &BusMessage<'_>| {
            let response: ResponsePayload = match serde_json::from_value(message.data().clone()) {
                Ok(response) => response,
                Err(_) => {
                    tracing::debug!("dropping malformed rpc response payload");
                    return Ok(());
                }
            };

            // Removing the entry before invoking is what enforces
            // at-most-once resolution: a duplicate response finds no entry.
            let Some(callback) = pending_ref.borrow_mut().remove(&response.id) else {
                tracing::debug!(id = response.id, "dropping rpc response with no pending call");
                return Ok(());
            };
            callback(response.response);
            Ok(())
        });

        bus.register(RPC_RESPONSE, dispatch.clone());

        Self {
            bus: bus.clone(),
            target,
            config,
            next_id: Cell::new(0),
            pending,
            tracker: DeadlineTracker::new(),
            dispatch,
        }
    }

    /// The context this client addresses its calls to.
    pub fn target(&self) -> &ContextId {
        &self.target
    }

    /// Send a call and store the callback under a fresh correlation id.
    ///
    /// Returns the id assigned to the call. The callback fires at most
    /// once, when a matching response arrives; with no timeout composed at
    /// this layer, a call whose target never replies leaves the callback
    /// pending forever.
    ///
    /// # Errors
    ///
    /// Surfaces [`MessageBus::send`] failures; the pending entry is removed
    /// again when the envelope could not be sent.
    pub fn invoke<F>(&self, method: &str, args: Vec<Value>, callback: F) -> Result<u64, BusError>
    where
        F: FnOnce(Vec<Value>) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.pending.borrow_mut().insert(id, Box::new(callback));

        let payload = serde_json::to_value(CallPayload {
            id,
            method: method.to_string(),
            args,
        })?;

        match self.bus.send(&self.target, RPC_REQUEST, payload) {
            Ok(()) => Ok(id),
            Err(error) => {
                self.pending.borrow_mut().remove(&id);
                Err(error)
            }
        }
    }

    /// Call a remote method, guarded by the configured default timeout.
    ///
    /// # Errors
    ///
    /// [`CallError::DeadlineExceeded`] when no response arrives in time;
    /// bus failures surface as [`CallError::Bus`].
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
        self.call_with_timeout(method, args, self.config.default_timeout)
            .await
    }

    /// Call a remote method with an explicit deadline.
    ///
    /// Composes the deadline tracker with `invoke`: the stored response
    /// callback is the tracker's completion handle, so a reply that
    /// straggles in after the deadline is discarded by the tracker's token
    /// check rather than delivered twice. A zero deadline expires the call
    /// before the request is ever sent, so it always reports
    /// [`CallError::DeadlineExceeded`] even when the send itself would
    /// have failed. Must run inside a [`tokio::task::LocalSet`].
    pub async fn call_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>, CallError> {
        let (tx, rx) = oneshot::channel();
        let completion = self.tracker.guard(timeout, move |outcome| {
            let _ = tx.send(outcome);
        });

        // A zero deadline has already spent the guard; sending the request
        // would only produce a reply nobody can receive.
        if completion.is_live() {
            self.invoke(method, args, move |response| completion.complete(response))?;
        }

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_expired)) => Err(CallError::DeadlineExceeded),
            Err(_) => Err(CallError::Canceled),
        }
    }

    /// Number of calls still awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether the given correlation id is still awaiting a response.
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.borrow().contains_key(&id)
    }
}
