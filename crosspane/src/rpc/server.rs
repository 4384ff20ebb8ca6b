//! RPC server: method registry and request dispatch.
//!
//! The server binds to a bus and handles inbound `rpc_request` envelopes.
//! Each registered method receives the caller's positional arguments plus a
//! [`Reply`] handle addressed at the original sender. Requests naming an
//! unknown method are dropped silently; the caller's only recourse is its
//! own timeout, which this server does not enforce.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::bus::{BusMessage, Handler, MessageBus};
use crate::context::ContextId;
use crate::error::{BusError, HandlerError};
use crate::rpc::wire::{CallPayload, ResponsePayload, RPC_REQUEST, RPC_RESPONSE};

/// Handler for one named method.
///
/// Invoked with the caller-supplied positional arguments and a [`Reply`]
/// handle. The handle may be used zero, one, or several times; each use
/// produces one response envelope.
pub type MethodHandler = Rc<dyn Fn(Vec<Value>, Reply)>;

/// Reply handle injected into method handlers.
///
/// Sends a `rpc_response` envelope carrying the call's correlation id back
/// to the context that issued the request. Cloneable, so a handler may
/// stash it and fulfill the call later (a deferred reply); the protocol
/// does not deduplicate multiple replies, callers enforce at-most-once on
/// their side.
///
/// Holds the bus weakly: a stored `Reply` never keeps a dropped bus alive.
#[derive(Clone)]
pub struct Reply {
    bus: Weak<MessageBus>,
    target: ContextId,
    id: u64,
}

impl Reply {
    /// Send one response envelope with the given argument list.
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] when the bus is gone, otherwise the same
    /// failure modes as [`MessageBus::send`].
    pub fn send(&self, response: Vec<Value>) -> Result<(), BusError> {
        let bus = self.bus.upgrade().ok_or(BusError::Closed)?;
        let payload = serde_json::to_value(ResponsePayload {
            id: self.id,
            response,
        })?;
        bus.send(&self.target, RPC_RESPONSE, payload)
    }
}

/// RPC server bound to one bus.
pub struct RpcServer {
    methods: Rc<RefCell<HashMap<String, MethodHandler>>>,
    bus: Weak<MessageBus>,

    /// The dispatch handler registered on the bus, kept so it can be
    /// unregistered again when the server is dropped.
    dispatch: Handler,
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unregister(RPC_REQUEST, &self.dispatch);
        }
    }
}

impl RpcServer {
    /// Create a server and bind it to the bus.
    ///
    /// Registers the `rpc_request` handler immediately; the registration
    /// is removed again when the server is dropped.
    pub fn new(bus: &Rc<MessageBus>) -> Self {
        let methods: Rc<RefCell<HashMap<String, MethodHandler>>> =
            Rc::new(RefCell::new(HashMap::new()));

        // The closure is owned by the bus, so it must hold the bus weakly
        // to avoid a reference cycle.
        let methods_ref = methods.clone();
        let bus_ref = Rc::downgrade(bus);
        let dispatch: Handler = Rc::new(move |message: &BusMessage<'_>| {
            let call: CallPayload = match serde_json::from_value(message.data().clone()) {
                Ok(call) => call,
                Err(_) => {
                    tracing::debug!("dropping malformed rpc request payload");
                    return Ok(());
                }
            };

            let handler = methods_ref.borrow().get(&call.method).cloned();
            let Some(handler) = handler else {
                tracing::debug!(method = %call.method, id = call.id, "dropping rpc request for unknown method");
                return Ok(());
            };

            let reply = Reply {
                bus: bus_ref.clone(),
                target: message.sender().clone(),
                id: call.id,
            };
            handler(call.args, reply);
            Ok(())
        });

        bus.register(RPC_REQUEST, dispatch.clone());

        Self {
            methods,
            bus: Rc::downgrade(bus),
            dispatch,
        }
    }

    /// Install the handler for a method name.
    ///
    /// Re-defining a name overwrites silently; the last writer wins.
    pub fn define<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>, Reply) + 'static,
    {
        self.methods
            .borrow_mut()
            .insert(method.into(), Rc::new(handler));
    }

    /// Install a strongly-typed handler for a method name.
    ///
    /// Decodes the first positional argument as `Req`, runs the handler,
    /// and replies with the serialized `Resp` on success. Requests whose
    /// argument does not decode are dropped like any other malformed
    /// request; handler errors are logged and produce no response.
    pub fn define_typed<Req, Resp, F>(&self, method: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + 'static,
        F: Fn(Req) -> Result<Resp, HandlerError> + 'static,
    {
        let method = method.into();
        let method_for_log = method.clone();
        self.define(method, move |mut args, reply| {
            if args.is_empty() {
                args.push(Value::Null);
            }
            let request: Req = match serde_json::from_value(args.swap_remove(0)) {
                Ok(request) => request,
                Err(error) => {
                    tracing::debug!(method = %method_for_log, %error, "dropping rpc request with undecodable argument");
                    return;
                }
            };

            match handler(request) {
                Ok(response) => match serde_json::to_value(response) {
                    Ok(value) => {
                        if let Err(error) = reply.send(vec![value]) {
                            tracing::warn!(method = %method_for_log, %error, "failed to send rpc reply");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(method = %method_for_log, %error, "failed to serialize rpc reply");
                    }
                },
                Err(error) => {
                    tracing::debug!(method = %method_for_log, %error, "rpc method handler failed, no response sent");
                }
            }
        });
    }

    /// Whether a handler is currently installed for the method.
    pub fn is_defined(&self, method: &str) -> bool {
        self.methods.borrow().contains_key(method)
    }
}
