//! Transport abstraction and the in-process hub transport.
//!
//! A [`Transport`] delivers a serialized text payload to a named target
//! context. Delivery is fire-and-forget: asynchronous, unordered, and
//! allowed to fail silently. The bus owns the inbound side by exposing
//! [`MessageBus::receive`](crate::bus::MessageBus::receive); hosts wire
//! their transport's arrival event to that entry point.
//!
//! [`InMemoryHub`] is the in-process implementation used by tests and
//! examples. It connects multiple buses by context id and delivers
//! synchronously into the target bus with the true sender identity
//! attached.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::bus::MessageBus;
use crate::context::ContextId;
use crate::error::TransportError;

/// Point-to-point, fire-and-forget payload delivery between contexts.
///
/// Implementations carry no delivery confirmation and no sender
/// authentication. An `Ok` return means the payload was accepted for
/// delivery, not that it arrived.
pub trait Transport {
    /// Submit a payload for delivery to the target context.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only for failures detected at submission
    /// time. Losing an accepted payload is not an error.
    fn deliver(&self, target: &ContextId, payload: &str) -> Result<(), TransportError>;
}

/// In-process transport connecting buses by context id.
///
/// Each attached bus is reachable under its own context id. Delivery is
/// synchronous: the target bus's `receive` runs before `deliver` returns,
/// which makes the full request/response round trip observable in a plain
/// unit test. Delivery to a detached or never-attached context is silently
/// dropped, modeling the channel's best-effort nature.
#[derive(Default)]
pub struct InMemoryHub {
    routes: RefCell<HashMap<ContextId, Weak<MessageBus>>>,
}

impl InMemoryHub {
    /// Create a new hub with no attached contexts.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Create a transport endpoint that stamps deliveries with `origin`.
    ///
    /// The origin becomes the sender identity seen by receiving buses.
    /// Endpoints are created before the bus they belong to, so attachment
    /// is a separate step:
    ///
    /// ```rust,ignore
    /// let hub = InMemoryHub::new();
    /// let id = ContextId::new("host")?;
    /// let bus = MessageBus::new(id.clone(), hub.endpoint(&id), PeerPolicy::any());
    /// hub.attach(&bus);
    /// ```
    pub fn endpoint(self: &Rc<Self>, origin: &ContextId) -> HubEndpoint {
        HubEndpoint {
            hub: Rc::clone(self),
            origin: origin.clone(),
        }
    }

    /// Make `bus` reachable under its own context id.
    pub fn attach(&self, bus: &Rc<MessageBus>) {
        self.routes
            .borrow_mut()
            .insert(bus.context_id().clone(), Rc::downgrade(bus));
    }

    /// Remove a context. Later deliveries to it are dropped.
    pub fn detach(&self, id: &ContextId) {
        self.routes.borrow_mut().remove(id);
    }
}

/// A hub endpoint bound to one sending context.
pub struct HubEndpoint {
    hub: Rc<InMemoryHub>,
    origin: ContextId,
}

impl Transport for HubEndpoint {
    fn deliver(&self, target: &ContextId, payload: &str) -> Result<(), TransportError> {
        // Release the routes borrow before dispatching: receive may send
        // replies that re-enter this hub.
        let bus = self
            .hub
            .routes
            .borrow()
            .get(target)
            .and_then(Weak::upgrade);

        match bus {
            Some(bus) => {
                bus.receive(&self.origin, payload);
                Ok(())
            }
            None => {
                tracing::debug!(target = %target, "dropping delivery to unattached context");
                Ok(())
            }
        }
    }
}
