//! Publish/subscribe message bus over a best-effort transport.
//!
//! The bus wraps one transport endpoint and demultiplexes inbound traffic
//! by envelope type. Outbound, it serializes `{type, data}` envelopes and
//! hands them to the transport; inbound, it parses raw payloads and
//! dispatches each envelope to every handler registered for its type.
//!
//! ```text
//! send(target, kind, data) ──► Envelope ──► Transport
//!
//! Transport ──► receive(sender, raw)
//!                 │ parse failed        ──► dropped silently
//!                 │ sender not allowed  ──► dropped, logged
//!                 └─► dispatch to handlers registered for kind,
//!                     synchronously, in registration order
//! ```
//!
//! # Single-Threaded Design
//!
//! Handler tables use `RefCell` for interior mutability (no Send/Sync
//! required). Each bus instance owns its table exclusively; multiple
//! independent buses can coexist in one process, one per remote context.

pub mod envelope;

pub use envelope::Envelope;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::context::{ContextId, PeerPolicy};
use crate::error::{BusError, HandlerError};
use crate::transport::Transport;

/// Handler invoked for every dispatched envelope of a registered type.
///
/// Handlers are compared by `Rc` identity for [`MessageBus::unregister`],
/// so callers that intend to unregister must keep the clone they passed in.
/// A handler returning an error is logged and never starves the remaining
/// handlers for the same message.
pub type Handler = Rc<dyn Fn(&BusMessage<'_>) -> Result<(), HandlerError>>;

/// An inbound envelope's payload plus the sender needed to address a reply.
///
/// The sender identity is a relation, not ownership: the bus never manages
/// the remote context's lifetime, it only records who to answer.
pub struct BusMessage<'a> {
    bus: &'a MessageBus,
    sender: ContextId,
    data: Value,
}

impl BusMessage<'_> {
    /// The context that sent this envelope, as reported by the transport.
    pub fn sender(&self) -> &ContextId {
        &self.sender
    }

    /// The envelope payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Send an envelope back to this message's sender.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`MessageBus::send`].
    pub fn reply(&self, kind: &str, data: Value) -> Result<(), BusError> {
        self.bus.send(&self.sender, kind, data)
    }
}

/// Publish/subscribe bus bound to one transport endpoint.
pub struct MessageBus {
    context_id: ContextId,
    policy: PeerPolicy,
    transport: Box<dyn Transport>,

    /// Registration-ordered `(kind, handler)` pairs. A plain vector keeps
    /// fan-out dispatch in registration order and makes reverse-scan
    /// removal safe during iteration over a snapshot.
    handlers: RefCell<Vec<(String, Handler)>>,
}

impl MessageBus {
    /// Create a bus for `context_id` over the given transport.
    ///
    /// The peer policy is mandatory: restricting peers (or explicitly
    /// declining to) is a construction-time decision, never a silent
    /// wildcard.
    pub fn new(
        context_id: ContextId,
        transport: impl Transport + 'static,
        policy: PeerPolicy,
    ) -> Rc<Self> {
        Rc::new(Self {
            context_id,
            policy,
            transport: Box::new(transport),
            handlers: RefCell::new(Vec::new()),
        })
    }

    /// This bus's own context id.
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Add a handler for envelopes of the given kind.
    ///
    /// No uniqueness constraint: several handlers may share a kind and are
    /// invoked in registration order. The same handler may even be
    /// registered twice and will then run twice per dispatch.
    pub fn register(&self, kind: impl Into<String>, handler: Handler) {
        self.handlers.borrow_mut().push((kind.into(), handler));
    }

    /// Remove the most recently registered handler matching both kind and
    /// handler identity. No-op when nothing matches.
    pub fn unregister(&self, kind: &str, handler: &Handler) {
        let mut handlers = self.handlers.borrow_mut();
        for i in (0..handlers.len()).rev() {
            if handlers[i].0 == kind && Rc::ptr_eq(&handlers[i].1, handler) {
                handlers.remove(i);
                return;
            }
        }
    }

    /// Number of handlers currently registered for a kind.
    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers
            .borrow()
            .iter()
            .filter(|(k, _)| k == kind)
            .count()
    }

    /// Serialize an envelope and submit it to the transport.
    ///
    /// Fire-and-forget: an `Ok` return is not a delivery confirmation.
    ///
    /// # Errors
    ///
    /// - [`BusError::TargetNotAllowed`] when the peer policy rejects the
    ///   target.
    /// - [`BusError::Serialization`] when the envelope cannot be encoded.
    /// - [`BusError::Transport`] when the transport rejects the payload at
    ///   submission time.
    pub fn send(&self, target: &ContextId, kind: &str, data: Value) -> Result<(), BusError> {
        if !self.policy.allows(target) {
            return Err(BusError::TargetNotAllowed {
                target: target.clone(),
            });
        }

        let payload = serde_json::to_string(&Envelope::new(kind, data))?;
        tracing::debug!(target_context = %target, kind, "bus send");
        self.transport.deliver(target, &payload)?;
        Ok(())
    }

    /// Entry point invoked by the transport when a payload arrives.
    ///
    /// Payloads that do not parse as an [`Envelope`] are discarded without
    /// an error: the channel may carry traffic not meant for this bus.
    /// Senders rejected by the peer policy are dropped and logged. For a
    /// valid envelope, every handler registered for its kind runs
    /// synchronously, in registration order, against a snapshot of the
    /// handler table, so handlers may register or unregister during
    /// dispatch without skipping or double-invoking their peers.
    pub fn receive(&self, sender: &ContextId, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(_) => {
                tracing::debug!(sender = %sender, "dropping unparseable payload");
                return;
            }
        };

        if !self.policy.allows(sender) {
            tracing::warn!(sender = %sender, kind = %envelope.kind, "dropping envelope from disallowed sender");
            return;
        }

        let snapshot: Vec<Handler> = self
            .handlers
            .borrow()
            .iter()
            .filter(|(kind, _)| *kind == envelope.kind)
            .map(|(_, handler)| handler.clone())
            .collect();

        let message = BusMessage {
            bus: self,
            sender: sender.clone(),
            data: envelope.data,
        };

        for handler in snapshot {
            if let Err(error) = handler(&message) {
                // One failing handler must not starve the others.
                tracing::warn!(kind = %envelope.kind, %error, "bus handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use serde_json::json;
    use std::cell::Cell;

    /// Transport that records outbound deliveries.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Rc<RefCell<Vec<(ContextId, String)>>>,
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, target: &ContextId, payload: &str) -> Result<(), TransportError> {
            self.sent
                .borrow_mut()
                .push((target.clone(), payload.to_string()));
            Ok(())
        }
    }

    fn ctx(id: &str) -> ContextId {
        ContextId::new(id).unwrap()
    }

    fn test_bus() -> (Rc<MessageBus>, RecordingTransport) {
        let transport = RecordingTransport::default();
        let bus = MessageBus::new(ctx("local"), transport.clone(), PeerPolicy::any());
        (bus, transport)
    }

    fn counting_handler(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Handler {
        let log = log.clone();
        Rc::new(move |_message| {
            log.borrow_mut().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_send_serializes_envelope() {
        let (bus, transport) = test_bus();

        bus.send(&ctx("remote"), "ready", json!({"ok": true})).unwrap();

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ctx("remote"));
        assert_eq!(sent[0].1, r#"{"type":"ready","data":{"ok":true}}"#);
    }

    #[test]
    fn test_send_rejects_disallowed_target() {
        let transport = RecordingTransport::default();
        let bus = MessageBus::new(
            ctx("local"),
            transport.clone(),
            PeerPolicy::allow([ctx("friend")]),
        );

        let result = bus.send(&ctx("stranger"), "ready", Value::Null);
        assert!(matches!(result, Err(BusError::TargetNotAllowed { .. })));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_receive_dispatches_in_registration_order() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.register("ready", counting_handler(&log, "first"));
        bus.register("ready", counting_handler(&log, "second"));
        bus.register("other", counting_handler(&log, "other"));

        bus.receive(&ctx("remote"), r#"{"type":"ready","data":null}"#);

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_receive_unregistered_kind_invokes_nothing() {
        let (bus, transport) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.register("ready", counting_handler(&log, "ready"));
        bus.receive(&ctx("remote"), r#"{"type":"unknown_kind","data":null}"#);

        assert!(log.borrow().is_empty());
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_receive_drops_unparseable_payload() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.register("ready", counting_handler(&log, "ready"));
        bus.receive(&ctx("remote"), "garbage {{{");
        bus.receive(&ctx("remote"), r#"{"no_type_field": 1}"#);

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_receive_drops_disallowed_sender() {
        let transport = RecordingTransport::default();
        let bus = MessageBus::new(
            ctx("local"),
            transport,
            PeerPolicy::allow([ctx("friend")]),
        );
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.register("ready", counting_handler(&log, "ready"));
        bus.receive(&ctx("stranger"), r#"{"type":"ready","data":null}"#);
        assert!(log.borrow().is_empty());

        bus.receive(&ctx("friend"), r#"{"type":"ready","data":null}"#);
        assert_eq!(*log.borrow(), vec!["ready"]);
    }

    #[test]
    fn test_unregister_removes_exact_handler() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = counting_handler(&log, "first");
        let second = counting_handler(&log, "second");
        bus.register("ready", first.clone());
        bus.register("ready", second.clone());
        assert_eq!(bus.handler_count("ready"), 2);

        bus.unregister("ready", &first);
        assert_eq!(bus.handler_count("ready"), 1);

        bus.receive(&ctx("remote"), r#"{"type":"ready","data":null}"#);
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn test_unregister_is_noop_when_absent() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        let registered = counting_handler(&log, "registered");
        let never_registered = counting_handler(&log, "never");
        bus.register("ready", registered.clone());

        // Wrong kind, then wrong handler identity.
        bus.unregister("other", &registered);
        bus.unregister("ready", &never_registered);
        assert_eq!(bus.handler_count("ready"), 1);
    }

    #[test]
    fn test_unregister_duplicate_registration_removes_one() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        let handler = counting_handler(&log, "dup");
        bus.register("ready", handler.clone());
        bus.register("ready", handler.clone());

        bus.receive(&ctx("remote"), r#"{"type":"ready","data":null}"#);
        assert_eq!(*log.borrow(), vec!["dup", "dup"]);

        bus.unregister("ready", &handler);
        assert_eq!(bus.handler_count("ready"), 1);
    }

    #[test]
    fn test_failing_handler_does_not_starve_others() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));

        let failing: Handler = Rc::new(|_message| Err(HandlerError::failed("boom")));
        bus.register("ready", failing);
        bus.register("ready", counting_handler(&log, "after"));

        bus.receive(&ctx("remote"), r#"{"type":"ready","data":null}"#);
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn test_handler_registered_during_dispatch_waits_for_next_message() {
        let (bus, _) = test_bus();
        let log = Rc::new(RefCell::new(Vec::new()));
        let fired = Rc::new(Cell::new(false));

        let bus_for_handler = Rc::downgrade(&bus);
        let log_for_handler = log.clone();
        let fired_clone = fired.clone();
        let registering: Handler = Rc::new(move |_message| {
            if !fired_clone.get() {
                fired_clone.set(true);
                if let Some(bus) = bus_for_handler.upgrade() {
                    bus.register("ready", counting_handler(&log_for_handler, "late"));
                }
            }
            log_for_handler.borrow_mut().push("registering");
            Ok(())
        });
        bus.register("ready", registering);

        // The handler added mid-dispatch must not run for this message.
        bus.receive(&ctx("remote"), r#"{"type":"ready","data":null}"#);
        assert_eq!(*log.borrow(), vec!["registering"]);

        bus.receive(&ctx("remote"), r#"{"type":"ready","data":null}"#);
        assert_eq!(
            *log.borrow(),
            vec!["registering", "registering", "late"]
        );
    }

    #[test]
    fn test_reply_targets_original_sender() {
        let (bus, transport) = test_bus();

        let replying: Handler = Rc::new(|message| {
            message
                .reply("ack", json!({"for": message.data().clone()}))
                .map_err(|e| HandlerError::failed(e))
        });
        bus.register("ready", replying);

        bus.receive(&ctx("remote"), r#"{"type":"ready","data":7}"#);

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ctx("remote"));
        assert_eq!(sent[0].1, r#"{"type":"ack","data":{"for":7}}"#);
    }
}
