//! # Crosspane
//!
//! Asynchronous RPC between memory-isolated execution contexts that can
//! only exchange serialized text over a best-effort, unordered channel.
//!
//! The transport guarantees neither delivery, ordering, nor sender
//! identity; crosspane builds a reliable request/response abstraction on
//! top of it, with method dispatch, multiplexed concurrent calls, and
//! correlation of asynchronous replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ RpcClient                │ RpcServer                  │
//! │  invoke / call           │  define / define_typed     │
//! │  correlation ids,        │  method registry,          │
//! │  pending callbacks       │  injected Reply handle     │
//! ├───────────────────────────────────────────────────────┤
//! │ MessageBus                                            │
//! │  register / unregister / send / receive               │
//! │  envelope parsing, per-type fan-out, peer policy      │
//! ├───────────────────────────────────────────────────────┤
//! │ Transport (point-to-point, fire-and-forget)           │
//! └───────────────────────────────────────────────────────┘
//!
//! DeadlineTracker: races any asynchronous completion against a
//! deadline timer with exactly-once callback delivery; composed by
//! RpcClient::call and reusable on its own.
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let hub = InMemoryHub::new();
//!
//! let server_id = ContextId::new("server")?;
//! let server_bus = MessageBus::new(
//!     server_id.clone(),
//!     hub.endpoint(&server_id),
//!     PeerPolicy::any(),
//! );
//! hub.attach(&server_bus);
//!
//! let server = RpcServer::new(&server_bus);
//! server.define("echo", |args, reply| {
//!     let _ = reply.send(args);
//! });
//!
//! // Elsewhere, a client bound to its own bus:
//! let response = client.call("echo", vec![json!(42)]).await?;
//! ```
//!
//! ## Single-Threaded Design
//!
//! Every component owns its state through `Cell`/`RefCell` and is driven
//! from one event loop; correctness of the response/timeout races rests on
//! token and correlation-id checks, not on locks. Deadline timers require a
//! [`tokio::task::LocalSet`] on a current-thread runtime.

#![deny(missing_docs)]

pub mod bus;
pub mod context;
pub mod error;
pub mod rpc;
pub mod track;
pub mod transport;

pub use bus::{BusMessage, Envelope, Handler, MessageBus};
pub use context::{ContextId, ContextIdError, PeerPolicy};
pub use error::{BusError, CallError, HandlerError, TransportError};
pub use rpc::{Reply, RpcClient, RpcConfig, RpcServer, RPC_REQUEST, RPC_RESPONSE};
pub use track::{Completion, DeadlineTracker, Expired, GuardResult};
pub use transport::{HubEndpoint, InMemoryHub, Transport};
