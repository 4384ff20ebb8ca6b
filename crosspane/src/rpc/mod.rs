//! Call/response semantics over the message bus.
//!
//! Two verbs cover the whole surface: [`RpcServer::define`] exposes a
//! method to remote contexts, [`RpcClient::invoke`] (or the timeout-guarded
//! [`RpcClient::call`]) invokes one. Correlation ids match each response
//! envelope to the pending call that produced it.

mod client;
mod server;
pub mod wire;

pub use client::{ResponseCallback, RpcClient, RpcConfig};
pub use server::{MethodHandler, Reply, RpcServer};
pub use wire::{CallPayload, ResponsePayload, RPC_REQUEST, RPC_RESPONSE};
