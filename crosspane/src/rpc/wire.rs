//! RPC payload shapes layered on top of the bus envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope kind carrying a [`CallPayload`].
pub const RPC_REQUEST: &str = "rpc_request";

/// Envelope kind carrying a [`ResponsePayload`].
pub const RPC_RESPONSE: &str = "rpc_response";

/// A call addressed to a named method on the remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPayload {
    /// Correlation id, unique within the issuing client's lifetime.
    pub id: u64,

    /// Name of the method to invoke.
    pub method: String,

    /// Positional arguments, defaulting to empty when omitted.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// A response correlated to an earlier call by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Correlation id copied from the call.
    pub id: u64,

    /// The reply's argument list.
    #[serde(default)]
    pub response: Vec<Value>,
}
