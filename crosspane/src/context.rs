//! Execution-context identity and peer restriction policy.
//!
//! Contexts are isolated units of running code that cannot share memory and
//! only exchange serialized text over a transport. A [`ContextId`] names one
//! such context; a [`PeerPolicy`] states which peer contexts a bus may talk
//! to. The policy is a mandatory constructor argument: a bus cannot be built
//! with an implicit wildcard.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors related to [`ContextId`] parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextIdError {
    /// The id was empty or contained only whitespace.
    #[error("context id cannot be empty")]
    Empty,
}

/// Identifier of an execution context (e.g. `"host"`, `"checkout-frame"`).
///
/// Ids are opaque non-empty strings. They address outbound deliveries and
/// tag inbound payloads with the sender's identity. The transport supplies
/// the sender id; the bus never verifies it beyond the peer policy check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(String);

impl ContextId {
    /// Create a context id, rejecting empty or whitespace-only names.
    pub fn new(id: impl Into<String>) -> Result<Self, ContextIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ContextIdError::Empty);
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContextId {
    type Err = ContextIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Restriction on which peer contexts a bus may send to or receive from.
///
/// The reference behavior this replaces was a silent wildcard: envelopes
/// were addressed to any target with no origin check at all. Restriction is
/// now an explicit choice made at bus construction.
///
/// - Outbound: a `send` to a disallowed target fails with
///   [`BusError::TargetNotAllowed`](crate::error::BusError::TargetNotAllowed).
/// - Inbound: a payload from a disallowed sender is dropped and logged,
///   consistent with how the bus treats foreign traffic.
#[derive(Debug, Clone)]
pub enum PeerPolicy {
    /// Any peer context is allowed. Must be opted into explicitly.
    Any,

    /// Only the listed peer contexts are allowed.
    Allowed(HashSet<ContextId>),
}

impl PeerPolicy {
    /// Allow any peer context.
    pub fn any() -> Self {
        PeerPolicy::Any
    }

    /// Allow exactly the given peer contexts.
    pub fn allow(peers: impl IntoIterator<Item = ContextId>) -> Self {
        PeerPolicy::Allowed(peers.into_iter().collect())
    }

    /// Whether the given peer is permitted by this policy.
    pub fn allows(&self, peer: &ContextId) -> bool {
        match self {
            PeerPolicy::Any => true,
            PeerPolicy::Allowed(peers) => peers.contains(peer),
        }
    }
}
