//! Error types for the crosspane messaging core.

use thiserror::Error;

use crate::context::ContextId;

/// Errors raised by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been shut down and can no longer deliver.
    #[error("transport closed")]
    Closed,

    /// The transport rejected the payload outright.
    ///
    /// Best-effort transports are allowed to lose payloads silently after
    /// returning `Ok`; this variant is only for failures detected at
    /// submission time.
    #[error("delivery failed: {message}")]
    DeliveryFailed {
        /// Details about the delivery failure.
        message: String,
    },
}

/// Errors raised by [`MessageBus`](crate::bus::MessageBus) operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The target context is not permitted by the bus's peer policy.
    #[error("target context not allowed by peer policy: {target}")]
    TargetNotAllowed {
        /// The rejected target context.
        target: ContextId,
    },

    /// The outbound envelope could not be serialized.
    #[error("envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying transport failed at submission time.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The bus backing this handle has been dropped.
    #[error("message bus closed")]
    Closed,
}

/// Errors returned by bus handlers and typed method handlers.
///
/// A handler returning an error never aborts dispatch; the bus logs the
/// failure and continues with the remaining handlers for the message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not decode the payload it was given.
    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The handler ran but failed.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any displayable value.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        HandlerError::Failed(message.to_string())
    }
}

/// Errors surfaced to callers awaiting an RPC response.
#[derive(Debug, Error)]
pub enum CallError {
    /// No response arrived before the configured deadline.
    #[error("call did not complete before the deadline")]
    DeadlineExceeded,

    /// The call envelope could not be sent.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The guard resolving this call was dropped before completing.
    #[error("call was canceled before resolving")]
    Canceled,
}
