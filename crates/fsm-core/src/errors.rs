//! Engine-level errors (simple by design).
//!
//! `FsmError` wraps a backend's own error type (`E`) so the scheduler loop
//! can propagate store failures without knowing anything about the backend.
//! Action failures never show up here: they are caught and folded into the
//! normal failure edge by the result adapter (see `result_adapter`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsmError<E>
    where E: std::error::Error + 'static
{
    /// A state named in the graph (as a key, a success edge, or a failure
    /// edge) was looked up and not found. Always a programmer bug in the
    /// graph definition, never a runtime condition to retry.
    #[error("unknown state in transition graph: {0}")]
    UnknownState(String),

    /// A non-sink record is missing a success or failure successor.
    #[error("transition record for {0} has an action but no successor edges")]
    MalformedTransition(String),

    /// The store raised while servicing a call from the scheduler loop.
    #[error("state store error: {0}")]
    Store(#[from] E),
}
