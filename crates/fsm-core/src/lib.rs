//! Durable, resumable execution of a finite-state machine over an
//! operator-supplied transition graph.
//!
//! An external driver builds an [`engine::Engine`] from a [`store::StateStore`],
//! a [`graph::TransitionGraph`] and [`visit::VisitLimits`], then calls
//! [`engine::Engine::run`] repeatedly. Each call executes one transition, one
//! yield, or one forced termination and returns; the driver decides whether
//! and when to call again.

pub mod conformance;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod result_adapter;
pub mod store;
pub mod visit;

pub use engine::{Engine, RunOutcome};
pub use errors::FsmError;
pub use graph::{TransitionGraph, TransitionRecord};
pub use result_adapter::{ActionOutcome, ActionReturn};
pub use store::{InMemoryStateStore, RunId, StateEntry, StateError, StateStore};
pub use visit::{VisitAccountant, VisitLimits};
