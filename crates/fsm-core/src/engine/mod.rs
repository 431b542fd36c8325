//! The scheduler loop: the one piece of this crate that actually decides
//! anything. Everything else (graph, store, result adapter, visit
//! accountant) exists to be consulted from here.

mod core;

pub use core::{Engine, RunOutcome};
