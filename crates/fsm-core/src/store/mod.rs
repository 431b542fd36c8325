//! The `StateStore` capability set and the `StateEntry` it persists.
//!
//! This module defines the narrow interface the scheduler loop (`engine`)
//! reaches through to durably record history. Concrete backends (relational,
//! document, or the in-memory reference below) live in their own crates and
//! implement `StateStore` against this contract; the engine never depends on
//! a specific one.

mod memory;

pub use memory::InMemoryStateStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::TERMINAL_STATE;

/// Opaque, globally unique token identifying a run. UUIDv4 strings and
/// ObjectId hex strings are both acceptable; the engine treats this as an
/// opaque string throughout.
pub type RunId = String;

/// One `(error, visitIdx)` pair appended to a `StateEntry` each time a visit
/// of that state fails. `visit_idx` records which visit produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateError {
    pub error: String,
    pub visit_idx: u32,
}

/// One row/document per `(run_id, name)` pair.
///
/// `id` is the backend-assigned primary key rendered as a string (an
/// integer `bigserial` and a Mongo `ObjectId` are both opaque from here);
/// it is `None` for an entry that `new_initial_state` has constructed but
/// not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub id: Option<String>,
    pub tenant_id: String,
    pub run_id: RunId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub params: Value,
    pub visit_count: u32,
    pub errors: Vec<StateError>,
    pub yielded: bool,
}

impl StateEntry {
    pub fn is_terminal(&self) -> bool {
        self.name == TERMINAL_STATE
    }
}

/// Durable persistence of state history and the single current-state
/// pointer per tenant.
///
/// Implementations MUST make `save_state`, `yield_state`, `set_current_state`
/// and `terminate` atomic with the `StateStatus` pointer update they imply: a
/// caller must never observe a new entry without the pointer following it,
/// nor a pointer referencing an entry that isn't visible yet. A
/// transactional backend gets this for free; a non-transactional one must
/// write the entry first and the pointer last (orphan entries are tolerable,
/// a dangling pointer is not).
pub trait StateStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The entry `StateStatus` currently points at, or `None` if this tenant
    /// has no status row yet.
    fn get_last_state(&mut self) -> Result<Option<StateEntry>, Self::Error>;

    /// Allocate a fresh `run_id` and return an in-memory `INITIAL_STATE`
    /// entry. The caller always follows this with `save_state`; this method
    /// itself MUST NOT persist the entry.
    fn new_initial_state(&mut self) -> Result<StateEntry, Self::Error>;

    /// Persist `entry` (inserting or updating by `(run_id, name)`) and point
    /// the tenant's `StateStatus` at it.
    fn save_state(&mut self, entry: &mut StateEntry) -> Result<(), Self::Error>;

    /// Flip the `yielded` flag on an existing entry. Does not move the
    /// pointer.
    fn yield_state(&mut self, entry: &mut StateEntry, is_yielded: bool) -> Result<(), Self::Error>;

    /// Lookup by composite key `(name, run_id)`.
    fn find_state(&mut self, state_name: &str, run_id: &str) -> Result<Option<StateEntry>, Self::Error>;

    /// Upsert the outcome of a transition into `state_name` and advance the
    /// pointer. If `(run_id, state_name)` already has an entry, increments
    /// `visit_count`, replaces `params`/times, and appends `(err,
    /// visit_count+1)` to `errors` when `err` is non-empty. Otherwise inserts
    /// a fresh entry with `visit_count = 1`.
    #[allow(clippy::too_many_arguments)]
    fn set_current_state(&mut self,
                          state_name: &str,
                          run_id: &str,
                          err: Option<&str>,
                          params: Value,
                          start_time: DateTime<Utc>,
                          end_time: DateTime<Utc>)
                          -> Result<(), Self::Error>;

    /// Upsert a `TERMINAL_STATE` entry recording `"Max retry count
    /// reached"` and advance the pointer.
    fn terminate(&mut self, run_id: &str) -> Result<(), Self::Error>;

    /// All entries in ascending insertion order. Used by tests and
    /// operators, not by the scheduler loop itself.
    fn get_db_history(&mut self) -> Result<Vec<StateEntry>, Self::Error>;
}
