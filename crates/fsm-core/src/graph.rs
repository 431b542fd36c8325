//! The transition graph: an immutable map from state name to what happens
//! when the loop arrives there.

use std::collections::HashMap;

use serde_json::Value;

use crate::result_adapter::ActionReturn;

/// One entry in the graph. A `None` action marks a sink: the run is
/// complete the moment the loop arrives here, regardless of `can_continue`.
pub struct TransitionRecord {
    pub action: Option<Box<dyn Fn(Value) -> ActionReturn + Send + Sync>>,
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
    pub can_continue: bool,
}

impl TransitionRecord {
    /// A state with a real action and both successor edges.
    pub fn transition<F>(action: F, on_success: impl Into<String>, on_failure: impl Into<String>, can_continue: bool) -> Self
        where F: Fn(Value) -> ActionReturn + Send + Sync + 'static
    {
        Self { action: Some(Box::new(action)),
               on_success: Some(on_success.into()),
               on_failure: Some(on_failure.into()),
               can_continue }
    }

    /// A sink: `(nil, nil, nil, false)`. Reaching it ends the run.
    pub fn sink() -> Self {
        Self { action: None, on_success: None, on_failure: None, can_continue: false }
    }
}

/// Read-only `state name -> TransitionRecord` mapping. The loop never
/// mutates this; build it once up front and hand the engine a reference.
#[derive(Default)]
pub struct TransitionGraph {
    records: HashMap<String, TransitionRecord>,
}

impl TransitionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, state_name: impl Into<String>, record: TransitionRecord) -> Self {
        self.records.insert(state_name.into(), record);
        self
    }

    pub fn get(&self, state_name: &str) -> Option<&TransitionRecord> {
        self.records.get(state_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INITIAL_STATE, TERMINAL_STATE};

    #[test]
    fn unknown_state_lookup_returns_none() {
        let graph = TransitionGraph::new();
        assert!(graph.get(INITIAL_STATE).is_none());
    }

    #[test]
    fn sink_record_has_no_action() {
        let graph = TransitionGraph::new().insert(TERMINAL_STATE, TransitionRecord::sink());
        let record = graph.get(TERMINAL_STATE).unwrap();
        assert!(record.action.is_none());
        assert!(!record.can_continue);
    }
}
