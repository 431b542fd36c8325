//! Backend-agnostic conformance scenarios.
//!
//! A concrete `StateStore` passes if running every scenario here against a
//! fresh instance behaves identically to `InMemoryStateStore`. Storage
//! crates call these from their own `tests/` so a backend that diverges
//! from the in-memory reference on any scenario fails its own test suite,
//! not just this crate's.

use serde_json::{json, Value};

use crate::constants::{INITIAL_STATE, TERMINAL_STATE};
use crate::result_adapter::ActionReturn;
use crate::{Engine, StateStore, TransitionGraph, TransitionRecord, VisitLimits};

/// Scenario 2: a graph with only a sink at `INITIAL_STATE`.
pub fn initial_only_sink<S: StateStore>(store: S) {
    let graph = TransitionGraph::new().insert(INITIAL_STATE, TransitionRecord::sink());
    let mut engine = Engine::new(store, graph, VisitLimits::new());
    let outcome = engine.run().expect("sink graph never errors");
    assert_eq!(outcome.state_name, INITIAL_STATE);
    assert!(!outcome.is_terminal);
    let history = engine.store_mut().get_db_history().expect("history readable");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].name, INITIAL_STATE);
}

/// Scenario 3: a single successful transition carries params to the sink.
pub fn single_successful_transition<S: StateStore>(store: S) {
    let graph = TransitionGraph::new()
        .insert(INITIAL_STATE,
                TransitionRecord::transition(|_p: Value| ActionReturn::from((true, None, json!({"val": 1}))),
                                              TERMINAL_STATE,
                                              "ABORT",
                                              true))
        .insert(TERMINAL_STATE, TransitionRecord::sink());
    let mut engine = Engine::new(store, graph, VisitLimits::new());
    let outcome = engine.run().expect("no ceiling to exceed");
    assert_eq!(outcome.state_name, TERMINAL_STATE);
    let history = engine.store_mut().get_db_history().expect("history readable");
    let names: Vec<&str> = history.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec![INITIAL_STATE, TERMINAL_STATE]);
    assert_eq!(history.last().unwrap().params, json!({"val": 1}));
}

/// Scenario 6: a ceiling-limited loop forces termination.
pub fn ceiling_exhaustion<S: StateStore>(store: S) {
    let graph = TransitionGraph::new()
        .insert(INITIAL_STATE,
                TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-START", "ABORT", true))
        .insert("LOOP-START",
                TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-END", "X", true))
        .insert("LOOP-END",
                TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-START", "X", true))
        .insert(TERMINAL_STATE, TransitionRecord::sink());
    let limits = VisitLimits::new().with(crate::constants::DEFAULT, 1);
    let mut engine = Engine::new(store, graph, limits);
    let outcome = engine.run().expect("forced termination is not an engine error");
    assert_eq!(outcome.state_name, TERMINAL_STATE);
    assert!(outcome.is_terminal);
    let history = engine.store_mut().get_db_history().expect("history readable");
    let terminal = history.iter().find(|e| e.name == TERMINAL_STATE).expect("terminal entry present");
    assert_eq!(terminal.errors[0].error, crate::constants::MAX_RETRY_ERROR);
}

/// Runs every scenario above against a freshly constructed store per call.
pub fn run_conformance_suite<S: StateStore>(make_store: impl Fn() -> S) {
    initial_only_sink(make_store());
    single_successful_transition(make_store());
    ceiling_exhaustion(make_store());
}
