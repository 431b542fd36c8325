use chrono::Utc;
use log::{debug, warn};

use crate::errors::FsmError;
use crate::graph::TransitionGraph;
use crate::result_adapter::invoke_action;
use crate::store::{RunId, StateEntry, StateStore};
use crate::visit::{VisitAccountant, VisitLimits};

/// What one `run` call left behind: enough for the driver to decide
/// whether to call again.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub state_name: String,
    pub is_terminal: bool,
    pub is_yielded: bool,
}

/// Drives runs of `graph` through `store`, respecting `visit_limits`.
///
/// One instance is meant to serve one tenant / one store; the engine never
/// interleaves two runs (§5: single-threaded, blocking, one `run` call is
/// one transition-or-yield-or-termination and returns).
pub struct Engine<S: StateStore> {
    store: S,
    graph: TransitionGraph,
    visit_limits: VisitLimits,
}

impl<S: StateStore> Engine<S> {
    pub fn new(store: S, graph: TransitionGraph, visit_limits: VisitLimits) -> Self {
        Self { store, graph, visit_limits }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Runs the dispatch loop to its next stopping point: a yield, a sink,
    /// or a forced termination. Implemented as a plain loop rather than
    /// recursion so arbitrarily long runs (scenario: thousands of
    /// iterations without yielding) never grow the call stack.
    pub fn run(&mut self) -> Result<RunOutcome, FsmError<S::Error>> {
        let mut current = self.bootstrap()?;
        let run_id = current.run_id.clone();
        debug!(target: "fsm_core::engine", "run {} starting dispatch at {}", run_id, current.name);

        loop {
            let record = self.graph
                              .get(&current.name)
                              .ok_or_else(|| FsmError::UnknownState(current.name.clone()))?;

            if record.action.is_none() {
                debug!(target: "fsm_core::engine", "run {} reached sink {}", run_id, current.name);
                return Ok(RunOutcome { run_id,
                                        state_name: current.name,
                                        is_terminal: current.is_terminal(),
                                        is_yielded: current.yielded });
            }

            if !record.can_continue {
                if !current.yielded {
                    self.store.yield_state(&mut current, true).map_err(FsmError::Store)?;
                    debug!(target: "fsm_core::engine", "run {} yielding at {}", run_id, current.name);
                    return Ok(RunOutcome { run_id,
                                            state_name: current.name,
                                            is_terminal: false,
                                            is_yielded: true });
                }
                self.store.yield_state(&mut current, false).map_err(FsmError::Store)?;
            }

            let on_success = record.on_success
                                    .clone()
                                    .ok_or_else(|| FsmError::MalformedTransition(current.name.clone()))?;
            let on_failure = record.on_failure
                                    .clone()
                                    .ok_or_else(|| FsmError::MalformedTransition(current.name.clone()))?;

            if self.ceiling_reached(&on_success, &run_id)? {
                warn!(target: "fsm_core::engine", "run {} ceiling reached on success edge {}", run_id, on_success);
                self.store.terminate(&run_id).map_err(FsmError::Store)?;
                return Ok(RunOutcome { run_id, state_name: crate::constants::TERMINAL_STATE.to_string(), is_terminal: true, is_yielded: false });
            }

            let start_time = Utc::now();
            // record.action is Some, checked above; the graph is immutable
            // for the lifetime of this engine so this lookup is repeated
            // rather than held across the mutable store calls below.
            let outcome = {
                let record = self.graph.get(&current.name).expect("checked above");
                let action = record.action.as_ref().expect("checked above");
                invoke_action(action, current.params.clone())
            };
            let end_time = Utc::now();

            if !outcome.success {
                if self.ceiling_reached(&on_failure, &run_id)? {
                    warn!(target: "fsm_core::engine", "run {} ceiling reached on failure edge {}", run_id, on_failure);
                    self.store.terminate(&run_id).map_err(FsmError::Store)?;
                    return Ok(RunOutcome { run_id, state_name: crate::constants::TERMINAL_STATE.to_string(), is_terminal: true, is_yielded: false });
                }
            }

            let next_name = if outcome.success { on_success } else { on_failure };
            self.store
                .set_current_state(&next_name, &run_id, outcome.error.as_deref(), outcome.params, start_time, end_time)
                .map_err(FsmError::Store)?;

            current = self.store
                          .find_state(&next_name, &run_id)
                          .map_err(FsmError::Store)?
                          .expect("set_current_state just wrote this entry");
        }
    }

    fn ceiling_reached(&mut self, candidate: &str, run_id: &str) -> Result<bool, FsmError<S::Error>> {
        let existing = self.store.find_state(candidate, run_id).map_err(FsmError::Store)?;
        let accountant = VisitAccountant::new(&self.visit_limits);
        Ok(accountant.ceiling_reached(candidate, existing.map(|e| e.visit_count)))
    }

    fn bootstrap(&mut self) -> Result<StateEntry, FsmError<S::Error>> {
        let last = self.store.get_last_state().map_err(FsmError::Store)?;
        match last {
            Some(entry) if !entry.is_terminal() => Ok(entry),
            _ => {
                let mut fresh = self.store.new_initial_state().map_err(FsmError::Store)?;
                self.store.save_state(&mut fresh).map_err(FsmError::Store)?;
                Ok(fresh)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::constants::{INITIAL_STATE, TERMINAL_STATE};
    use crate::graph::TransitionRecord;
    use crate::result_adapter::ActionReturn;
    use crate::store::InMemoryStateStore;

    fn engine_with(graph: TransitionGraph, limits: VisitLimits) -> Engine<InMemoryStateStore> {
        Engine::new(InMemoryStateStore::new("t1"), graph, limits)
    }

    #[test]
    fn empty_graph_raises_missing_key_for_initial_state() {
        let mut engine = engine_with(TransitionGraph::new(), VisitLimits::new());
        let err = engine.run().unwrap_err();
        assert!(matches!(err, FsmError::UnknownState(name) if name == INITIAL_STATE));
        assert!(engine.store_mut().get_db_history().unwrap().is_empty());
    }

    #[test]
    fn initial_only_sink_persists_one_entry() {
        let graph = TransitionGraph::new().insert(INITIAL_STATE, TransitionRecord::sink());
        let mut engine = engine_with(graph, VisitLimits::new());
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.state_name, INITIAL_STATE);
        assert!(!outcome.is_terminal);
        let history = engine.store_mut().get_db_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, INITIAL_STATE);
    }

    #[test]
    fn single_successful_transition_reaches_terminal_with_params() {
        let graph = TransitionGraph::new()
            .insert(INITIAL_STATE,
                    TransitionRecord::transition(|_p: Value| ActionReturn::from((true, None, json!({"val": 1}))),
                                                  TERMINAL_STATE,
                                                  "ABORT",
                                                  true))
            .insert(TERMINAL_STATE, TransitionRecord::sink());
        let mut engine = engine_with(graph, VisitLimits::new());
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.state_name, TERMINAL_STATE);
        let history = engine.store_mut().get_db_history().unwrap();
        let names: Vec<&str> = history.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![INITIAL_STATE, TERMINAL_STATE]);
        assert_eq!(history.last().unwrap().params, json!({"val": 1}));
    }

    #[test]
    fn failure_edge_is_taken_and_params_flow_through() {
        let graph = TransitionGraph::new()
            .insert(INITIAL_STATE,
                    TransitionRecord::transition(|_p: Value| ActionReturn::from((false, None, json!({"val": 1}))),
                                                  TERMINAL_STATE,
                                                  "ABORT",
                                                  true))
            .insert("ABORT",
                    TransitionRecord::transition(|p: Value| {
                                                      assert_eq!(p, json!({"val": 1}));
                                                      ActionReturn::from((true, None, json!({})))
                                                  },
                                                  TERMINAL_STATE,
                                                  "X",
                                                  true))
            .insert(TERMINAL_STATE, TransitionRecord::sink());
        let mut engine = engine_with(graph, VisitLimits::new());
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.state_name, TERMINAL_STATE);
    }

    #[test]
    fn yield_then_resume_calls_action_only_on_second_run() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let called = Arc::new(AtomicBool::new(false));
        let called_in_action = called.clone();
        let graph = TransitionGraph::new()
            .insert(INITIAL_STATE,
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "NEXT", "ABORT", true))
            .insert("NEXT",
                    TransitionRecord::transition(move |p: Value| {
                                                      called_in_action.store(true, Ordering::SeqCst);
                                                      ActionReturn::from((true, None, p))
                                                  },
                                                  TERMINAL_STATE,
                                                  "X",
                                                  false))
            .insert(TERMINAL_STATE, TransitionRecord::sink());
        let mut engine = engine_with(graph, VisitLimits::new());

        let first = engine.run().unwrap();
        assert_eq!(first.state_name, "NEXT");
        assert!(first.is_yielded);
        assert!(!called.load(Ordering::SeqCst));

        let second = engine.run().unwrap();
        assert_eq!(second.state_name, TERMINAL_STATE);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn ceiling_exhaustion_force_terminates() {
        let graph = TransitionGraph::new()
            .insert(INITIAL_STATE,
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-START", "ABORT", true))
            .insert("LOOP-START",
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-END", "X", true))
            .insert("LOOP-END",
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-START", "X", true))
            .insert(TERMINAL_STATE, TransitionRecord::sink());
        let limits = VisitLimits::new().with(crate::constants::DEFAULT, 1);
        let mut engine = engine_with(graph, limits);
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.state_name, TERMINAL_STATE);
        assert!(outcome.is_terminal);
        let history = engine.store_mut().get_db_history().unwrap();
        let terminal = history.iter().find(|e| e.name == TERMINAL_STATE).unwrap();
        assert_eq!(terminal.errors[0].error, crate::constants::MAX_RETRY_ERROR);
    }

    #[test]
    fn deep_loop_without_ceiling_completes_in_one_run_call() {
        let graph = TransitionGraph::new()
            .insert(INITIAL_STATE,
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-START", "ABORT", true))
            .insert("LOOP-START",
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-END", "X", true))
            .insert("LOOP-END",
                    TransitionRecord::transition(|_p: Value| ActionReturn::from(true), "LOOP-START", "X", true))
            .insert(TERMINAL_STATE, TransitionRecord::sink());
        let limits = VisitLimits::new().with(crate::constants::DEFAULT, 2000);
        let mut engine = engine_with(graph, limits);
        let outcome = engine.run().unwrap();
        assert_eq!(outcome.state_name, TERMINAL_STATE);
        // The walk (sum of visit counts across the looped states) must run
        // to thousands of steps within this single `run` call without
        // growing the stack; distinct StateEntry rows stay bounded by the
        // invariant of at most one per (runId, name).
        let total_visits: u32 = engine.store_mut()
                                       .get_db_history()
                                       .unwrap()
                                       .iter()
                                       .filter(|e| e.name == "LOOP-START" || e.name == "LOOP-END")
                                       .map(|e| e.visit_count)
                                       .sum();
        assert!(total_visits >= 2000);
    }
}
