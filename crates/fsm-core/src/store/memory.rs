//! Volatile reference implementation of `StateStore`.
//!
//! Useful for tests, for running the engine ephemerally, and as the
//! oracle the conformance suite compares concrete backends against. Not
//! synchronized: wrap in a `Mutex` for cross-thread use.

use std::collections::HashMap;
use std::convert::Infallible;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{RunId, StateEntry, StateError, StateStore};
use crate::constants::{INITIAL_STATE, MAX_RETRY_ERROR, TERMINAL_STATE};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    tenant_id: String,
    entries: HashMap<(RunId, String), StateEntry>,
    insertion_order: Vec<(RunId, String)>,
    next_id: i64,
    pointer: Option<(RunId, String)>,
}

impl InMemoryStateStore {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into(),
               entries: HashMap::new(),
               insertion_order: Vec::new(),
               next_id: 1,
               pointer: None }
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn upsert(&mut self, mut entry: StateEntry) -> StateEntry {
        let key = (entry.run_id.clone(), entry.name.clone());
        if let Some(existing) = self.entries.get(&key) {
            entry.id = existing.id.clone();
        } else {
            entry.id = Some(self.allocate_id().to_string());
            self.insertion_order.push(key.clone());
        }
        self.entries.insert(key.clone(), entry.clone());
        self.pointer = Some(key);
        entry
    }
}

impl StateStore for InMemoryStateStore {
    type Error = Infallible;

    fn get_last_state(&mut self) -> Result<Option<StateEntry>, Self::Error> {
        Ok(self.pointer.as_ref().and_then(|key| self.entries.get(key).cloned()))
    }

    fn new_initial_state(&mut self) -> Result<StateEntry, Self::Error> {
        let now = Utc::now();
        Ok(StateEntry { id: None,
                         tenant_id: self.tenant_id.clone(),
                         run_id: Uuid::new_v4().to_string(),
                         name: INITIAL_STATE.to_string(),
                         start_time: now,
                         end_time: now,
                         params: Value::Object(Default::default()),
                         visit_count: 1,
                         errors: Vec::new(),
                         yielded: false })
    }

    fn save_state(&mut self, entry: &mut StateEntry) -> Result<(), Self::Error> {
        let saved = self.upsert(entry.clone());
        *entry = saved;
        Ok(())
    }

    fn yield_state(&mut self, entry: &mut StateEntry, is_yielded: bool) -> Result<(), Self::Error> {
        entry.yielded = is_yielded;
        let key = (entry.run_id.clone(), entry.name.clone());
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.yielded = is_yielded;
        }
        Ok(())
    }

    fn find_state(&mut self, state_name: &str, run_id: &str) -> Result<Option<StateEntry>, Self::Error> {
        Ok(self.entries.get(&(run_id.to_string(), state_name.to_string())).cloned())
    }

    fn set_current_state(&mut self,
                          state_name: &str,
                          run_id: &str,
                          err: Option<&str>,
                          params: Value,
                          start_time: DateTime<Utc>,
                          end_time: DateTime<Utc>)
                          -> Result<(), Self::Error> {
        let key = (run_id.to_string(), state_name.to_string());
        let entry = if let Some(existing) = self.entries.get(&key) {
            let mut next = existing.clone();
            if let Some(e) = err {
                let visit_idx = next.visit_count + 1;
                next.errors.push(StateError { error: e.to_string(), visit_idx });
            }
            next.params = params;
            next.start_time = start_time;
            next.end_time = end_time;
            next.visit_count += 1;
            next
        } else {
            StateEntry { id: None,
                         tenant_id: self.tenant_id.clone(),
                         run_id: run_id.to_string(),
                         name: state_name.to_string(),
                         start_time,
                         end_time,
                         params,
                         visit_count: 1,
                         errors: err.map(|e| vec![StateError { error: e.to_string(), visit_idx: 1 }])
                                    .unwrap_or_default(),
                         yielded: false }
        };
        self.upsert(entry);
        Ok(())
    }

    fn terminate(&mut self, run_id: &str) -> Result<(), Self::Error> {
        let now = Utc::now();
        let entry = StateEntry { id: None,
                                  tenant_id: self.tenant_id.clone(),
                                  run_id: run_id.to_string(),
                                  name: TERMINAL_STATE.to_string(),
                                  start_time: now,
                                  end_time: now,
                                  params: Value::Object(Default::default()),
                                  visit_count: 1,
                                  errors: vec![StateError { error: MAX_RETRY_ERROR.to_string(), visit_idx: 1 }],
                                  yielded: false };
        self.upsert(entry);
        Ok(())
    }

    fn get_db_history(&mut self) -> Result<Vec<StateEntry>, Self::Error> {
        Ok(self.insertion_order.iter().filter_map(|k| self.entries.get(k).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_has_no_last_state() {
        let mut store = InMemoryStateStore::new("t1");
        assert!(store.get_last_state().unwrap().is_none());
    }

    #[test]
    fn set_current_state_increments_visit_count_on_reentry() {
        let mut store = InMemoryStateStore::new("t1");
        let now = Utc::now();
        store.set_current_state("A", "run-1", None, Value::Null, now, now).unwrap();
        store.set_current_state("A", "run-1", Some("boom"), Value::Null, now, now).unwrap();
        let entry = store.find_state("A", "run-1").unwrap().unwrap();
        assert_eq!(entry.visit_count, 2);
        assert_eq!(entry.errors, vec![StateError { error: "boom".to_string(), visit_idx: 2 }]);
    }

    #[test]
    fn get_db_history_preserves_insertion_order() {
        let mut store = InMemoryStateStore::new("t1");
        let now = Utc::now();
        store.set_current_state("A", "run-1", None, Value::Null, now, now).unwrap();
        store.set_current_state("B", "run-1", None, Value::Null, now, now).unwrap();
        store.set_current_state("A", "run-1", None, Value::Null, now, now).unwrap();
        let names: Vec<String> = store.get_db_history().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
