//! Ejemplo end-to-end: un grafo de tres estados corrido en memoria, y
//! opcionalmente contra Postgres con `--features pg_demo`.

use fsm_core::constants::{INITIAL_STATE, TERMINAL_STATE};
use fsm_core::result_adapter::ActionReturn;
use fsm_core::{Engine, InMemoryStateStore, StateStore, TransitionGraph, TransitionRecord, VisitLimits};
use serde_json::Value;

fn sample_graph() -> TransitionGraph {
    TransitionGraph::new()
        .insert(INITIAL_STATE,
                TransitionRecord::transition(|_p: Value| {
                                                  println!("fetching...");
                                                  ActionReturn::from((true, None, serde_json::json!({"fetched": true})))
                                              },
                                              "PROCESS",
                                              "ABORT",
                                              true))
        .insert("PROCESS",
                TransitionRecord::transition(|p: Value| {
                                                  println!("processing {p}");
                                                  ActionReturn::from((true, None, p))
                                              },
                                              TERMINAL_STATE,
                                              "ABORT",
                                              true))
        .insert("ABORT", TransitionRecord::sink())
        .insert(TERMINAL_STATE, TransitionRecord::sink())
}

fn run_in_memory() {
    let store = InMemoryStateStore::new("demo-tenant");
    let mut engine = Engine::new(store, sample_graph(), VisitLimits::new());
    let outcome = engine.run().expect("run completes");
    println!("run {} ended at {}", outcome.run_id, outcome.state_name);
    for entry in engine.store_mut().get_db_history().expect("history readable") {
        println!("  {} visit_count={}", entry.name, entry.visit_count);
    }
}

#[cfg(feature = "pg_demo")]
fn run_postgres() {
    let (pool, tenant_id) = fsm_storage_postgres::build_dev_pool_from_env().expect("build postgres pool");
    let provider = fsm_storage_postgres::PoolProvider { pool };
    let store = fsm_storage_postgres::PgStateStore::new(provider, tenant_id);
    let mut engine = Engine::new(store, sample_graph(), VisitLimits::new());
    let outcome = engine.run().expect("run completes");
    println!("run {} ended at {}", outcome.run_id, outcome.state_name);
}

fn main() {
    env_logger::init();
    run_in_memory();

    #[cfg(feature = "pg_demo")]
    run_postgres();
}
