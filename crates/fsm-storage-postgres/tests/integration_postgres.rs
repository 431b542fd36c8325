use fsm_core::{Engine, StateStore, TransitionGraph, TransitionRecord, VisitLimits};
use fsm_core::constants::{INITIAL_STATE, TERMINAL_STATE};
use fsm_core::result_adapter::ActionReturn;
use fsm_storage_postgres::{build_pool, PgStateStore, PoolProvider};
use serde_json::Value;

#[test]
fn single_successful_transition_persists_through_postgres() {
    let db_url = std::env::var("DATABASE_URL").unwrap_or_default();
    if db_url.is_empty() {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return;
    }

    let pool = build_pool(&db_url, 1, 4).expect("build pool and run migrations");
    let provider = PoolProvider { pool };
    let tenant_id = format!("it-{}", uuid::Uuid::new_v4());
    let store = PgStateStore::new(provider, tenant_id);

    let graph = TransitionGraph::new()
        .insert(INITIAL_STATE,
                TransitionRecord::transition(|_p: Value| ActionReturn::from((true, None, serde_json::json!({"val": 1}))),
                                              TERMINAL_STATE,
                                              "ABORT",
                                              true))
        .insert(TERMINAL_STATE, TransitionRecord::sink());

    let mut engine = Engine::new(store, graph, VisitLimits::new());
    let outcome = engine.run().expect("run succeeds against postgres");
    assert_eq!(outcome.state_name, TERMINAL_STATE);

    let history = engine.store_mut().get_db_history().expect("history readable");
    let names: Vec<&str> = history.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec![INITIAL_STATE, TERMINAL_STATE]);
    assert_eq!(history.last().unwrap().params, serde_json::json!({"val": 1}));
}

#[test]
fn conformance_suite_passes_against_postgres() {
    let db_url = std::env::var("DATABASE_URL").unwrap_or_default();
    if db_url.is_empty() {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return;
    }
    let pool = build_pool(&db_url, 1, 4).expect("build pool and run migrations");
    fsm_core::conformance::run_conformance_suite(|| {
        let provider = PoolProvider { pool: pool.clone() };
        PgStateStore::new(provider, format!("it-{}", uuid::Uuid::new_v4()))
    });
}
