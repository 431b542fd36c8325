//! fsm-cli: single-invocation driver for the FSM engine.
//!
//! Builds a small demonstration graph, selects a storage backend from
//! `--backend` (or the `FSM_BACKEND` env var), calls the engine once, and
//! prints the run id, the resulting state, and the persisted history. This
//! mirrors the external-driver role the engine assumes throughout: it is
//! the caller's job to decide when and how often to invoke `run`.

use clap::Parser;
use fsm_core::constants::{INITIAL_STATE, TERMINAL_STATE};
use fsm_core::result_adapter::ActionReturn;
use fsm_core::{Engine, StateStore, TransitionGraph, TransitionRecord, VisitLimits};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "fsm-cli", about = "Drive one step of the demonstration FSM graph")]
struct Cli {
    /// Which StateStore backend to use.
    #[arg(long, default_value = "memory")]
    backend: String,

    /// Tenant partition to run under.
    #[arg(long, default_value = "default")]
    tenant: String,
}

fn demo_graph() -> TransitionGraph {
    TransitionGraph::new()
        .insert(INITIAL_STATE,
                TransitionRecord::transition(|_p: Value| {
                                                  ActionReturn::from((true, None, serde_json::json!({"fetched": true})))
                                              },
                                              "PROCESS",
                                              "ABORT",
                                              true))
        .insert("PROCESS",
                TransitionRecord::transition(|p: Value| ActionReturn::from((true, None, p)), TERMINAL_STATE, "ABORT", false))
        .insert("ABORT", TransitionRecord::sink())
        .insert(TERMINAL_STATE, TransitionRecord::sink())
}

fn print_outcome<S: StateStore>(store: &mut S, outcome: &fsm_core::RunOutcome) {
    println!("run_id: {}", outcome.run_id);
    println!("state: {} (terminal={}, yielded={})", outcome.state_name, outcome.is_terminal, outcome.is_yielded);
    match store.get_db_history() {
        Ok(history) => {
            println!("history:");
            for entry in history {
                println!("  {} visit_count={} params={}", entry.name, entry.visit_count, entry.params);
            }
        }
        Err(e) => eprintln!("could not read history: {e}"),
    }
}

fn main() {
    env_logger::init();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let limits = VisitLimits::new();

    match cli.backend.as_str() {
        "memory" => {
            let store = fsm_core::InMemoryStateStore::new(cli.tenant.clone());
            let mut engine = Engine::new(store, demo_graph(), limits);
            match engine.run() {
                Ok(outcome) => print_outcome(engine.store_mut(), &outcome),
                Err(e) => {
                    eprintln!("run failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let (pool, tenant_id) = fsm_storage_postgres::build_dev_pool_from_env().expect("build postgres pool");
            let provider = fsm_storage_postgres::PoolProvider { pool };
            let store = fsm_storage_postgres::PgStateStore::new(provider, tenant_id);
            let mut engine = Engine::new(store, demo_graph(), limits);
            match engine.run() {
                Ok(outcome) => print_outcome(engine.store_mut(), &outcome),
                Err(e) => {
                    eprintln!("run failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        #[cfg(feature = "mongo")]
        "mongo" => {
            let cfg = fsm_storage_mongo::MongoConfig::from_env();
            let store = fsm_storage_mongo::MongoStateStore::connect(&cfg).expect("connect to mongo");
            let mut engine = Engine::new(store, demo_graph(), limits);
            match engine.run() {
                Ok(outcome) => print_outcome(engine.store_mut(), &outcome),
                Err(e) => {
                    eprintln!("run failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        other => {
            eprintln!("unknown or unbuilt backend: {other}");
            std::process::exit(1);
        }
    }
}
