use fsm_core::conformance::run_conformance_suite;
use fsm_core::InMemoryStateStore;

#[test]
fn conformance_suite_passes_against_in_memory_store() {
    run_conformance_suite(|| InMemoryStateStore::new("conformance-tenant"));
}
