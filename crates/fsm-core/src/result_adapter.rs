//! Normalizes whatever a transition action returns into a single shape the
//! scheduler loop can act on, and catches panics so a misbehaving action
//! degrades into a failed visit instead of taking the whole run down.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

/// The normalized result of running one transition action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub params: Value,
}

impl ActionOutcome {
    fn ok(params: Value) -> Self {
        Self { success: true, error: None, params }
    }

    fn failed(error: impl Into<String>, params: Value) -> Self {
        Self { success: false, error: Some(error.into()), params }
    }
}

/// What an action hands back. The three variants mirror the leniency the
/// original Python actions relied on (a plain bool, a `(bool, err, params)`
/// triple, or a bare params mapping meaning "succeeded").
pub enum ActionReturn {
    Flag(bool),
    Full { success: bool, error: Option<String>, params: Value },
    Params(Value),
}

impl From<bool> for ActionReturn {
    fn from(flag: bool) -> Self {
        ActionReturn::Flag(flag)
    }
}

impl From<Value> for ActionReturn {
    fn from(params: Value) -> Self {
        ActionReturn::Params(params)
    }
}

impl From<(bool, Option<String>, Value)> for ActionReturn {
    fn from((success, error, params): (bool, Option<String>, Value)) -> Self {
        ActionReturn::Full { success, error, params }
    }
}

fn normalize(ret: ActionReturn) -> ActionOutcome {
    match ret {
        ActionReturn::Flag(b) => ActionOutcome { success: b, error: None, params: Value::Object(Default::default()) },
        ActionReturn::Params(Value::Null) => ActionOutcome::ok(Value::Object(Default::default())),
        ActionReturn::Params(params) => ActionOutcome::ok(params),
        ActionReturn::Full { success: true, params, .. } => ActionOutcome::ok(params),
        ActionReturn::Full { success: false, error, params } => {
            ActionOutcome::failed(error.unwrap_or_else(|| "action returned false".to_string()), params)
        }
    }
}

/// A transition action: arbitrary work keyed to leaving a state, parameterized
/// by whatever the previous entry's `params` held.
pub trait TransitionAction: Fn(Value) -> ActionReturn {}

impl<F> TransitionAction for F where F: Fn(Value) -> ActionReturn {}

/// Runs `action`, catching any panic and folding it into a failed outcome
/// exactly as a returned `false` would be.
pub fn invoke_action<F>(action: &F, params: Value) -> ActionOutcome
    where F: Fn(Value) -> ActionReturn
{
    let captured = params.clone();
    match catch_unwind(AssertUnwindSafe(|| action(captured))) {
        Ok(ret) => normalize(ret),
        Err(panic) => {
            let message = panic.downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| panic.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "action panicked".to_string());
            ActionOutcome::failed(message, Value::Object(Default::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_true_succeeds_with_empty_object_params_and_no_error() {
        let outcome = invoke_action(&|_p| ActionReturn::Flag(true), Value::Null);
        assert!(outcome.success);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.params, serde_json::json!({}));
    }

    #[test]
    fn bare_false_fails_with_empty_object_params_and_no_error() {
        let outcome = invoke_action(&|_p| ActionReturn::Flag(false), Value::Null);
        assert!(!outcome.success);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.params, serde_json::json!({}));
    }

    #[test]
    fn params_only_return_is_treated_as_success() {
        let outcome = invoke_action(&|_p| ActionReturn::Params(serde_json::json!({"x": 1})),
                                     Value::Null);
        assert!(outcome.success);
        assert_eq!(outcome.params, serde_json::json!({"x": 1}));
    }

    #[test]
    fn panic_is_caught_and_becomes_a_failure_with_empty_object_params() {
        let outcome = invoke_action(&|_p| -> ActionReturn { panic!("kaboom") },
                                     serde_json::json!({"stale": true}));
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("kaboom"));
        assert_eq!(outcome.params, serde_json::json!({}));
    }

    #[test]
    fn bare_null_params_return_normalizes_to_empty_object() {
        let outcome = invoke_action(&|_p| ActionReturn::Params(Value::Null), Value::Null);
        assert!(outcome.success);
        assert_eq!(outcome.params, serde_json::json!({}));
    }

    #[test]
    fn full_triple_carries_through_error_and_params() {
        let outcome = invoke_action(&|_p| {
                                        (false, Some("nope".to_string()), serde_json::json!({"retry": true})).into()
                                    },
                                    Value::Null);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("nope"));
        assert_eq!(outcome.params, serde_json::json!({"retry": true}));
    }
}
