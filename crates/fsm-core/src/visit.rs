//! Per-state visit ceilings and the forced-termination decision.

use std::collections::HashMap;

use crate::constants::DEFAULT;

/// `state name -> positive ceiling`, with `DEFAULT` as the fallback key.
#[derive(Debug, Clone, Default)]
pub struct VisitLimits {
    limits: HashMap<String, u32>,
}

impl VisitLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, state_name: impl Into<String>, limit: u32) -> Self {
        self.limits.insert(state_name.into(), limit);
        self
    }

    /// `limits[S]` if present, else `limits[DEFAULT]`, else 1.
    pub fn effective_limit(&self, state_name: &str) -> u32 {
        self.limits.get(state_name).copied().or_else(|| self.limits.get(DEFAULT).copied()).unwrap_or(1)
    }
}

/// Decides, given a candidate successor's current visit count (if it has
/// ever been entered), whether entering it again would exceed its ceiling.
pub struct VisitAccountant<'a> {
    limits: &'a VisitLimits,
}

impl<'a> VisitAccountant<'a> {
    pub fn new(limits: &'a VisitLimits) -> Self {
        Self { limits }
    }

    /// `existing_visit_count` is `None` when the candidate state has no
    /// `StateEntry` yet for this run (never exceeds the ceiling).
    pub fn ceiling_reached(&self, state_name: &str, existing_visit_count: Option<u32>) -> bool {
        match existing_visit_count {
            Some(count) => count >= self.limits.effective_limit(state_name),
            None => false,
        }
    }
}
