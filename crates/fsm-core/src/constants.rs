//! Reserved names in the state-name and visit-limit namespaces.
//!
//! These are plain string constants rather than an enum because graphs are
//! supplied as data (§1 Non-goals: no DSL), and state names coming from a
//! config file or a database column need to compare equal to these without
//! a parsing step.

/// Entry point every graph must define.
pub const INITIAL_STATE: &str = "INITIAL_STATE";

/// Marks run completion. Conventionally mapped to a sink transition record.
pub const TERMINAL_STATE: &str = "TERMINAL_STATE";

/// Reserved key in the visit-limits mapping, not a state name.
pub const DEFAULT: &str = "DEFAULT";

/// Error message recorded on a forced-termination `TERMINAL_STATE` entry.
pub const MAX_RETRY_ERROR: &str = "Max retry count reached";
