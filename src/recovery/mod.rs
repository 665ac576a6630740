// src/recovery/mod.rs

//! Data recovery: drive every job/input/output triple of the active
//! transformations to a consistent state.
//!
//! - [`rules`]: the two decision tables as data.
//! - [`engine`]: the periodic agent running them.
//! - [`report`]: per-transformation counters and the notification text.
//! - [`retry`]: bounded per-job retry policy.

pub mod engine;
pub mod report;
pub mod retry;
pub mod rules;

pub use engine::DataRecoveryAgent;
pub use report::TransformationReport;
pub use retry::RetryPolicy;
pub use rules::{Action, Predicate, Rule, RuleEnv, GENERATION, INPUT_CONSUMING};
