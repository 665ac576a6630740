// src/exec/agent.rs

use std::fmt::Debug;

use crate::errors::Result;

/// What one agent cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Transformations or components looked at.
    pub examined: usize,
    /// Of those, how many were changed (or would have been, in dry run).
    pub changed: usize,
    pub notifications: usize,
}

/// A periodically executed agent.
///
/// `execute` runs one full cycle synchronously; all host calls inside are
/// blocking. The runtime guarantees at most one cycle per agent in flight.
pub trait Agent: Send + Debug {
    fn name(&self) -> &str;

    fn execute(&mut self) -> Result<CycleSummary>;
}
