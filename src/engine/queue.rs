// src/engine/queue.rs

//! Overrun handling: cycles that come due while the agent is still busy.

use std::collections::BTreeSet;

use tracing::debug;

use crate::engine::AgentName;
use crate::types::OverrunPolicy;

/// Remembers at most one pending cycle per agent.
///
/// With [`OverrunPolicy::Skip`] overrunning ticks are dropped; with
/// [`OverrunPolicy::Queue`] one extra cycle runs right after the current one
/// completes, however many ticks arrived in between.
#[derive(Debug, Clone)]
pub struct OverrunQueue {
    policy: OverrunPolicy,
    pending: BTreeSet<AgentName>,
}

impl OverrunQueue {
    pub fn new(policy: OverrunPolicy) -> Self {
        Self {
            policy,
            pending: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> OverrunPolicy {
        self.policy
    }

    /// Record a tick that arrived while `agent` was busy.
    pub fn record_overrun(&mut self, agent: &str) {
        match self.policy {
            OverrunPolicy::Skip => {
                debug!(agent, "cycle still running; skipping tick");
            }
            OverrunPolicy::Queue => {
                if self.pending.insert(agent.to_string()) {
                    debug!(agent, "cycle still running; queued one more");
                }
            }
        }
    }

    /// Take the pending cycle for `agent`, if any.
    pub fn take(&mut self, agent: &str) -> bool {
        self.pending.remove(agent)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_drops_overruns() {
        let mut q = OverrunQueue::new(OverrunPolicy::Skip);
        q.record_overrun("DataRecovery");
        assert!(q.is_empty());
        assert!(!q.take("DataRecovery"));
    }

    #[test]
    fn queue_keeps_a_single_pending_cycle() {
        let mut q = OverrunQueue::new(OverrunPolicy::Queue);
        q.record_overrun("DataRecovery");
        q.record_overrun("DataRecovery");
        assert!(q.take("DataRecovery"));
        assert!(!q.take("DataRecovery"));
    }
}
