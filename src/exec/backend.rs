// src/exec/backend.rs

//! Pluggable agent backend abstraction.
//!
//! The runtime talks to an `AgentBackend` instead of calling agents directly.
//! This makes it easy to swap in a fake backend in tests.
//!
//! - `BlockingAgentBackend` is the production implementation. Every cycle
//!   runs on Tokio's blocking pool because all host calls block, and its end
//!   is reported back as `RuntimeEvent::CycleCompleted`.
//! - Tests can provide their own `AgentBackend` that records which cycles
//!   were started and emits completions directly.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::engine::{AgentName, RuntimeEvent};
use crate::errors::{McProdError, Result};

use super::agent::Agent;

/// Trait abstracting how agent cycles are executed.
pub trait AgentBackend: Send {
    /// Start one cycle of `agent`. Completion is reported asynchronously
    /// through the runtime channel; the returned future only covers dispatch.
    fn run_cycle(
        &mut self,
        agent: AgentName,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

type SharedAgent = Arc<Mutex<Box<dyn Agent>>>;

/// Runs agents on the blocking thread pool.
pub struct BlockingAgentBackend {
    agents: BTreeMap<AgentName, SharedAgent>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl BlockingAgentBackend {
    pub fn new(agents: Vec<Box<dyn Agent>>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let agents = agents
            .into_iter()
            .map(|a| (a.name().to_string(), Arc::new(Mutex::new(a))))
            .collect();
        Self { agents, runtime_tx }
    }

    pub fn agent_names(&self) -> Vec<AgentName> {
        self.agents.keys().cloned().collect()
    }
}

impl AgentBackend for BlockingAgentBackend {
    fn run_cycle(
        &mut self,
        agent: AgentName,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let handle = self.agents.get(&agent).cloned();
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            let handle = handle.ok_or_else(|| {
                McProdError::ConfigError(format!("no agent named '{agent}'"))
            })?;

            tokio::spawn(async move {
                let name = agent.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let mut guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
                    guard.execute()
                })
                .await;

                let ok = match joined {
                    Ok(Ok(summary)) => {
                        info!(
                            agent = %name,
                            examined = summary.examined,
                            changed = summary.changed,
                            notifications = summary.notifications,
                            "cycle finished"
                        );
                        true
                    }
                    Ok(Err(e)) => {
                        error!(agent = %name, error = %e, "cycle failed");
                        false
                    }
                    Err(e) => {
                        error!(agent = %name, error = %e, "cycle panicked");
                        false
                    }
                };

                if tx
                    .send(RuntimeEvent::CycleCompleted { agent: name, ok })
                    .await
                    .is_err()
                {
                    warn!("runtime channel closed before cycle completion was delivered");
                }
            });

            Ok(())
        })
    }
}
