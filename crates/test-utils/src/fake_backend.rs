use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use mcprod::engine::{AgentName, RuntimeEvent};
use mcprod::exec::AgentBackend;
use mcprod::errors::{McProdError, Result};

/// A fake backend that:
/// - records which agent cycles were started
/// - immediately reports `CycleCompleted` for each of them.
///
/// Agents listed in `failing` complete with `ok = false`.
pub struct FakeBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: Vec<String>,
}

impl FakeBackend {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: Vec::new(),
        }
    }

    pub fn failing(mut self, agent: &str) -> Self {
        self.failing.push(agent.to_string());
        self
    }
}

impl AgentBackend for FakeBackend {
    fn run_cycle(
        &mut self,
        agent: AgentName,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let ok = !self.failing.contains(&agent);

        Box::pin(async move {
            {
                let mut guard = executed.lock().unwrap();
                guard.push(agent.clone());
            }

            tx.send(RuntimeEvent::CycleCompleted { agent, ok })
                .await
                .map_err(|e| McProdError::Other(anyhow::Error::from(e)))?;
            Ok(())
        })
    }
}
