// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::AgentBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives agent cycles in response to `RuntimeEvent`s and delegates the
/// cycles themselves to an `AgentBackend`.
///
/// All scheduling semantics live in `CoreRuntime`; this struct only reads
/// events from the channel and executes the resulting commands.
pub struct Runtime<B: AgentBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
}

impl<B: AgentBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: AgentBackend> Runtime<B> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, backend: B) -> Self {
        Self {
            core,
            event_rx,
            backend,
        }
    }

    /// Main event loop. Returns when the core requests exit or every sender
    /// is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("mcprod runtime started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                return Ok(());
            }
        }

        info!("runtime event channel closed; exiting");
        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::RunCycle(agent) => {
                debug!(%agent, "dispatching cycle");
                self.backend.run_cycle(agent).await
            }
            CoreCommand::RequestExit => {
                info!("core issued RequestExit command");
                Ok(())
            }
        }
    }
}
