// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::engine::queue::OverrunQueue;
use crate::engine::{AgentName, RuntimeOptions};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start one cycle of this agent.
    RunCycle(AgentName),
    /// Request that the process exits (after `--once`, or on shutdown once
    /// nothing is in flight).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn exit() -> Self {
        Self {
            commands: vec![CoreCommand::RequestExit],
            keep_running: false,
        }
    }
}

/// Scheduling state of one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentState {
    pub in_flight: bool,
    pub completed: u64,
    pub failed: u64,
}

pub type AgentTable = BTreeMap<AgentName, AgentState>;

fn any_in_flight(agents: &AgentTable) -> bool {
    agents.values().any(|s| s.in_flight)
}

/// Handle a polling tick.
///
/// - Unknown agents are ignored.
/// - While shutting down no new cycle starts.
/// - A busy agent defers to the overrun policy.
/// - In `--once` mode an agent runs exactly one cycle.
pub fn handle_cycle_due(
    agents: &mut AgentTable,
    queue: &mut OverrunQueue,
    options: &RuntimeOptions,
    shutting_down: bool,
    agent: AgentName,
) -> CoreStep {
    let Some(state) = agents.get_mut(&agent) else {
        warn!(%agent, "cycle due for unknown agent; ignoring");
        return CoreStep::running(Vec::new());
    };

    if shutting_down {
        debug!(%agent, "shutting down; not starting cycle");
        return CoreStep::running(Vec::new());
    }

    if state.in_flight {
        queue.record_overrun(&agent);
        return CoreStep::running(Vec::new());
    }

    if options.exit_after_one_cycle && state.completed + state.failed > 0 {
        return CoreStep::running(Vec::new());
    }

    state.in_flight = true;
    CoreStep::running(vec![CoreCommand::RunCycle(agent)])
}

/// Handle the end of an agent cycle.
pub fn handle_cycle_completed(
    agents: &mut AgentTable,
    queue: &mut OverrunQueue,
    options: &RuntimeOptions,
    shutting_down: bool,
    agent: AgentName,
    ok: bool,
) -> CoreStep {
    let Some(state) = agents.get_mut(&agent) else {
        warn!(%agent, "completion for unknown agent; ignoring");
        return CoreStep::running(Vec::new());
    };

    state.in_flight = false;
    if ok {
        state.completed += 1;
    } else {
        state.failed += 1;
    }

    if shutting_down {
        queue.clear();
        if any_in_flight(agents) {
            return CoreStep::running(Vec::new());
        }
        info!("last in-flight cycle finished; exiting");
        return CoreStep::exit();
    }

    if options.exit_after_one_cycle {
        let all_done = agents
            .values()
            .all(|s| !s.in_flight && s.completed + s.failed > 0);
        if all_done {
            info!("every agent completed one cycle; exiting");
            return CoreStep::exit();
        }
        return CoreStep::running(Vec::new());
    }

    if queue.take(&agent) {
        if let Some(state) = agents.get_mut(&agent) {
            state.in_flight = true;
        }
        debug!(%agent, "starting queued cycle");
        return CoreStep::running(vec![CoreCommand::RunCycle(agent)]);
    }

    CoreStep::running(Vec::new())
}

/// Handle a shutdown request: exit now if nothing runs, otherwise wait for
/// the in-flight cycles to report back.
pub fn handle_shutdown(agents: &AgentTable, queue: &mut OverrunQueue) -> CoreStep {
    queue.clear();
    if any_in_flight(agents) {
        let busy: Vec<&str> = agents
            .iter()
            .filter(|(_, s)| s.in_flight)
            .map(|(name, _)| name.as_str())
            .collect();
        info!(?busy, "shutdown requested; waiting for running cycles");
        return CoreStep::running(Vec::new());
    }
    CoreStep::exit()
}
