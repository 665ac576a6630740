// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from the channel,
//! hands `RunCycle` commands to the agent backend and handles Ctrl+C.
//!
//! The core is unit tested without any Tokio, channels or host clients.

use crate::engine::event_handlers::{
    handle_cycle_completed, handle_cycle_due, handle_shutdown, AgentState, AgentTable, CoreStep,
};
use crate::engine::queue::OverrunQueue;
use crate::engine::{AgentName, RuntimeEvent, RuntimeOptions};
use crate::types::OverrunPolicy;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    agents: AgentTable,
    queue: OverrunQueue,
    options: RuntimeOptions,
    shutting_down: bool,
}

impl CoreRuntime {
    pub fn new<I>(agents: I, overrun: OverrunPolicy, options: RuntimeOptions) -> Self
    where
        I: IntoIterator<Item = AgentName>,
    {
        Self {
            agents: agents
                .into_iter()
                .map(|name| (name, AgentState::default()))
                .collect(),
            queue: OverrunQueue::new(overrun),
            options,
            shutting_down: false,
        }
    }

    pub fn agent_state(&self, agent: &str) -> Option<AgentState> {
        self.agents.get(agent).copied()
    }

    pub fn is_idle(&self) -> bool {
        self.agents.values().all(|s| !s.in_flight)
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::CycleDue { agent } => handle_cycle_due(
                &mut self.agents,
                &mut self.queue,
                &self.options,
                self.shutting_down,
                agent,
            ),
            RuntimeEvent::CycleCompleted { agent, ok } => handle_cycle_completed(
                &mut self.agents,
                &mut self.queue,
                &self.options,
                self.shutting_down,
                agent,
                ok,
            ),
            RuntimeEvent::ShutdownRequested => {
                self.shutting_down = true;
                handle_shutdown(&self.agents, &mut self.queue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CoreCommand;

    fn due(agent: &str) -> RuntimeEvent {
        RuntimeEvent::CycleDue {
            agent: agent.to_string(),
        }
    }

    fn done(agent: &str) -> RuntimeEvent {
        RuntimeEvent::CycleCompleted {
            agent: agent.to_string(),
            ok: true,
        }
    }

    fn core(policy: OverrunPolicy, once: bool) -> CoreRuntime {
        CoreRuntime::new(
            ["DataRecovery".to_string(), "Monitor".to_string()],
            policy,
            RuntimeOptions {
                exit_after_one_cycle: once,
            },
        )
    }

    fn run(agent: &str) -> Vec<CoreCommand> {
        vec![CoreCommand::RunCycle(agent.to_string())]
    }

    #[test]
    fn due_starts_a_cycle() {
        let mut c = core(OverrunPolicy::Skip, false);
        let step = c.step(due("DataRecovery"));
        assert_eq!(step.commands, run("DataRecovery"));
        assert!(step.keep_running);
        assert!(c.agent_state("DataRecovery").unwrap().in_flight);
    }

    #[test]
    fn overrun_is_skipped_by_default() {
        let mut c = core(OverrunPolicy::Skip, false);
        c.step(due("DataRecovery"));
        assert!(c.step(due("DataRecovery")).commands.is_empty());
        assert!(c.step(done("DataRecovery")).commands.is_empty());
        assert!(c.is_idle());
    }

    #[test]
    fn overrun_queues_one_more_cycle() {
        let mut c = core(OverrunPolicy::Queue, false);
        c.step(due("DataRecovery"));
        c.step(due("DataRecovery"));
        c.step(due("DataRecovery"));
        assert_eq!(c.step(done("DataRecovery")).commands, run("DataRecovery"));
        assert!(c.step(done("DataRecovery")).commands.is_empty());
        assert_eq!(c.agent_state("DataRecovery").unwrap().completed, 2);
    }

    #[test]
    fn agents_run_independently() {
        let mut c = core(OverrunPolicy::Skip, false);
        assert_eq!(c.step(due("DataRecovery")).commands, run("DataRecovery"));
        assert_eq!(c.step(due("Monitor")).commands, run("Monitor"));
    }

    #[test]
    fn unknown_agent_is_ignored() {
        let mut c = core(OverrunPolicy::Skip, false);
        let step = c.step(due("Nope"));
        assert!(step.commands.is_empty());
        assert!(step.keep_running);
    }

    #[test]
    fn once_mode_exits_after_every_agent_ran() {
        let mut c = core(OverrunPolicy::Queue, true);
        c.step(due("DataRecovery"));
        c.step(due("Monitor"));
        let step = c.step(done("DataRecovery"));
        assert!(step.keep_running);
        assert!(c.step(due("DataRecovery")).commands.is_empty());

        let step = c.step(RuntimeEvent::CycleCompleted {
            agent: "Monitor".to_string(),
            ok: false,
        });
        assert_eq!(step.commands, vec![CoreCommand::RequestExit]);
        assert!(!step.keep_running);
    }

    #[test]
    fn shutdown_waits_for_running_cycles() {
        let mut c = core(OverrunPolicy::Queue, false);
        c.step(due("DataRecovery"));
        c.step(due("DataRecovery"));

        let step = c.step(RuntimeEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert!(c.queue_is_empty());
        assert!(c.step(due("Monitor")).commands.is_empty());

        let step = c.step(done("DataRecovery"));
        assert_eq!(step.commands, vec![CoreCommand::RequestExit]);
        assert!(!step.keep_running);
    }

    #[test]
    fn shutdown_when_idle_exits_immediately() {
        let mut c = core(OverrunPolicy::Skip, false);
        let step = c.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);
    }
}
