// src/engine/mod.rs

//! Agent scheduling engine.
//!
//! This module ties together:
//! - per-agent cycle state (at most one cycle in flight per agent)
//! - the overrun queue (what happens when a cycle comes due while the
//!   previous one is still running)
//! - the main runtime event loop that reacts to:
//!   - polling ticks
//!   - cycle completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

/// Canonical agent name type used throughout the engine.
pub type AgentName = String;

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit once every agent has completed one cycle (used for
    /// `--once`).
    pub exit_after_one_cycle: bool,
}

/// Events flowing into the runtime from tickers, the agent backend, etc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// The polling period of an agent elapsed.
    CycleDue { agent: AgentName },
    /// An agent cycle returned. `ok` is false when the cycle failed as a whole.
    CycleCompleted { agent: AgentName, ok: bool },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::OverrunQueue;
pub use runtime::Runtime;
pub use crate::types::OverrunPolicy;
