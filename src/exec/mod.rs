// src/exec/mod.rs

//! Agent execution layer.
//!
//! - [`agent`] defines the `Agent` trait every periodic component implements.
//! - [`backend`] provides the `AgentBackend` trait and the production
//!   `BlockingAgentBackend`, which tests can replace with a fake.
//! - [`ticker`] sends `CycleDue` events at each agent's polling period.

pub mod agent;
pub mod backend;
pub mod ticker;

pub use agent::{Agent, CycleSummary};
pub use backend::{AgentBackend, BlockingAgentBackend};
pub use ticker::spawn_ticker;
