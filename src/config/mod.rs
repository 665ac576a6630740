// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed raw model and the validated sections (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate per-agent settings and parse durations (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{
    AgentSection, ConfigFile, FileStatusSection, MonitorSection, RawConfigFile, RecoverySection,
};
pub use validate::parse_duration;
