// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `mcprod`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mcprod",
    version,
    about = "Recovery, file status and component monitoring agents for MC production.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, value_name = "PATH", default_value = "mcprod.toml")]
    pub config: PathBuf,

    /// World snapshot (TOML) loaded into the in-memory host.
    #[arg(long, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// Agent to run; repeat for several. Default: all of them.
    #[arg(long = "agent", value_enum, value_name = "AGENT")]
    pub agents: Vec<AgentKind>,

    /// Run one cycle of every selected agent, then exit.
    #[arg(long)]
    pub once: bool,

    /// Execute mutations instead of only logging them.
    #[arg(long)]
    pub enable: bool,

    /// Validate and print the configuration, then exit.
    #[arg(long)]
    pub check: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MCPROD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    /// Selected agents, all of them when none was named.
    pub fn selected_agents(&self) -> Vec<AgentKind> {
        if self.agents.is_empty() {
            return AgentKind::value_variants().to_vec();
        }
        let mut kinds = self.agents.clone();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum AgentKind {
    Recovery,
    FileStatus,
    Monitor,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_agents_by_default() {
        let args = CliArgs::parse_from(["mcprod", "--once"]);
        assert!(args.once);
        assert!(!args.enable);
        assert_eq!(
            args.selected_agents(),
            vec![AgentKind::Recovery, AgentKind::FileStatus, AgentKind::Monitor]
        );
    }

    #[test]
    fn repeated_agent_flag() {
        let args = CliArgs::parse_from([
            "mcprod",
            "--agent",
            "monitor",
            "--agent",
            "file-status",
            "--agent",
            "monitor",
        ]);
        assert_eq!(
            args.selected_agents(),
            vec![AgentKind::FileStatus, AgentKind::Monitor]
        );
    }
}
