// src/config/model.rs

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::recovery::retry::RetryPolicy;
use crate::types::{
    FileStatus, JobStatus, OverrunPolicy, TransId, TransformationStatus, TransformationType,
};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [agent]
/// enabled = false
/// mail_to = ["prod-ops@example.org"]
/// overrun = "skip"
///
/// [recovery]
/// polling_time = "1h"
/// transformations_to_ignore = [1234]
///
/// [file_status]
/// file_statuses = ["Assigned", "Problematic"]
///
/// [monitor]
/// host = "voilcdirac01.example.org"
/// commit_urls = true
/// ```
///
/// All sections are optional and every field has a default. Duration fields
/// stay strings here; validation turns them into [`Duration`]s.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub agent: RawAgentSection,
    #[serde(default)]
    pub recovery: RawRecoverySection,
    #[serde(default)]
    pub file_status: RawFileStatusSection,
    #[serde(default)]
    pub monitor: RawMonitorSection,
}

/// `[agent]`: settings shared by every agent of the process.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAgentSection {
    /// When false, mutations are only logged.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mail_to: Vec<String>,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
    /// What to do when a cycle comes due while the previous one still runs.
    #[serde(default)]
    pub overrun: OverrunPolicy,
}

impl Default for RawAgentSection {
    fn default() -> Self {
        Self {
            enabled: false,
            mail_to: Vec::new(),
            mail_from: default_mail_from(),
            overrun: OverrunPolicy::default(),
        }
    }
}

/// `[recovery]`
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecoverySection {
    #[serde(default = "default_recovery_polling")]
    pub polling_time: String,
    #[serde(default = "default_recovery_types")]
    pub transformation_types: Vec<TransformationType>,
    #[serde(default = "default_transformation_statuses")]
    pub transformation_statuses: Vec<TransformationStatus>,
    #[serde(default)]
    pub transformations_to_ignore: Vec<TransId>,
    #[serde(default = "default_job_statuses")]
    pub job_statuses: Vec<JobStatus>,
    /// Inputs failing more often than this are set `MaxReset`.
    #[serde(default = "default_max_reset_counter")]
    pub max_reset_counter: u32,
    /// Progress is logged every N jobs; 0 disables it.
    #[serde(default = "default_print_every_n_jobs")]
    pub print_every_n_jobs: usize,
    /// Identity assumed to delete outputs.
    #[serde(default = "default_shifter_role")]
    pub shifter_role: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: Vec<String>,
}

impl Default for RawRecoverySection {
    fn default() -> Self {
        Self {
            polling_time: default_recovery_polling(),
            transformation_types: default_recovery_types(),
            transformation_statuses: default_transformation_statuses(),
            transformations_to_ignore: Vec::new(),
            job_statuses: default_job_statuses(),
            max_reset_counter: default_max_reset_counter(),
            print_every_n_jobs: default_print_every_n_jobs(),
            shifter_role: default_shifter_role(),
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

/// `[file_status]`
#[derive(Debug, Clone, Deserialize)]
pub struct RawFileStatusSection {
    #[serde(default = "default_file_status_polling")]
    pub polling_time: String,
    #[serde(default = "default_transfer_types")]
    pub transformation_types: Vec<TransformationType>,
    #[serde(default = "default_transformation_statuses")]
    pub transformation_statuses: Vec<TransformationStatus>,
    /// Only files in one of these statuses are examined.
    #[serde(default = "default_file_statuses")]
    pub file_statuses: Vec<FileStatus>,
}

impl Default for RawFileStatusSection {
    fn default() -> Self {
        Self {
            polling_time: default_file_status_polling(),
            transformation_types: default_transfer_types(),
            transformation_statuses: default_transformation_statuses(),
            file_statuses: default_file_statuses(),
        }
    }
}

/// `[monitor]`
#[derive(Debug, Clone, Deserialize)]
pub struct RawMonitorSection {
    #[serde(default = "default_monitor_polling")]
    pub polling_time: String,
    /// Host whose components are monitored.
    #[serde(default = "default_host")]
    pub host: String,
    /// Directory holding one runit service directory per component.
    #[serde(default = "default_runit_dir")]
    pub runit_dir: PathBuf,
    #[serde(default = "default_true")]
    pub restart_agents: bool,
    #[serde(default = "default_true")]
    pub restart_executors: bool,
    #[serde(default = "default_true")]
    pub restart_services: bool,
    /// Write changed service URLs back to the configuration.
    #[serde(default)]
    pub commit_urls: bool,
    /// `System/Component` glob patterns never restarted.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: String,
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
}

impl Default for RawMonitorSection {
    fn default() -> Self {
        Self {
            polling_time: default_monitor_polling(),
            host: default_host(),
            runit_dir: default_runit_dir(),
            restart_agents: true,
            restart_executors: true,
            restart_services: true,
            commit_urls: false,
            ignore: Vec::new(),
            ping_timeout: default_ping_timeout(),
            kill_grace: default_kill_grace(),
        }
    }
}

fn default_mail_from() -> String {
    "mcprod@localhost".to_string()
}

fn default_recovery_polling() -> String {
    "1h".to_string()
}

fn default_file_status_polling() -> String {
    "2h".to_string()
}

fn default_monitor_polling() -> String {
    "10m".to_string()
}

fn default_recovery_types() -> Vec<TransformationType> {
    vec![
        TransformationType::McReconstruction,
        TransformationType::McSimulation,
        TransformationType::McReconstructionOverlay,
        TransformationType::McGeneration,
    ]
}

fn default_transfer_types() -> Vec<TransformationType> {
    vec![TransformationType::Replication, TransformationType::Moving]
}

fn default_transformation_statuses() -> Vec<TransformationStatus> {
    vec![TransformationStatus::Active, TransformationStatus::Completing]
}

fn default_job_statuses() -> Vec<JobStatus> {
    vec![JobStatus::Failed, JobStatus::Done]
}

fn default_file_statuses() -> Vec<FileStatus> {
    vec![FileStatus::Assigned, FileStatus::Problematic]
}

fn default_max_reset_counter() -> u32 {
    10
}

fn default_print_every_n_jobs() -> usize {
    200
}

fn default_shifter_role() -> String {
    "DataManager".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Vec<String> {
    vec!["0s".to_string(), "1s".to_string(), "3s".to_string()]
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_runit_dir() -> PathBuf {
    PathBuf::from("/opt/dirac/startup")
}

fn default_ping_timeout() -> String {
    "5s".to_string()
}

fn default_kill_grace() -> String {
    "5s".to_string()
}

fn default_true() -> bool {
    true
}

/// Validated configuration.
///
/// Constructed only through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub agent: AgentSection,
    pub recovery: RecoverySection,
    pub file_status: FileStatusSection,
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSection {
    pub enabled: bool,
    pub mail_to: Vec<String>,
    pub mail_from: String,
    pub overrun: OverrunPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySection {
    pub polling: Duration,
    pub transformation_types: Vec<TransformationType>,
    pub transformation_statuses: Vec<TransformationStatus>,
    pub transformations_to_ignore: BTreeSet<TransId>,
    pub job_statuses: Vec<JobStatus>,
    pub max_reset_counter: u32,
    pub print_every_n_jobs: usize,
    pub shifter_role: String,
    pub retry: RetryPolicy,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            polling: Duration::from_secs(3600),
            transformation_types: default_recovery_types(),
            transformation_statuses: default_transformation_statuses(),
            transformations_to_ignore: BTreeSet::new(),
            job_statuses: default_job_statuses(),
            max_reset_counter: default_max_reset_counter(),
            print_every_n_jobs: default_print_every_n_jobs(),
            shifter_role: default_shifter_role(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatusSection {
    pub polling: Duration,
    pub transformation_types: Vec<TransformationType>,
    pub transformation_statuses: Vec<TransformationStatus>,
    pub file_statuses: Vec<FileStatus>,
}

impl Default for FileStatusSection {
    fn default() -> Self {
        Self {
            polling: Duration::from_secs(2 * 3600),
            transformation_types: default_transfer_types(),
            transformation_statuses: default_transformation_statuses(),
            file_statuses: default_file_statuses(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSection {
    pub polling: Duration,
    pub host: String,
    pub runit_dir: PathBuf,
    pub restart_agents: bool,
    pub restart_executors: bool,
    pub restart_services: bool,
    pub commit_urls: bool,
    pub ignore: Vec<String>,
    pub ping_timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            polling: Duration::from_secs(600),
            host: default_host(),
            runit_dir: default_runit_dir(),
            restart_agents: true,
            restart_executors: true,
            restart_services: true,
            commit_urls: false,
            ignore: Vec::new(),
            ping_timeout: Duration::from_secs(5),
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl ConfigFile {
    /// Assemble already-validated sections.
    pub(crate) fn new_unchecked(
        agent: AgentSection,
        recovery: RecoverySection,
        file_status: FileStatusSection,
        monitor: MonitorSection,
    ) -> Self {
        Self {
            agent,
            recovery,
            file_status,
            monitor,
        }
    }
}
