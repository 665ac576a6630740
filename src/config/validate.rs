// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    AgentSection, ConfigFile, FileStatusSection, MonitorSection, RawAgentSection, RawConfigFile,
    RawFileStatusSection, RawMonitorSection, RawRecoverySection, RecoverySection,
};
use crate::errors::{McProdError, Result};
use crate::recovery::retry::RetryPolicy;
use crate::types::{FileStatus, TransformationType};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::McProdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        Ok(ConfigFile::new_unchecked(
            validate_agent(raw.agent)?,
            validate_recovery(raw.recovery)?,
            validate_file_status(raw.file_status)?,
            validate_monitor(raw.monitor)?,
        ))
    }
}

fn validate_agent(raw: RawAgentSection) -> Result<AgentSection> {
    if raw.mail_from.trim().is_empty() {
        return Err(McProdError::ConfigError(
            "[agent].mail_from must not be empty".to_string(),
        ));
    }
    Ok(AgentSection {
        enabled: raw.enabled,
        mail_to: raw.mail_to,
        mail_from: raw.mail_from,
        overrun: raw.overrun,
    })
}

fn validate_recovery(raw: RawRecoverySection) -> Result<RecoverySection> {
    for t in &raw.transformation_types {
        if !is_production_type(*t) {
            return Err(McProdError::ConfigError(format!(
                "[recovery].transformation_types: '{t}' is not a production transformation type"
            )));
        }
    }
    if raw.max_attempts == 0 {
        return Err(McProdError::ConfigError(
            "[recovery].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.retry_backoff.is_empty() {
        return Err(McProdError::ConfigError(
            "[recovery].retry_backoff must list at least one duration".to_string(),
        ));
    }
    let backoff = raw
        .retry_backoff
        .iter()
        .map(|s| field_duration("recovery", "retry_backoff", s))
        .collect::<Result<Vec<_>>>()?;

    Ok(RecoverySection {
        polling: field_duration("recovery", "polling_time", &raw.polling_time)?,
        transformation_types: raw.transformation_types,
        transformation_statuses: raw.transformation_statuses,
        transformations_to_ignore: raw.transformations_to_ignore.into_iter().collect(),
        job_statuses: raw.job_statuses,
        max_reset_counter: raw.max_reset_counter,
        print_every_n_jobs: raw.print_every_n_jobs,
        shifter_role: raw.shifter_role,
        retry: RetryPolicy {
            max_attempts: raw.max_attempts,
            backoff,
        },
    })
}

fn validate_file_status(raw: RawFileStatusSection) -> Result<FileStatusSection> {
    for t in &raw.transformation_types {
        if !matches!(t, TransformationType::Replication | TransformationType::Moving) {
            return Err(McProdError::ConfigError(format!(
                "[file_status].transformation_types: '{t}' is not Replication or Moving"
            )));
        }
    }
    for s in &raw.file_statuses {
        if !matches!(
            s,
            FileStatus::Assigned | FileStatus::Processed | FileStatus::Problematic | FileStatus::Unused
        ) {
            return Err(McProdError::ConfigError(format!(
                "[file_status].file_statuses: '{s}' cannot be examined"
            )));
        }
    }

    Ok(FileStatusSection {
        polling: field_duration("file_status", "polling_time", &raw.polling_time)?,
        transformation_types: raw.transformation_types,
        transformation_statuses: raw.transformation_statuses,
        file_statuses: raw.file_statuses,
    })
}

fn validate_monitor(raw: RawMonitorSection) -> Result<MonitorSection> {
    if raw.host.trim().is_empty() {
        return Err(McProdError::ConfigError(
            "[monitor].host must not be empty".to_string(),
        ));
    }
    for pattern in &raw.ignore {
        globset::Glob::new(pattern).map_err(|e| {
            McProdError::ConfigError(format!("[monitor].ignore: invalid pattern '{pattern}': {e}"))
        })?;
    }

    Ok(MonitorSection {
        polling: field_duration("monitor", "polling_time", &raw.polling_time)?,
        host: raw.host,
        runit_dir: raw.runit_dir,
        restart_agents: raw.restart_agents,
        restart_executors: raw.restart_executors,
        restart_services: raw.restart_services,
        commit_urls: raw.commit_urls,
        ignore: raw.ignore,
        ping_timeout: field_duration("monitor", "ping_timeout", &raw.ping_timeout)?,
        kill_grace: field_duration("monitor", "kill_grace", &raw.kill_grace)?,
    })
}

fn is_production_type(t: TransformationType) -> bool {
    !matches!(
        t,
        TransformationType::Replication | TransformationType::Moving | TransformationType::Split
    )
}

fn field_duration(section: &str, field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| McProdError::ConfigError(format!("[{section}].{field}: {e}")))
}

/// Parse `"250ms"`, `"30s"`, `"10m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unsupported duration unit '{other}'")),
    }
}
