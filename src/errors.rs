// src/errors.rs

//! Crate-wide error type and its classification for retry decisions.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::planner::PlannerError;
use crate::types::JobId;

#[derive(Error, Debug)]
pub enum McProdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// RPC failure, timeout or unavailable storage.
    #[error("{service} call failed: {message}")]
    Host {
        service: &'static str,
        message: String,
    },

    /// A batch call returned a non-empty `Failed` map.
    #[error("catalog call failed for {} lfn(s): {failed:?}", failed.len())]
    PartialCatalog { failed: BTreeMap<String, String> },

    /// Task table and job description disagree.
    #[error("task info mismatch: {0}")]
    TaskInfo(String),

    #[error("job {job_id}: malformed job description: {reason}")]
    JobDescription { job_id: JobId, reason: String },

    #[error("could not acquire shifter identity '{role}': {message}")]
    Identity { role: String, message: String },

    #[error("process control error: {0}")]
    Process(String),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl McProdError {
    pub fn host(service: &'static str, message: impl Into<String>) -> Self {
        McProdError::Host {
            service,
            message: message.into(),
        }
    }

    /// How the recovery loop should react to this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            McProdError::Host { .. }
            | McProdError::PartialCatalog { .. }
            | McProdError::IoError(_) => ErrorClass::Transient,
            McProdError::TaskInfo(_) => ErrorClass::Integrity,
            _ => ErrorClass::Fatal,
        }
    }
}

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying within the same cycle.
    Transient,
    /// Data disagrees with itself; never mutate, report as strange.
    Integrity,
    /// Retrying will not help; skip and log.
    Fatal,
}

/// Result of one attempt at evaluating a job, tagged for the retry loop.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Transient(McProdError),
    Integrity(McProdError),
    Fatal(McProdError),
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(v) => Outcome::Ok(v),
            Err(e) => match e.class() {
                ErrorClass::Transient => Outcome::Transient(e),
                ErrorClass::Integrity => Outcome::Integrity(e),
                ErrorClass::Fatal => Outcome::Fatal(e),
            },
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, McProdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_catalog_is_transient() {
        let mut failed = BTreeMap::new();
        failed.insert("/a".to_string(), "timeout".to_string());
        let outcome: Outcome<()> = Err(McProdError::PartialCatalog { failed }).into();
        assert!(matches!(outcome, Outcome::Transient(_)));
    }

    #[test]
    fn task_info_mismatch_is_integrity() {
        let outcome: Outcome<()> = Err(McProdError::TaskInfo("x".into())).into();
        assert!(matches!(outcome, Outcome::Integrity(_)));
    }

    #[test]
    fn identity_failure_is_fatal() {
        let err = McProdError::Identity {
            role: "DataManager".into(),
            message: "no proxy".into(),
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
    }
}
