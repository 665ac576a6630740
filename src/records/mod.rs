// src/records/mod.rs

//! Per-cycle views over one job, one task and one transformation file.
//!
//! `JobInfo` is rebuilt from scratch every recovery cycle and never written
//! back; only [`crate::transformation::TransformationInfo`] mutates the host.

pub mod jdl;

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{McProdError, Result};
use crate::host::{
    FileCatalogClient, JobMonitoringClient, RequestManagerClient, TransformationFile,
};
use crate::types::{
    CatalogState, FileId, FileStatus, JobId, JobStatus, RequestStatus, TaskId, TransId,
    TransformationType,
};

use self::jdl::Jdl;

/// Row of the task table joined with the transformation file it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub file_id: FileId,
    pub lfn: String,
    pub status: FileStatus,
    pub error_count: u32,
}

/// Read-only view of one transformation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub lfn: String,
    pub file_id: FileId,
    pub status: FileStatus,
    pub error_count: u32,
    pub task_id: Option<TaskId>,
}

impl From<&TransformationFile> for FileInfo {
    fn from(f: &TransformationFile) -> Self {
        Self {
            lfn: f.lfn.clone(),
            file_id: f.file_id,
            status: f.status,
            error_count: f.error_count,
            task_id: f.task_id,
        }
    }
}

/// One task together with its grid job, input and declared outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub job_id: JobId,
    pub status: JobStatus,
    pub trans_id: TransId,
    pub trans_type: TransformationType,
    pub task_id: Option<TaskId>,
    /// First LFN of `InputData`; `None` for generation jobs.
    pub input_file: Option<String>,
    pub output_files: Vec<String>,
    /// Parallel to `output_files`.
    pub output_file_status: Vec<CatalogState>,
    pub input_file_exists: bool,
    pub file_status: Option<FileStatus>,
    pub task_file_id: Option<FileId>,
    pub error_count: u32,
    /// A different task that owns the same input.
    pub other_tasks: Option<TaskId>,
    pub pending_request: bool,
}

impl JobInfo {
    pub fn new(job_id: JobId, status: JobStatus, trans_id: TransId, trans_type: TransformationType) -> Self {
        Self {
            job_id,
            status,
            trans_id,
            trans_type,
            task_id: None,
            input_file: None,
            output_files: Vec::new(),
            output_file_status: Vec::new(),
            input_file_exists: false,
            file_status: None,
            task_file_id: None,
            error_count: 0,
            other_tasks: None,
            pending_request: false,
        }
    }

    /// Fill `task_id`, `input_file` and `output_files` from the job description.
    pub fn parse_job_description(&mut self, text: &str) -> Result<()> {
        let jdl = Jdl::parse(text);

        let raw_task = jdl
            .get("TaskID")
            .and_then(|v| v.as_scalar())
            .ok_or_else(|| McProdError::JobDescription {
                job_id: self.job_id,
                reason: "no TaskID".to_string(),
            })?;
        let task_id = raw_task
            .trim()
            .parse::<TaskId>()
            .map_err(|_| McProdError::JobDescription {
                job_id: self.job_id,
                reason: format!("TaskID '{raw_task}' is not an integer"),
            })?;
        self.task_id = Some(task_id);

        self.input_file = jdl
            .get("InputData")
            .map(|v| v.as_list())
            .and_then(|lfns| lfns.into_iter().next())
            .map(|lfn| lfn.strip_prefix("LFN:").unwrap_or(&lfn).to_string())
            .filter(|lfn| !lfn.is_empty());

        self.output_files = jdl
            .get("ProductionOutputData")
            .map(|v| v.as_list())
            .unwrap_or_default();
        self.output_file_status = vec![CatalogState::Unknown; self.output_files.len()];

        Ok(())
    }

    /// Fetch and parse the description from the job database.
    pub fn get_job_information(&mut self, jobs: &dyn JobMonitoringClient) -> Result<()> {
        let text = jobs.get_job_jdl(self.job_id)?;
        self.parse_job_description(&text)
    }

    /// A request that is not yet `Done` blocks every mutation for this job.
    pub fn check_requests(&mut self, requests: &dyn RequestManagerClient) -> Result<()> {
        let res = requests.read_requests_for_jobs(&[self.job_id])?;
        if let Some(reason) = res.failed.get(&self.job_id) {
            return Err(McProdError::host("read_requests_for_jobs", reason.clone()));
        }
        self.pending_request = res
            .successful
            .get(&self.job_id)
            .is_some_and(|req| req.status != RequestStatus::Done);
        Ok(())
    }

    /// Query the catalog for the input and every output.
    ///
    /// LFNs whose lookup failed stay `Unknown` and the call returns
    /// [`McProdError::PartialCatalog`], so the job is evaluated again.
    pub fn check_file_existence(&mut self, catalog: &dyn FileCatalogClient) -> Result<()> {
        let mut lfns = self.output_files.clone();
        if let Some(input) = &self.input_file {
            lfns.push(input.clone());
        }
        if lfns.is_empty() {
            return Ok(());
        }

        let res = catalog.exists(&lfns)?;

        if let Some(input) = &self.input_file {
            self.input_file_exists = res.successful.get(input).copied().unwrap_or(false);
        }
        self.output_file_status = self
            .output_files
            .iter()
            .map(|lfn| match res.successful.get(lfn) {
                Some(true) => CatalogState::Exists,
                Some(false) => CatalogState::Missing,
                None => CatalogState::Unknown,
            })
            .collect();

        if res.failed.is_empty() {
            Ok(())
        } else {
            Err(McProdError::PartialCatalog { failed: res.failed })
        }
    }

    /// Join with the task table.
    ///
    /// Fails with [`McProdError::TaskInfo`] when the task table names a
    /// different input than the job description.
    pub fn get_task_info(
        &mut self,
        tasks: &BTreeMap<TaskId, TaskInfo>,
        lfn_tasks: &BTreeMap<String, TaskId>,
    ) -> Result<()> {
        let task_id = self.task_id.ok_or_else(|| {
            McProdError::TaskInfo(format!("job {} has no task id", self.job_id))
        })?;
        let task = tasks.get(&task_id).ok_or_else(|| {
            McProdError::TaskInfo(format!(
                "task {task_id} of job {} is not in the task table",
                self.job_id
            ))
        })?;

        let input = self.input_file.as_deref().unwrap_or_default();
        if task.lfn != input {
            return Err(McProdError::TaskInfo(format!(
                "job {} input '{input}' does not match task {task_id} input '{}'",
                self.job_id, task.lfn
            )));
        }

        self.file_status = Some(task.status);
        self.task_file_id = Some(task.file_id);
        self.error_count = task.error_count;
        self.other_tasks = lfn_tasks
            .get(&task.lfn)
            .copied()
            .filter(|owner| *owner != task_id);
        Ok(())
    }

    /// Every declared output exists; vacuously true without outputs.
    pub fn all_files_exist(&self) -> bool {
        self.output_file_status
            .iter()
            .all(|s| *s == CatalogState::Exists)
    }

    /// At least one output and all of them missing.
    pub fn all_files_missing(&self) -> bool {
        !self.output_file_status.is_empty()
            && self
                .output_file_status
                .iter()
                .all(|s| *s == CatalogState::Missing)
    }

    pub fn some_files_missing(&self) -> bool {
        self.any_file_exists()
            && self
                .output_file_status
                .iter()
                .any(|s| *s == CatalogState::Missing)
    }

    pub fn any_file_exists(&self) -> bool {
        self.output_file_status
            .iter()
            .any(|s| *s == CatalogState::Exists)
    }

    /// `lfn: State` pairs for reports.
    pub fn output_summary(&self) -> String {
        self.output_files
            .iter()
            .zip(&self.output_file_status)
            .map(|(lfn, s)| format!("{lfn}: {s}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} input={} [{}]",
            self.job_id,
            self.status,
            self.input_file.as_deref().unwrap_or("-"),
            self.output_summary()
        )
    }
}
