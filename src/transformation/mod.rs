// src/transformation/mod.rs

//! Per-transformation adapter over the host clients.
//!
//! [`TransformationInfo`] is the only place that mutates task, job and file
//! state. With `ctx.enabled == false` every mutation is logged and reported
//! as successful, while the in-memory [`JobInfo`] is still updated so the
//! rest of the cycle sees the would-be state.

pub mod body;

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::host::{AgentContext, FileFilter, LoggingRecord, TaskFilter, Transformation};
use crate::records::{JobInfo, TaskInfo};
use crate::types::{
    job_group, CatalogState, FileStatus, JobId, JobStatus, TaskId, TransId, TransformationType,
};

pub use body::{TransformationBody, WorkflowStep};

/// Source recorded in job logging entries written by recovery.
pub const LOGGING_SOURCE: &str = "DataRecoveryAgent";

/// Lineage depths searched when cleaning outputs.
const DESCENDANT_DEPTHS: [u32; 6] = [1, 2, 3, 4, 5, 6];

/// Jobs of one transformation selected by status.
#[derive(Debug, Clone, Default)]
pub struct JobSelection {
    /// Ascending job id.
    pub jobs: BTreeMap<JobId, JobInfo>,
    pub n_done: usize,
    pub n_failed: usize,
}

/// Task table of one transformation, joined with its files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTable {
    pub tasks: BTreeMap<TaskId, TaskInfo>,
    /// Input LFN to the latest task that touched it.
    pub lfn_tasks: BTreeMap<String, TaskId>,
    /// Inputs processed by more than one task.
    pub shared_inputs: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct TransformationInfo<'a> {
    pub trans_id: TransId,
    pub trans_name: String,
    pub trans_type: TransformationType,
    ctx: &'a AgentContext,
    shifter_role: &'a str,
}

impl<'a> TransformationInfo<'a> {
    pub fn new(ctx: &'a AgentContext, t: &Transformation, shifter_role: &'a str) -> Self {
        Self {
            trans_id: t.id,
            trans_name: t.name.clone(),
            trans_type: t.trans_type,
            ctx,
            shifter_role,
        }
    }

    pub fn enabled(&self) -> bool {
        self.ctx.enabled
    }

    /// All jobs of this transformation in any of `statuses`, by `JobGroup`.
    pub fn get_jobs(&self, statuses: &[JobStatus]) -> Result<JobSelection> {
        let mut selection = JobSelection::default();

        for status in statuses {
            let ids = self.job_ids(*status)?;
            match status {
                JobStatus::Done => selection.n_done += ids.len(),
                JobStatus::Failed => selection.n_failed += ids.len(),
                _ => {}
            }
            for id in ids {
                selection
                    .jobs
                    .insert(id, JobInfo::new(id, *status, self.trans_id, self.trans_type));
            }
        }

        debug!(
            trans_id = self.trans_id,
            jobs = selection.jobs.len(),
            n_done = selection.n_done,
            n_failed = selection.n_failed,
            "selected jobs"
        );
        Ok(selection)
    }

    /// Current `(Done, Failed)` job counts.
    pub fn count_jobs(&self) -> Result<(usize, usize)> {
        Ok((
            self.job_ids(JobStatus::Done)?.len(),
            self.job_ids(JobStatus::Failed)?.len(),
        ))
    }

    fn job_ids(&self, status: JobStatus) -> Result<Vec<JobId>> {
        let query = BTreeMap::from([
            ("JobGroup".to_string(), job_group(self.trans_id)),
            ("Status".to_string(), status.to_string()),
        ]);
        self.ctx.host.jobs.get_jobs(&query)
    }

    /// Task table for input-consuming transformations; empty otherwise.
    pub fn check_tasks_status(&self) -> Result<TaskTable> {
        if !self.trans_type.consumes_input() {
            return Ok(TaskTable::default());
        }

        let tasks = self.ctx.host.transformations.get_transformation_tasks(&TaskFilter {
            trans_id: self.trans_id,
            task_ids: Vec::new(),
        })?;
        let files = self
            .ctx
            .host
            .transformations
            .get_transformation_files(&FileFilter::for_transformation(self.trans_id))?;
        let files_by_id: BTreeMap<_, _> = files.iter().map(|f| (f.file_id, f)).collect();

        let mut table = TaskTable::default();
        for task in &tasks {
            let Some(file) = task.file_id.and_then(|id| files_by_id.get(&id)) else {
                continue;
            };
            table.tasks.insert(
                task.task_id,
                TaskInfo {
                    task_id: task.task_id,
                    file_id: file.file_id,
                    lfn: file.lfn.clone(),
                    status: file.status,
                    error_count: file.error_count,
                },
            );
        }

        for file in &files {
            let latest = file.task_id.or_else(|| {
                tasks
                    .iter()
                    .filter(|t| t.file_id == Some(file.file_id))
                    .map(|t| t.task_id)
                    .max()
            });
            if let Some(task_id) = latest {
                table.lfn_tasks.insert(file.lfn.clone(), task_id);
            }
        }

        let mut users: BTreeMap<&str, usize> = BTreeMap::new();
        for task in table.tasks.values() {
            *users.entry(task.lfn.as_str()).or_default() += 1;
        }
        table.shared_inputs = users
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(lfn, _)| lfn.to_string())
            .collect();

        Ok(table)
    }

    pub fn set_job_done(&self, job: &mut JobInfo) -> Result<()> {
        self.set_job_status(job, JobStatus::Done, Some("Job forced to Done"))
    }

    /// Keeps the current minor status so stalled-job triage is not lost.
    pub fn set_job_failed(&self, job: &mut JobInfo) -> Result<()> {
        self.set_job_status(job, JobStatus::Failed, None)
    }

    fn set_job_status(&self, job: &mut JobInfo, status: JobStatus, minor: Option<&str>) -> Result<()> {
        if self.enabled() {
            if let Some(task_id) = job.task_id {
                self.ctx
                    .host
                    .transformations
                    .set_task_status(&self.trans_name, task_id, status)?;
            }
            self.update_job_status(job.job_id, status, minor)?;
        } else {
            info!(
                trans_id = self.trans_id,
                job_id = job.job_id,
                task_id = ?job.task_id,
                %status,
                "dry run: would set task and job status"
            );
        }
        job.status = status;
        Ok(())
    }

    /// Write `Status` (and `MinorStatus`) directly and append a logging record.
    fn update_job_status(&self, job_id: JobId, status: JobStatus, minor: Option<&str>) -> Result<()> {
        let jobs = &self.ctx.host.jobs;
        let minor = match minor {
            Some(m) => m.to_string(),
            None => jobs
                .get_job_attributes(job_id, &["MinorStatus"])?
                .remove("MinorStatus")
                .unwrap_or_default(),
        };

        jobs.set_job_attribute(job_id, "Status", status.as_str(), true)?;
        jobs.set_job_attribute(job_id, "MinorStatus", &minor, true)?;
        jobs.add_logging_record(
            job_id,
            LoggingRecord {
                status: status.to_string(),
                minor_status: minor,
                source: LOGGING_SOURCE.to_string(),
                time: Utc::now(),
            },
        )?;
        debug!(job_id, %status, "job status updated");
        Ok(())
    }

    pub fn set_input_unused(&self, job: &mut JobInfo) -> Result<()> {
        self.set_input_status(job, FileStatus::Unused)
    }

    pub fn set_input_processed(&self, job: &mut JobInfo) -> Result<()> {
        self.set_input_status(job, FileStatus::Processed)
    }

    pub fn set_input_deleted(&self, job: &mut JobInfo) -> Result<()> {
        self.set_input_status(job, FileStatus::Deleted)
    }

    pub fn set_input_max_reset(&self, job: &mut JobInfo) -> Result<()> {
        self.set_input_status(job, FileStatus::MaxReset)
    }

    fn set_input_status(&self, job: &mut JobInfo, status: FileStatus) -> Result<()> {
        let Some(lfn) = job.input_file.clone() else {
            return Ok(());
        };
        // Deleted is terminal.
        if job.file_status == Some(FileStatus::Deleted) {
            debug!(trans_id = self.trans_id, %lfn, %status, "input is Deleted, left unchanged");
            return Ok(());
        }

        if self.enabled() {
            self.ctx
                .host
                .transformations
                .set_file_status_for_transformation(self.trans_id, status, &[lfn], true)?
                .into_result()?;
        } else {
            info!(
                trans_id = self.trans_id,
                job_id = job.job_id,
                %lfn,
                %status,
                "dry run: would set input file status"
            );
        }
        job.file_status = Some(status);
        Ok(())
    }

    /// Remove every output still registered, plus all of their descendants,
    /// from storage and from the catalog, under the shifter identity.
    pub fn clean_outputs(&self, job: &mut JobInfo) -> Result<()> {
        let lfns: Vec<String> = job
            .output_files
            .iter()
            .zip(&job.output_file_status)
            .filter(|(_, state)| **state != CatalogState::Missing)
            .map(|(lfn, _)| lfn.clone())
            .collect();
        if lfns.is_empty() {
            debug!(job_id = job.job_id, "no outputs to clean");
            return Ok(());
        }

        if self.enabled() {
            let identity = self.ctx.host.identity.acquire(self.shifter_role)?;
            let removed = self.remove_with_descendants(&lfns);
            self.ctx.host.identity.release(&identity);
            let removed = removed?;
            info!(job_id = job.job_id, removed, "cleaned outputs");
        } else {
            info!(
                trans_id = self.trans_id,
                job_id = job.job_id,
                lfns = ?lfns,
                "dry run: would remove outputs and descendants"
            );
        }

        for state in job.output_file_status.iter_mut() {
            *state = CatalogState::Missing;
        }
        Ok(())
    }

    fn remove_with_descendants(&self, lfns: &[String]) -> Result<usize> {
        let catalog = &self.ctx.host.catalog;

        let descendants = catalog
            .get_file_descendents(lfns, &DESCENDANT_DEPTHS)?
            .into_result()?;
        let all: Vec<String> = lfns
            .iter()
            .cloned()
            .chain(descendants.into_values().flatten())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Unregistered files have no replicas left to remove.
        let replicas = catalog.get_replicas(&all)?;
        let mut by_se: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (lfn, ses) in replicas.successful {
            for se in ses.into_keys() {
                by_se.entry(se).or_default().push(lfn.clone());
            }
        }
        for (se, se_lfns) in &by_se {
            self.ctx.host.storage.remove_file(se, se_lfns)?.into_result()?;
        }

        catalog.remove_file(&all)?.into_result()?;
        Ok(all.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::host::memory::InMemoryHost;
    use crate::host::{HostClients, MailSettings, TransformationFile, TransformationTask};
    use crate::types::TransformationStatus;

    fn context(host: &InMemoryHost, enabled: bool) -> AgentContext {
        AgentContext {
            enabled,
            host: HostClients::from_single(Arc::new(host.clone())),
            notifier: Arc::new(host.clone()),
            mail: MailSettings::default(),
        }
    }

    fn transformation() -> Transformation {
        Transformation {
            id: 42,
            name: "sim_500".into(),
            trans_type: TransformationType::McSimulation,
            status: TransformationStatus::Active,
            body: String::new(),
            input_query: Default::default(),
            group: String::new(),
        }
    }

    fn seed_job(host: &InMemoryHost, status: JobStatus) -> JobInfo {
        host.add_transformation_record(transformation());
        host.add_job(
            2001,
            &job_group(42),
            status,
            "",
            BTreeMap::from([("MinorStatus".to_string(), "Stalled triage".to_string())]),
        );
        host.add_task(TransformationTask {
            trans_id: 42,
            task_id: 7,
            file_id: Some(1),
            external_id: 2001,
            external_status: status,
            last_update: Utc::now(),
        });
        host.add_file(TransformationFile {
            trans_id: 42,
            file_id: 1,
            lfn: "/in/1".into(),
            status: FileStatus::Assigned,
            error_count: 0,
            last_update: Utc::now(),
            task_id: Some(7),
        });
        let mut job = JobInfo::new(2001, status, 42, TransformationType::McSimulation);
        job.task_id = Some(7);
        job.input_file = Some("/in/1".into());
        job.file_status = Some(FileStatus::Assigned);
        job
    }

    #[test]
    fn set_job_failed_keeps_minor_status_and_logs() {
        let host = InMemoryHost::new();
        let mut job = seed_job(&host, JobStatus::Done);
        let ctx = context(&host, true);
        let t = transformation();
        let tinfo = TransformationInfo::new(&ctx, &t, "DataManager");

        tinfo.set_job_failed(&mut job).unwrap();

        let record = host.job(2001).unwrap();
        assert_eq!(record.attributes["Status"], "Failed");
        assert_eq!(record.attributes["MinorStatus"], "Stalled triage");
        assert_eq!(record.logging.len(), 1);
        assert_eq!(record.logging[0].source, LOGGING_SOURCE);
        assert_eq!(host.task_status(42, 7), Some(JobStatus::Failed));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn dry_run_changes_nothing_on_the_host() {
        let host = InMemoryHost::new();
        let mut job = seed_job(&host, JobStatus::Failed);
        let ctx = context(&host, false);
        let t = transformation();
        let tinfo = TransformationInfo::new(&ctx, &t, "DataManager");

        tinfo.set_job_done(&mut job).unwrap();
        tinfo.set_input_processed(&mut job).unwrap();

        assert_eq!(host.job_status(2001).as_deref(), Some("Failed"));
        assert_eq!(host.file_status(42, "/in/1"), Some(FileStatus::Assigned));
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.file_status, Some(FileStatus::Processed));
    }

    #[test]
    fn deleted_inputs_are_never_rewritten() {
        let host = InMemoryHost::new();
        let mut job = seed_job(&host, JobStatus::Failed);
        let ctx = context(&host, true);
        let t = transformation();
        let tinfo = TransformationInfo::new(&ctx, &t, "DataManager");

        tinfo.set_input_deleted(&mut job).unwrap();
        tinfo.set_input_unused(&mut job).unwrap();

        assert_eq!(host.file_status(42, "/in/1"), Some(FileStatus::Deleted));
        assert_eq!(job.file_status, Some(FileStatus::Deleted));
    }

    #[test]
    fn clean_outputs_removes_descendants_and_replicas() {
        let host = InMemoryHost::new();
        let mut job = seed_job(&host, JobStatus::Failed);
        host.add_catalog_file("/o/a.slcio", &["CERN-SRM"]);
        host.add_catalog_file("/o/a_rec.slcio", &["DESY-SRM"]);
        host.add_descendant("/o/a.slcio", "/o/a_rec.slcio");
        job.output_files = vec!["/o/a.slcio".into(), "/o/b.slcio".into()];
        job.output_file_status = vec![CatalogState::Exists, CatalogState::Missing];

        let ctx = context(&host, true);
        let t = transformation();
        let tinfo = TransformationInfo::new(&ctx, &t, "DataManager");
        tinfo.clean_outputs(&mut job).unwrap();

        assert!(!host.catalog_contains("/o/a.slcio"));
        assert!(!host.catalog_contains("/o/a_rec.slcio"));
        assert!(!host.storage_contains("CERN-SRM", "/o/a.slcio"));
        assert!(!host.storage_contains("DESY-SRM", "/o/a_rec.slcio"));
        assert_eq!(host.active_identities(), 0);
        assert!(job.all_files_missing());
    }

    #[test]
    fn clean_outputs_fails_without_identity() {
        let host = InMemoryHost::new();
        let mut job = seed_job(&host, JobStatus::Failed);
        host.add_catalog_file("/o/a.slcio", &["CERN-SRM"]);
        host.refuse_identity(true);
        job.output_files = vec!["/o/a.slcio".into()];
        job.output_file_status = vec![CatalogState::Exists];

        let ctx = context(&host, true);
        let t = transformation();
        let tinfo = TransformationInfo::new(&ctx, &t, "DataManager");

        assert!(tinfo.clean_outputs(&mut job).is_err());
        assert!(host.catalog_contains("/o/a.slcio"));
    }

    #[test]
    fn task_table_joins_files_and_latest_task() {
        let host = InMemoryHost::new();
        seed_job(&host, JobStatus::Failed);
        host.add_task(TransformationTask {
            trans_id: 42,
            task_id: 9,
            file_id: Some(1),
            external_id: 2009,
            external_status: JobStatus::Running,
            last_update: Utc::now(),
        });

        let ctx = context(&host, true);
        let t = transformation();
        let tinfo = TransformationInfo::new(&ctx, &t, "DataManager");
        let table = tinfo.check_tasks_status().unwrap();

        assert_eq!(table.tasks.len(), 2);
        assert_eq!(table.tasks[&9].lfn, "/in/1");
        // The file row names task 7 explicitly.
        assert_eq!(table.lfn_tasks["/in/1"], 7);
        assert!(table.shared_inputs.contains("/in/1"));
    }
}
