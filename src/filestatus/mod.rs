// src/filestatus/mod.rs

//! File status reconciliation for data-management transformations.
//!
//! For Replication and Moving transformations, files whose transfer request
//! failed (or vanished) are checked against the catalog and the source and
//! target storage elements, and their status is corrected:
//!
//! | present at       | Replication | Moving  |
//! |------------------|-------------|---------|
//! | neither          | Deleted     | Deleted |
//! | source only      | Processed   | Processed |
//! | target only      | Processed   | Unused  |
//! | source and target| Processed   | Unused  |
//!
//! `Unused` means "retry": a still existing request is reset, otherwise the
//! file itself is set `Unused` so the host picks it up again.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::model::FileStatusSection;
use crate::errors::{McProdError, Result};
use crate::exec::{Agent, CycleSummary};
use crate::host::{
    AgentContext, FileFilter, TaskFilter, Transformation, TransformationFile, TransformationFilter,
};
use crate::transformation::TransformationBody;
use crate::types::{FileStatus, RequestStatus, TransId, TransformationType};

/// What to do with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDecision {
    SetStatus(FileStatus),
    Retry,
}

/// Decision table for one file given where it is present.
pub fn decide(
    trans_type: TransformationType,
    at_source: bool,
    at_target: bool,
) -> Result<FileDecision> {
    let moving = match trans_type {
        TransformationType::Replication => false,
        TransformationType::Moving => true,
        other => {
            return Err(McProdError::ConfigError(format!(
                "file status reconciliation does not handle {other} transformations"
            )));
        }
    };

    Ok(match (at_source, at_target) {
        (false, false) => FileDecision::SetStatus(FileStatus::Deleted),
        (true, false) => FileDecision::SetStatus(FileStatus::Processed),
        (_, true) if moving => FileDecision::Retry,
        (_, true) => FileDecision::SetStatus(FileStatus::Processed),
    })
}

/// Per-transformation outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStatusReport {
    pub trans_id: TransId,
    pub examined: usize,
    pub set_status: BTreeMap<String, FileStatus>,
    /// Request ids reset for retry.
    pub reset_requests: Vec<u64>,
    /// LFNs skipped because a lookup failed.
    pub skipped: BTreeMap<String, String>,
}

impl FileStatusReport {
    pub fn changed(&self) -> bool {
        !self.set_status.is_empty() || !self.reset_requests.is_empty()
    }
}

struct Candidate {
    file: TransformationFile,
    request_id: Option<u64>,
}

#[derive(Debug)]
pub struct FileStatusAgent {
    ctx: AgentContext,
    settings: FileStatusSection,
}

impl FileStatusAgent {
    pub fn new(ctx: AgentContext, settings: FileStatusSection) -> Self {
        Self { ctx, settings }
    }

    /// Run one cycle. A transformation with an unusable body fails the whole
    /// cycle before anything is changed.
    pub fn execute_cycle(&self) -> Result<Vec<FileStatusReport>> {
        let filter = TransformationFilter {
            ids: Vec::new(),
            types: self.settings.transformation_types.clone(),
            statuses: self.settings.transformation_statuses.clone(),
        };
        let transformations = self.ctx.host.transformations.get_transformations(&filter)?;

        let mut work = Vec::with_capacity(transformations.len());
        for t in &transformations {
            let body = TransformationBody::parse(&t.body).map_err(|e| {
                McProdError::ConfigError(format!(
                    "transformation {} has an invalid body: {e}",
                    t.id
                ))
            })?;
            let (sources, targets) = body.transfer_ses()?;
            work.push((t, sources.to_vec(), targets.to_vec()));
        }

        let mut reports = Vec::new();
        for (t, sources, targets) in work {
            match self.treat_transformation(t, &sources, &targets) {
                Ok(report) => {
                    info!(
                        trans_id = t.id,
                        examined = report.examined,
                        changed = report.set_status.len(),
                        reset = report.reset_requests.len(),
                        skipped = report.skipped.len(),
                        "file status reconciliation done"
                    );
                    reports.push(report);
                }
                Err(e) => warn!(trans_id = t.id, error = %e, "file status reconciliation failed"),
            }
        }
        Ok(reports)
    }

    fn treat_transformation(
        &self,
        t: &Transformation,
        sources: &[String],
        targets: &[String],
    ) -> Result<FileStatusReport> {
        let host = &self.ctx.host;
        let mut report = FileStatusReport {
            trans_id: t.id,
            ..FileStatusReport::default()
        };

        let candidates = self.failed_transfers(t)?;
        report.examined = candidates.len();
        if candidates.is_empty() {
            return Ok(report);
        }

        let lfns: Vec<String> = candidates.iter().map(|c| c.file.lfn.clone()).collect();
        let in_catalog = host.catalog.exists(&lfns)?;
        for (lfn, err) in &in_catalog.failed {
            report.skipped.insert(lfn.clone(), err.clone());
        }
        let at_source = self.present_at(sources, &lfns, &in_catalog.successful, &mut report)?;
        let at_target = self.present_at(targets, &lfns, &in_catalog.successful, &mut report)?;

        for c in candidates {
            let lfn = &c.file.lfn;
            if report.skipped.contains_key(lfn) {
                continue;
            }
            let decision = decide(
                t.trans_type,
                at_source.get(lfn).copied().unwrap_or(false),
                at_target.get(lfn).copied().unwrap_or(false),
            )?;
            debug!(trans_id = t.id, %lfn, ?decision, "file decision");

            match decision {
                FileDecision::SetStatus(status) if status == c.file.status => {}
                FileDecision::SetStatus(status) => {
                    self.set_status(t.id, lfn, status)?;
                    report.set_status.insert(lfn.clone(), status);
                }
                FileDecision::Retry => match c.request_id {
                    Some(request_id) => {
                        if self.ctx.enabled {
                            host.requests.reset_failed_request(request_id)?;
                        } else {
                            info!(trans_id = t.id, request_id, %lfn, "dry run: would reset request");
                        }
                        report.reset_requests.push(request_id);
                    }
                    None => {
                        self.set_status(t.id, lfn, FileStatus::Unused)?;
                        report.set_status.insert(lfn.clone(), FileStatus::Unused);
                    }
                },
            }
        }

        Ok(report)
    }

    /// Files in a configured status whose latest transfer request failed or
    /// no longer exists.
    fn failed_transfers(&self, t: &Transformation) -> Result<Vec<Candidate>> {
        let host = &self.ctx.host;
        let files = host.transformations.get_transformation_files(&FileFilter {
            statuses: self.settings.file_statuses.clone(),
            ..FileFilter::for_transformation(t.id)
        })?;
        let tasks: BTreeMap<_, _> = host
            .transformations
            .get_transformation_tasks(&TaskFilter {
                trans_id: t.id,
                task_ids: Vec::new(),
            })?
            .into_iter()
            .map(|k| (k.task_id, k))
            .collect();

        let mut out = Vec::new();
        for file in files {
            let request_id = file
                .task_id
                .and_then(|task_id| tasks.get(&task_id))
                .map(|task| task.external_id);
            let request = match request_id {
                Some(id) => host.requests.get_request(id)?,
                None => None,
            };
            match request {
                Some(r) if r.status != RequestStatus::Failed => continue,
                Some(r) => out.push(Candidate {
                    file,
                    request_id: Some(r.request_id),
                }),
                None => out.push(Candidate {
                    file,
                    request_id: None,
                }),
            }
        }
        Ok(out)
    }

    /// A file is present at a set of SEs when it is in the catalog and every
    /// SE reports it.
    fn present_at(
        &self,
        ses: &[String],
        lfns: &[String],
        in_catalog: &BTreeMap<String, bool>,
        report: &mut FileStatusReport,
    ) -> Result<BTreeMap<String, bool>> {
        let mut present: BTreeMap<String, bool> = lfns
            .iter()
            .map(|lfn| {
                let known = in_catalog.get(lfn).copied().unwrap_or(false);
                (lfn.clone(), known && !ses.is_empty())
            })
            .collect();

        for se in ses {
            let res = self.ctx.host.storage.exists(se, lfns)?;
            for (lfn, err) in res.failed {
                report.skipped.insert(lfn, format!("{se}: {err}"));
            }
            for (lfn, flag) in present.iter_mut() {
                *flag = *flag && res.successful.get(lfn).copied().unwrap_or(false);
            }
        }
        Ok(present)
    }

    fn set_status(&self, trans_id: TransId, lfn: &str, status: FileStatus) -> Result<()> {
        if !self.ctx.enabled {
            info!(trans_id, %lfn, %status, "dry run: would set file status");
            return Ok(());
        }
        self.ctx
            .host
            .transformations
            .set_file_status_for_transformation(trans_id, status, &[lfn.to_string()], true)?
            .into_result()?;
        Ok(())
    }
}

impl Agent for FileStatusAgent {
    fn name(&self) -> &str {
        "FileStatus"
    }

    fn execute(&mut self) -> Result<CycleSummary> {
        let reports = self.execute_cycle()?;
        Ok(CycleSummary {
            examined: reports.iter().map(|r| r.examined).sum(),
            changed: reports.iter().filter(|r| r.changed()).count(),
            notifications: 0,
        })
    }
}
