// src/recovery/engine.rs

//! The data recovery agent.
//!
//! One cycle:
//! 1. list eligible transformations (configured types and statuses, minus the
//!    ignore list);
//! 2. per transformation, select its Done and Failed jobs and skip it when
//!    the `(nDone, nFailed)` pair did not change since the last cycle;
//! 3. evaluate every job in ascending job id with a bounded retry loop and
//!    fire the first matching rule; a job without all its outputs whose input
//!    is shared with other tasks waits until the rest are done, so a sibling
//!    that consumed the input is known before it is judged;
//! 4. mail one report per transformation that changed.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::model::RecoverySection;
use crate::errors::{Outcome, Result};
use crate::exec::{Agent, CycleSummary};
use crate::host::{AgentContext, Transformation, TransformationFilter};
use crate::records::JobInfo;
use crate::transformation::{TaskTable, TransformationInfo};
use crate::types::{FileStatus, JobStatus, TaskId, TransId};

use super::report::TransformationReport;
use super::rules::{first_match, table_for, Action, Rule, RuleEnv};

/// Result of evaluating one job once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobEvaluation {
    Pending,
    Deferred,
    Fired(usize),
    NoMatch,
}

#[derive(Debug)]
pub struct DataRecoveryAgent {
    ctx: AgentContext,
    settings: RecoverySection,
    /// `(nDone, nFailed)` per transformation at the end of its last quiet cycle.
    job_cache: BTreeMap<TransId, (usize, usize)>,
    sleep: fn(Duration),
}

impl DataRecoveryAgent {
    pub fn new(ctx: AgentContext, settings: RecoverySection) -> Self {
        Self {
            ctx,
            settings,
            job_cache: BTreeMap::new(),
            sleep: thread::sleep,
        }
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn cached_counts(&self, trans_id: TransId) -> Option<(usize, usize)> {
        self.job_cache.get(&trans_id).copied()
    }

    /// Run one cycle and return the report of every transformation treated.
    pub fn execute_cycle(&mut self) -> Result<Vec<TransformationReport>> {
        let filter = TransformationFilter {
            ids: Vec::new(),
            types: self.settings.transformation_types.clone(),
            statuses: self.settings.transformation_statuses.clone(),
        };
        let transformations = self.ctx.host.transformations.get_transformations(&filter)?;
        info!(count = transformations.len(), "transformations to treat");

        let mut reports = Vec::new();
        for t in &transformations {
            if self.settings.transformations_to_ignore.contains(&t.id) {
                debug!(trans_id = t.id, "transformation on ignore list");
                continue;
            }

            match self.treat_transformation(t) {
                Ok(None) => {}
                Ok(Some(report)) => {
                    if report.needs_recheck() {
                        self.job_cache.remove(&t.id);
                    } else {
                        self.job_cache
                            .insert(t.id, (report.n_done, report.n_failed));
                    }
                    reports.push(report);
                }
                Err(e) => {
                    error!(trans_id = t.id, error = %e, "failed to treat transformation");
                    self.job_cache.remove(&t.id);
                }
            }
        }

        Ok(reports)
    }

    fn treat_transformation(&self, t: &Transformation) -> Result<Option<TransformationReport>> {
        let tinfo = TransformationInfo::new(&self.ctx, t, &self.settings.shifter_role);

        let selection = tinfo.get_jobs(&self.settings.job_statuses)?;
        let counts = (selection.n_done, selection.n_failed);
        if self.job_cache.get(&t.id) == Some(&counts) {
            debug!(trans_id = t.id, ?counts, "no new jobs since last cycle, skipping");
            return Ok(None);
        }

        let table = tinfo.check_tasks_status()?;
        let rules = table_for(t.trans_type.consumes_input());
        let mut report = TransformationReport::new(t, rules, self.ctx.enabled, counts);
        let mut consumed: BTreeMap<String, TaskId> = BTreeMap::new();

        info!(
            trans_id = t.id,
            name = %t.name,
            jobs = selection.jobs.len(),
            tasks = table.tasks.len(),
            "treating transformation"
        );

        let total = selection.jobs.len();
        let mut deferred = Vec::new();
        for (n, job) in selection.jobs.into_values().enumerate() {
            let every = self.settings.print_every_n_jobs;
            if every > 0 && n > 0 && n % every == 0 {
                info!(trans_id = t.id, done = n, total, "recovery progress");
            }
            if let Some(job) =
                self.process_job(&tinfo, job, &table, rules, &mut consumed, &mut report, true)
            {
                deferred.push(job);
            }
        }
        if !deferred.is_empty() {
            debug!(trans_id = t.id, jobs = deferred.len(), "evaluating jobs with shared inputs");
        }
        for job in deferred {
            self.process_job(&tinfo, job, &table, rules, &mut consumed, &mut report, false);
        }

        if report.has_changes() {
            match tinfo.count_jobs() {
                Ok(totals) => report.totals = totals,
                Err(e) => warn!(trans_id = t.id, error = %e, "cannot recount jobs"),
            }
            match self.ctx.notify(report.subject(), report.body()) {
                Ok(()) => debug!(trans_id = t.id, "report sent"),
                Err(e) => warn!(trans_id = t.id, error = %e, "failed to send report"),
            }
        }

        Ok(Some(report))
    }

    /// Evaluate one job with retries; never fails the cycle. Returns the job
    /// when `may_defer` is set and it has to wait for its siblings.
    #[allow(clippy::too_many_arguments)]
    fn process_job(
        &self,
        tinfo: &TransformationInfo<'_>,
        base: JobInfo,
        table: &TaskTable,
        rules: &[Rule],
        consumed: &mut BTreeMap<String, TaskId>,
        report: &mut TransformationReport,
        may_defer: bool,
    ) -> Option<JobInfo> {
        let policy = &self.settings.retry;
        let mut last_error = None;

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                (self.sleep)(delay);
            }

            let mut job = base.clone();
            let outcome =
                Outcome::from(self.evaluate_job(tinfo, &mut job, table, rules, consumed, may_defer));
            match outcome {
                Outcome::Ok(JobEvaluation::Pending) => {
                    debug!(job_id = job.job_id, "pending request, skipping job");
                    report.record_pending(job.job_id);
                    return None;
                }
                Outcome::Ok(JobEvaluation::Deferred) => {
                    debug!(job_id = job.job_id, "input shared with other tasks, deferring job");
                    return Some(base);
                }
                Outcome::Ok(evaluation) => {
                    if let JobEvaluation::Fired(idx) = evaluation {
                        report.record_fire(idx, &rules[idx], &job);
                    }
                    report.record_input(&job);
                    self.book_consumption(tinfo, &job, consumed);
                    return None;
                }
                Outcome::Transient(e) => {
                    warn!(job_id = job.job_id, attempt, error = %e, "transient failure evaluating job");
                    last_error = Some(e);
                }
                Outcome::Integrity(e) => {
                    warn!(job_id = job.job_id, error = %e, "inconsistent job records, not touching");
                    report.record_strange(job.job_id, e.to_string());
                    return None;
                }
                Outcome::Fatal(e) => {
                    error!(job_id = job.job_id, error = %e, "cannot evaluate job, skipping");
                    report.record_skipped(job.job_id, e.to_string());
                    return None;
                }
            }
        }

        if let Some(e) = last_error {
            error!(
                job_id = base.job_id,
                attempts = policy.max_attempts,
                error = %e,
                "giving up on job for this cycle"
            );
            report.record_skipped(
                base.job_id,
                format!("{e} (after {} attempts)", policy.max_attempts),
            );
        }
        None
    }

    fn evaluate_job(
        &self,
        tinfo: &TransformationInfo<'_>,
        job: &mut JobInfo,
        table: &TaskTable,
        rules: &[Rule],
        consumed: &mut BTreeMap<String, TaskId>,
        may_defer: bool,
    ) -> Result<JobEvaluation> {
        let host = &self.ctx.host;

        job.check_requests(host.requests.as_ref())?;
        if job.pending_request {
            return Ok(JobEvaluation::Pending);
        }
        job.get_job_information(host.jobs.as_ref())?;
        job.check_file_existence(host.catalog.as_ref())?;
        if tinfo.trans_type.consumes_input() {
            job.get_task_info(&table.tasks, &table.lfn_tasks)?;
            let waits_for_siblings = job.input_file.as_ref().is_some_and(|lfn| {
                table.shared_inputs.contains(lfn) && !consumed.contains_key(lfn)
            });
            if may_defer && waits_for_siblings && !job.all_files_exist() {
                return Ok(JobEvaluation::Deferred);
            }
        }

        let matched = {
            let env = RuleEnv {
                consumed,
                max_reset_counter: self.settings.max_reset_counter,
            };
            first_match(rules, job, &env).map(|(idx, _)| idx)
        };
        let Some(idx) = matched else {
            return Ok(JobEvaluation::NoMatch);
        };

        let rule = &rules[idx];
        info!(
            trans_id = tinfo.trans_id,
            job_id = job.job_id,
            rule = rule.short_label,
            "rule fired"
        );
        for action in &rule.actions {
            apply_action(tinfo, *action, job, consumed)?;
        }
        Ok(JobEvaluation::Fired(idx))
    }

    /// A Done job with all outputs and a Processed input consumed its input.
    fn book_consumption(
        &self,
        tinfo: &TransformationInfo<'_>,
        job: &JobInfo,
        consumed: &mut BTreeMap<String, TaskId>,
    ) {
        if !tinfo.trans_type.consumes_input() {
            return;
        }
        if let (Some(input), Some(task_id)) = (&job.input_file, job.task_id) {
            if job.status == JobStatus::Done
                && job.all_files_exist()
                && job.file_status == Some(FileStatus::Processed)
            {
                consumed.entry(input.clone()).or_insert(task_id);
            }
        }
    }
}

fn apply_action(
    tinfo: &TransformationInfo<'_>,
    action: Action,
    job: &mut JobInfo,
    consumed: &mut BTreeMap<String, TaskId>,
) -> Result<()> {
    match action {
        Action::SetJobDone => tinfo.set_job_done(job),
        Action::SetJobFailed => tinfo.set_job_failed(job),
        Action::SetInputProcessed => tinfo.set_input_processed(job),
        Action::SetInputUnused => tinfo.set_input_unused(job),
        Action::SetInputDeleted => tinfo.set_input_deleted(job),
        Action::SetInputMaxReset => tinfo.set_input_max_reset(job),
        Action::CleanOutputs => tinfo.clean_outputs(job),
        Action::RecordConsumed => {
            if let (Some(input), Some(task_id)) = (&job.input_file, job.task_id) {
                consumed.insert(input.clone(), task_id);
            }
            Ok(())
        }
    }
}

impl Agent for DataRecoveryAgent {
    fn name(&self) -> &str {
        "DataRecovery"
    }

    fn execute(&mut self) -> Result<CycleSummary> {
        let reports = self.execute_cycle()?;
        let changed = reports.iter().filter(|r| r.has_changes()).count();
        Ok(CycleSummary {
            examined: reports.len(),
            changed,
            notifications: changed,
        })
    }
}
