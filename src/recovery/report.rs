// src/recovery/report.rs

//! Per-transformation change report and its plain-text mail rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::host::Transformation;
use crate::records::JobInfo;
use crate::types::{JobId, TransId, TransformationType};

use super::rules::Rule;

/// Examples kept per rule.
pub const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCounter {
    pub short_label: &'static str,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationReport {
    pub trans_id: TransId,
    pub trans_name: String,
    pub trans_type: TransformationType,
    pub enabled: bool,
    /// One counter per rule, in table order.
    pub counters: Vec<RuleCounter>,
    pub pending: Vec<JobId>,
    /// Jobs whose records disagree with each other.
    pub strange: Vec<(JobId, String)>,
    /// Jobs given up on this cycle.
    pub skipped: Vec<(JobId, String)>,
    /// Input LFN to every job that used it.
    pub file_jobs: BTreeMap<String, Vec<JobId>>,
    /// Job counts when the transformation was selected.
    pub n_done: usize,
    pub n_failed: usize,
    /// `(Done, Failed)` after this cycle's actions; the selection counts until recounted.
    pub totals: (usize, usize),
    pub actions_run: bool,
}

impl TransformationReport {
    pub fn new(t: &Transformation, rules: &[Rule], enabled: bool, counts: (usize, usize)) -> Self {
        Self {
            trans_id: t.id,
            trans_name: t.name.clone(),
            trans_type: t.trans_type,
            enabled,
            counters: rules
                .iter()
                .map(|r| RuleCounter {
                    short_label: r.short_label,
                    count: 0,
                    examples: Vec::new(),
                })
                .collect(),
            pending: Vec::new(),
            strange: Vec::new(),
            skipped: Vec::new(),
            file_jobs: BTreeMap::new(),
            n_done: counts.0,
            n_failed: counts.1,
            totals: counts,
            actions_run: false,
        }
    }

    pub fn record_fire(&mut self, rule_idx: usize, rule: &Rule, job: &JobInfo) {
        if rule.actions.iter().any(|a| a.mutates()) {
            self.actions_run = true;
        }
        if let Some(counter) = self.counters.get_mut(rule_idx) {
            counter.count += 1;
            if counter.examples.len() < MAX_EXAMPLES {
                counter.examples.push(format!(
                    "{} {} [{}]",
                    job.job_id,
                    job.input_file.as_deref().unwrap_or("-"),
                    job.output_summary()
                ));
            }
        }
    }

    pub fn record_input(&mut self, job: &JobInfo) {
        if let Some(input) = &job.input_file {
            self.file_jobs
                .entry(input.clone())
                .or_default()
                .push(job.job_id);
        }
    }

    pub fn record_pending(&mut self, job_id: JobId) {
        self.pending.push(job_id);
    }

    pub fn record_strange(&mut self, job_id: JobId, reason: impl Into<String>) {
        self.strange.push((job_id, reason.into()));
    }

    pub fn record_skipped(&mut self, job_id: JobId, reason: impl Into<String>) {
        self.skipped.push((job_id, reason.into()));
    }

    pub fn count(&self, short_label: &str) -> usize {
        self.counters
            .iter()
            .find(|c| c.short_label == short_label)
            .map_or(0, |c| c.count)
    }

    pub fn fired(&self) -> usize {
        self.counters.iter().map(|c| c.count).sum()
    }

    /// Worth a mail to the operators.
    pub fn has_changes(&self) -> bool {
        self.fired() > 0 || !self.strange.is_empty() || !self.skipped.is_empty()
    }

    /// Must be evaluated again next cycle even if the job counts stay put.
    pub fn needs_recheck(&self) -> bool {
        self.actions_run
            || !self.pending.is_empty()
            || !self.strange.is_empty()
            || !self.skipped.is_empty()
    }

    pub fn subject(&self) -> String {
        let prefix = if self.enabled { "" } else { "[DRY RUN] " };
        format!(
            "{prefix}DataRecovery: {}/{}",
            self.trans_id, self.trans_name
        )
    }

    pub fn body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}/{} ({})", self.trans_id, self.trans_name, self.trans_type);
        if !self.enabled {
            let _ = writeln!(out, "DRY RUN: nothing was changed, listed actions would have run.");
        }
        out.push('\n');

        let fired: Vec<&RuleCounter> = self.counters.iter().filter(|c| c.count > 0).collect();
        if !fired.is_empty() {
            let _ = writeln!(out, "{:<60} {:>6}", "Rule", "Count");
            for c in &fired {
                let _ = writeln!(out, "{:<60} {:>6}", c.short_label, c.count);
            }
            for c in &fired {
                let _ = writeln!(out, "\n{}:", c.short_label);
                for example in &c.examples {
                    let _ = writeln!(out, "  {example}");
                }
            }
            out.push('\n');
        }

        if !self.pending.is_empty() {
            let ids: Vec<String> = self.pending.iter().map(JobId::to_string).collect();
            let _ = writeln!(out, "Pending requests (skipped): {}", ids.join(", "));
        }
        for (job_id, reason) in &self.strange {
            let _ = writeln!(out, "Strange: {job_id} {reason}");
        }
        for (job_id, reason) in &self.skipped {
            let _ = writeln!(out, "Skipped: {job_id} {reason}");
        }

        let shared: Vec<_> = self
            .file_jobs
            .iter()
            .filter(|(_, jobs)| jobs.len() > 1)
            .collect();
        if !shared.is_empty() {
            let _ = writeln!(out, "Inputs used by several jobs:");
            for (lfn, jobs) in shared {
                let ids: Vec<String> = jobs.iter().map(JobId::to_string).collect();
                let _ = writeln!(out, "  {lfn}: {}", ids.join(", "));
            }
        }

        let (done, failed) = self.totals;
        let _ = writeln!(out, "\nTotal: DONE {done}, FAILED {failed}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::rules::GENERATION;
    use crate::types::{CatalogState, JobStatus, TransformationStatus};

    fn report(enabled: bool) -> TransformationReport {
        let t = Transformation {
            id: 5,
            name: "gen_250".into(),
            trans_type: TransformationType::McGeneration,
            status: TransformationStatus::Active,
            body: String::new(),
            input_query: Default::default(),
            group: String::new(),
        };
        TransformationReport::new(&t, &GENERATION, enabled, (3, 1))
    }

    #[test]
    fn examples_are_capped() {
        let mut r = report(true);
        let mut job = JobInfo::new(1, JobStatus::Failed, 5, TransformationType::McGeneration);
        job.output_files = vec!["/g/1.stdhep".into()];
        job.output_file_status = vec![CatalogState::Exists];
        for id in 0..8 {
            job.job_id = id;
            r.record_fire(0, &GENERATION[0], &job);
        }
        assert_eq!(r.counters[0].count, 8);
        assert_eq!(r.counters[0].examples.len(), MAX_EXAMPLES);
        assert!(r.actions_run);
    }

    #[test]
    fn body_lists_counters_and_totals() {
        let mut r = report(false);
        let mut job = JobInfo::new(1001, JobStatus::Failed, 5, TransformationType::McGeneration);
        job.output_files = vec!["/a/b/gen_1001.stdhep".into()];
        job.output_file_status = vec![CatalogState::Exists];
        r.record_fire(0, &GENERATION[0], &job);
        r.record_pending(1002);

        let body = r.body();
        assert!(body.starts_with("5/gen_250"));
        assert!(body.contains("DRY RUN"));
        assert!(body.contains("MCGeneration: OutputExists: Job 'Done'"));
        assert!(body.contains("1001 - [/a/b/gen_1001.stdhep: Exists]"));
        assert!(body.contains("Pending requests (skipped): 1002"));
        assert!(body.contains("Total: DONE 3, FAILED 1"));
        assert!(r.subject().starts_with("[DRY RUN]"));
    }
}
