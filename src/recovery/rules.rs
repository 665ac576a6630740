// src/recovery/rules.rs

//! The decision table as data.
//!
//! Predicates are a small AST over [`JobInfo`] plus the per-cycle
//! [`RuleEnv`], actions are verbs of
//! [`TransformationInfo`](crate::transformation::TransformationInfo). Both
//! print the way they appear in notifications.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use crate::records::JobInfo;
use crate::types::{FileStatus, JobStatus, TaskId};

/// Cycle-wide facts that rules may consult.
#[derive(Debug, Clone, Copy)]
pub struct RuleEnv<'a> {
    /// Input LFN to the task recorded as having consumed it this cycle.
    pub consumed: &'a BTreeMap<String, TaskId>,
    pub max_reset_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    AllExist,
    AllMissing,
    SomeMissing,
    /// At least one output exists (`¬allMissing` over a non-empty output set).
    AnyExist,
    OtherTasks,
    HasInput,
    InputExists,
    /// Input recorded as consumed by a task other than this job's.
    ConsumedByOther,
    /// Input recorded as consumed by any task.
    Consumed,
    Status(JobStatus),
    FileStatus(FileStatus),
    ErrorCountExceeded,
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn eval(&self, job: &JobInfo, env: &RuleEnv<'_>) -> bool {
        match self {
            Predicate::AllExist => job.all_files_exist(),
            Predicate::AllMissing => job.all_files_missing(),
            Predicate::SomeMissing => job.some_files_missing(),
            Predicate::AnyExist => job.any_file_exists(),
            Predicate::OtherTasks => job.other_tasks.is_some(),
            Predicate::HasInput => job.input_file.is_some(),
            Predicate::InputExists => job.input_file_exists,
            Predicate::ConsumedByOther => job
                .input_file
                .as_ref()
                .and_then(|lfn| env.consumed.get(lfn))
                .is_some_and(|owner| Some(*owner) != job.task_id),
            Predicate::Consumed => job
                .input_file
                .as_ref()
                .is_some_and(|lfn| env.consumed.contains_key(lfn)),
            Predicate::Status(s) => job.status == *s,
            Predicate::FileStatus(s) => job.file_status == Some(*s),
            Predicate::ErrorCountExceeded => job.error_count > env.max_reset_counter,
            Predicate::Not(inner) => !inner.eval(job, env),
            Predicate::All(items) => items.iter().all(|p| p.eval(job, env)),
            Predicate::Any(items) => items.iter().any(|p| p.eval(job, env)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::AllExist => f.write_str("allExist"),
            Predicate::AllMissing => f.write_str("allMissing"),
            Predicate::SomeMissing => f.write_str("someMissing"),
            Predicate::AnyExist => f.write_str("anyExist"),
            Predicate::OtherTasks => f.write_str("otherTasks"),
            Predicate::HasInput => f.write_str("inputFile"),
            Predicate::InputExists => f.write_str("inputFileExists"),
            Predicate::ConsumedByOther => f.write_str("input∈consumed"),
            Predicate::Consumed => f.write_str("consumed"),
            Predicate::Status(s) => write!(f, "status={s}"),
            Predicate::FileStatus(s) => write!(f, "fileStatus={s}"),
            Predicate::ErrorCountExceeded => f.write_str("errorCount>maxReset"),
            Predicate::Not(inner) => match inner.as_ref() {
                Predicate::Status(s) => write!(f, "status≠{s}"),
                Predicate::FileStatus(s) => write!(f, "fileStatus≠{s}"),
                Predicate::All(_) | Predicate::Any(_) => write!(f, "¬({inner})"),
                other => write!(f, "¬{other}"),
            },
            Predicate::All(items) => join(f, items, " ∧ "),
            Predicate::Any(items) => join(f, items, " ∨ "),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Predicate], sep: &str) -> fmt::Result {
    for (i, p) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match p {
            Predicate::All(_) | Predicate::Any(_) => write!(f, "({p})")?,
            _ => write!(f, "{p}")?,
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetJobDone,
    SetJobFailed,
    SetInputProcessed,
    SetInputUnused,
    SetInputDeleted,
    SetInputMaxReset,
    CleanOutputs,
    /// Record the input as consumed by this job's task.
    RecordConsumed,
}

impl Action {
    /// Whether the action touches host state.
    pub fn mutates(&self) -> bool {
        !matches!(self, Action::RecordConsumed)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::SetJobDone => "setJobDone",
            Action::SetJobFailed => "setJobFailed",
            Action::SetInputProcessed => "setInputProcessed",
            Action::SetInputUnused => "setInputUnused",
            Action::SetInputDeleted => "setInputDeleted",
            Action::SetInputMaxReset => "setInputMaxReset",
            Action::CleanOutputs => "cleanOutputs",
            Action::RecordConsumed => "recordConsumed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Counter name used in the notification.
    pub short_label: &'static str,
    pub predicate: Predicate,
    pub actions: Vec<Action>,
}

impl Rule {
    fn new(short_label: &'static str, predicate: Predicate, actions: &[Action]) -> Self {
        Self {
            short_label,
            predicate,
            actions: actions.to_vec(),
        }
    }

    pub fn matches(&self, job: &JobInfo, env: &RuleEnv<'_>) -> bool {
        self.predicate.eval(job, env)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} →", self.short_label, self.predicate)?;
        if self.actions.is_empty() {
            return f.write_str(" (none)");
        }
        for (i, a) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// The table that applies to a transformation.
pub fn table_for(consumes_input: bool) -> &'static [Rule] {
    if consumes_input {
        &INPUT_CONSUMING
    } else {
        &GENERATION
    }
}

/// First rule whose predicate holds.
pub fn first_match<'r>(rules: &'r [Rule], job: &JobInfo, env: &RuleEnv<'_>) -> Option<(usize, &'r Rule)> {
    rules.iter().enumerate().find(|(_, r)| r.matches(job, env))
}

use Action::*;
use Predicate as P;

fn not(p: Predicate) -> Predicate {
    P::Not(Box::new(p))
}

fn all(items: Vec<Predicate>) -> Predicate {
    P::All(items)
}

pub static GENERATION: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            "MCGeneration: OutputExists: Job 'Done'",
            all(vec![P::AllExist, P::Status(JobStatus::Failed)]),
            &[SetJobDone],
        ),
        Rule::new(
            "MCGeneration: OutputMissing: Job 'Failed'",
            all(vec![P::AllMissing, P::Status(JobStatus::Done)]),
            &[SetJobFailed],
        ),
    ]
});

pub static INPUT_CONSUMING: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use FileStatus::{Assigned, Deleted, Processed};
    use JobStatus::{Done, Failed};

    vec![
        Rule::new(
            "Other Tasks --> Keep",
            all(vec![
                P::AllExist,
                P::OtherTasks,
                not(P::Consumed),
                P::Any(vec![not(P::Status(Done)), not(P::FileStatus(Processed))]),
            ]),
            &[SetJobDone, SetInputProcessed, RecordConsumed],
        ),
        Rule::new(
            "Other Tasks --> Fail",
            all(vec![P::ConsumedByOther, P::AllMissing, not(P::Status(Failed))]),
            &[SetJobFailed],
        ),
        Rule::new(
            "Other Tasks --> Cleanup",
            all(vec![P::ConsumedByOther, P::AnyExist]),
            &[SetJobFailed, CleanOutputs],
        ),
        Rule::new(
            "Input Missing --> Job 'Failed, Input 'Deleted', Cleanup",
            all(vec![P::HasInput, not(P::InputExists), not(P::FileStatus(Deleted))]),
            &[CleanOutputs, SetJobFailed, SetInputDeleted],
        ),
        Rule::new(
            "Input Deleted --> Job 'Failed, Cleanup",
            all(vec![
                P::HasInput,
                not(P::InputExists),
                P::FileStatus(Deleted),
                P::AnyExist,
            ]),
            &[CleanOutputs, SetJobFailed],
        ),
        Rule::new(
            "Output Exists --> Job Done, Input Processed",
            all(vec![
                P::AllExist,
                not(P::OtherTasks),
                P::Status(Failed),
                not(P::FileStatus(Processed)),
                P::InputExists,
            ]),
            &[SetJobDone, SetInputProcessed],
        ),
        Rule::new(
            "Output Exists --> Job Done",
            all(vec![
                P::AllExist,
                not(P::OtherTasks),
                P::Status(Failed),
                P::FileStatus(Processed),
                P::InputExists,
            ]),
            &[SetJobDone],
        ),
        Rule::new(
            "Output Exists --> Input Processed",
            all(vec![
                P::AllExist,
                not(P::OtherTasks),
                P::Status(Done),
                not(P::FileStatus(Processed)),
                not(P::FileStatus(Deleted)),
                P::InputExists,
            ]),
            &[SetInputProcessed],
        ),
        Rule::new(
            "Max ErrorCount --> Input MaxReset",
            all(vec![
                not(P::AllExist),
                not(P::OtherTasks),
                not(P::ConsumedByOther),
                P::Status(Failed),
                P::FileStatus(Assigned),
                P::InputExists,
                P::ErrorCountExceeded,
            ]),
            &[CleanOutputs, SetInputMaxReset],
        ),
        Rule::new(
            "Output Missing --> Input Unused",
            all(vec![
                P::AllMissing,
                not(P::OtherTasks),
                not(P::ConsumedByOther),
                P::Status(Failed),
                P::FileStatus(Assigned),
                P::InputExists,
            ]),
            &[SetInputUnused],
        ),
        Rule::new(
            "Output Missing --> Job Failed, Input Unused",
            all(vec![
                P::AllMissing,
                not(P::OtherTasks),
                P::Status(Done),
                P::FileStatus(Assigned),
                P::InputExists,
            ]),
            &[SetInputUnused, SetJobFailed],
        ),
        Rule::new(
            "Output Missing --> Cleanup, Input Unused",
            all(vec![
                P::SomeMissing,
                not(P::OtherTasks),
                P::Status(Failed),
                P::FileStatus(Assigned),
                P::InputExists,
            ]),
            &[CleanOutputs, SetInputUnused],
        ),
        Rule::new(
            "Output Missing --> Cleanup, Job Failed, Input Unused",
            all(vec![
                P::SomeMissing,
                not(P::OtherTasks),
                P::Status(Done),
                P::FileStatus(Assigned),
                P::InputExists,
            ]),
            &[CleanOutputs, SetInputUnused, SetJobFailed],
        ),
        Rule::new(
            "Some Output Missing --> Job Failed",
            all(vec![not(P::AllExist), P::Status(Done)]),
            &[SetJobFailed],
        ),
        Rule::new(
            "Strange",
            all(vec![not(P::Status(Failed)), not(P::Status(Done))]),
            &[],
        ),
    ]
});
