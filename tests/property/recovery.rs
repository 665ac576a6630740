use proptest::prelude::*;

use mcprod::host::memory::InMemoryHost;
use mcprod::recovery::DataRecoveryAgent;
use mcprod::types::{FileStatus, JobStatus, RequestStatus, TransformationType};
use mcprod_test_utils::builders::{context, recovery_settings, JobSpec, World};

const TRANS: u64 = 7;

#[derive(Debug, Clone)]
struct JobCase {
    status: JobStatus,
    input_status: FileStatus,
    input_exists: bool,
    error_count: u32,
    outputs: Vec<bool>,
}

fn job_case() -> impl Strategy<Value = JobCase> {
    (
        prop_oneof![Just(JobStatus::Failed), Just(JobStatus::Done)],
        prop_oneof![
            Just(FileStatus::Assigned),
            Just(FileStatus::Processed),
            Just(FileStatus::Unused),
            Just(FileStatus::Deleted),
        ],
        any::<bool>(),
        0u32..15,
        proptest::collection::vec(any::<bool>(), 1..4),
    )
        .prop_map(|(status, input_status, input_exists, error_count, outputs)| JobCase {
            status,
            input_status,
            input_exists,
            error_count,
            outputs,
        })
}

fn input_lfn(i: usize) -> String {
    format!("/ilc/prod/sim/in_{i}.slcio")
}

/// One transformation, one job per case, every job with its own input.
fn world(trans_type: TransformationType, cases: &[JobCase]) -> InMemoryHost {
    let mut world = World::new().transformation(TRANS, trans_type);
    for (i, case) in cases.iter().enumerate() {
        let job_id = 100 + i as u64;
        let mut spec = JobSpec::new(TRANS, job_id, i as u64 + 1, case.status);
        if trans_type.consumes_input() {
            spec = if case.input_exists {
                spec.input(&input_lfn(i), case.input_status)
            } else {
                spec.missing_input(&input_lfn(i), case.input_status)
            }
            .error_count(case.error_count);
        }
        for (n, exists) in case.outputs.iter().enumerate() {
            spec = spec.output(&format!("/ilc/prod/rec/out_{job_id}_{n}.slcio"), *exists);
        }
        world = world.job(spec);
    }
    world.build()
}

/// A task that shares its input with a sibling that produced every output.
#[derive(Debug, Clone)]
struct Duplicate {
    status: JobStatus,
    /// Never all true.
    outputs: Vec<bool>,
    pending: bool,
}

/// One shared input: task 0 has all its outputs, the others are duplicates.
#[derive(Debug, Clone)]
struct SharedInput {
    winner_status: JobStatus,
    winner_outputs: usize,
    duplicates: Vec<Duplicate>,
    /// Task index named on the file row.
    owner: usize,
    /// Task indices in ascending job id.
    order: Vec<usize>,
}

fn terminal_status() -> impl Strategy<Value = JobStatus> {
    prop_oneof![Just(JobStatus::Failed), Just(JobStatus::Done)]
}

fn duplicate() -> impl Strategy<Value = Duplicate> {
    (
        terminal_status(),
        proptest::collection::vec(any::<bool>(), 1..4),
        any::<bool>(),
    )
        .prop_map(|(status, mut outputs, pending)| {
            if let Some(last) = outputs.last_mut() {
                *last = false;
            }
            Duplicate {
                status,
                outputs,
                pending,
            }
        })
}

fn shared_input() -> impl Strategy<Value = SharedInput> {
    (terminal_status(), 1usize..4, proptest::collection::vec(duplicate(), 1..4)).prop_flat_map(
        |(winner_status, winner_outputs, duplicates)| {
            let tasks = duplicates.len() + 1;
            (
                0..tasks,
                Just((0..tasks).collect::<Vec<_>>()).prop_shuffle(),
            )
                .prop_map(move |(owner, order)| SharedInput {
                    winner_status,
                    winner_outputs,
                    duplicates: duplicates.clone(),
                    owner,
                    order,
                })
        },
    )
}

fn shared_lfn(group: usize) -> String {
    format!("/ilc/prod/sim/shared_{group}.slcio")
}

fn output_lfn(group: usize, task: usize, n: usize) -> String {
    format!("/ilc/prod/rec/g{group}_t{task}_{n}.slcio")
}

/// Job id of task `task` in group `group`, following the group's order.
fn shared_job_id(group: usize, case: &SharedInput, task: usize) -> u64 {
    let position = case.order.iter().position(|t| *t == task).unwrap_or(task);
    1000 * (group as u64 + 1) + position as u64
}

fn shared_world(groups: &[SharedInput]) -> InMemoryHost {
    let mut world = World::new().transformation(TRANS, TransformationType::McReconstruction);
    for (g, case) in groups.iter().enumerate() {
        let lfn = shared_lfn(g);
        for task in 0..=case.duplicates.len() {
            let (status, outputs, pending) = match task {
                0 => (case.winner_status, vec![true; case.winner_outputs], false),
                _ => {
                    let d = &case.duplicates[task - 1];
                    (d.status, d.outputs.clone(), d.pending)
                }
            };
            let task_id = (g * 10 + task + 1) as u64;
            let mut spec = JobSpec::new(TRANS, shared_job_id(g, case, task), task_id, status)
                .input(&lfn, FileStatus::Assigned);
            if task == case.owner {
                spec = spec.owns_input();
            }
            if pending {
                spec = spec.request(RequestStatus::Waiting);
            }
            for (n, exists) in outputs.iter().enumerate() {
                spec = spec.output(&output_lfn(g, task, n), *exists);
            }
            world = world.job(spec);
        }
    }
    world.build()
}

fn trans_type() -> impl Strategy<Value = TransformationType> {
    prop_oneof![
        Just(TransformationType::McGeneration),
        Just(TransformationType::McSimulation),
        Just(TransformationType::McReconstruction),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn second_cycle_fires_no_rule(
        trans_type in trans_type(),
        cases in proptest::collection::vec(job_case(), 1..8),
    ) {
        let host = world(trans_type, &cases);
        let mut agent = DataRecoveryAgent::new(context(&host, true), recovery_settings());

        agent.execute_cycle().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let again = agent.execute_cycle().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let fired: usize = again.iter().map(|r| r.fired()).sum();
        prop_assert_eq!(fired, 0);
    }

    #[test]
    fn one_cycle_visits_every_job_once(
        cases in proptest::collection::vec(job_case(), 1..8),
    ) {
        let host = world(TransformationType::McSimulation, &cases);
        let mut agent = DataRecoveryAgent::new(context(&host, false), recovery_settings());

        let reports = agent.execute_cycle().map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(reports.len(), 1);
        let report = &reports[0];
        prop_assert_eq!(report.n_done + report.n_failed, cases.len());
        prop_assert_eq!(report.file_jobs.len(), cases.len());
        prop_assert!(report.file_jobs.values().all(|jobs| jobs.len() == 1));
        prop_assert!(report.fired() <= cases.len());
    }

    #[test]
    fn deleted_inputs_stay_deleted_and_missing_ones_get_deleted(
        cases in proptest::collection::vec(job_case(), 1..8),
    ) {
        let host = world(TransformationType::McReconstruction, &cases);
        let mut agent = DataRecoveryAgent::new(context(&host, true), recovery_settings());

        agent.execute_cycle().map_err(|e| TestCaseError::fail(e.to_string()))?;

        for (i, case) in cases.iter().enumerate() {
            let status = host.file_status(TRANS, &input_lfn(i));
            if case.input_status == FileStatus::Deleted {
                prop_assert_eq!(status, Some(FileStatus::Deleted));
            }
            if !case.input_exists {
                prop_assert_ne!(status, Some(FileStatus::Assigned));
            }
        }
    }

    #[test]
    fn shared_inputs_settle_in_one_cycle(groups in proptest::collection::vec(shared_input(), 1..3)) {
        let host = shared_world(&groups);
        let mut agent = DataRecoveryAgent::new(context(&host, true), recovery_settings());

        agent.execute_cycle().map_err(|e| TestCaseError::fail(e.to_string()))?;

        for (g, case) in groups.iter().enumerate() {
            prop_assert_eq!(host.file_status(TRANS, &shared_lfn(g)), Some(FileStatus::Processed));
            for n in 0..case.winner_outputs {
                prop_assert!(host.catalog_contains(&output_lfn(g, 0, n)));
            }
            for (i, d) in case.duplicates.iter().enumerate() {
                if d.pending {
                    continue;
                }
                for n in 0..d.outputs.len() {
                    prop_assert!(
                        !host.catalog_contains(&output_lfn(g, i + 1, n)),
                        "duplicate {} of group {} kept output {}", i + 1, g, n
                    );
                }
            }
        }

        let again = agent.execute_cycle().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let fired: usize = again.iter().map(|r| r.fired()).sum();
        prop_assert_eq!(fired, 0);
    }
}
