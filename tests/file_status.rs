// tests/file_status.rs

mod common;
use crate::common::builders::{context, file_status_settings, World};
use crate::common::init_tracing;

use std::error::Error;

use chrono::Utc;
use mcprod::errors::McProdError;
use mcprod::exec::Agent;
use mcprod::filestatus::FileStatusAgent;
use mcprod::host::memory::InMemoryHost;
use mcprod::host::{Request, TransformationFile, TransformationTask};
use mcprod::types::{
    FileStatus, JobStatus, RequestStatus, TransId, TransformationType,
};

type TestResult = Result<(), Box<dyn Error>>;

const SOURCE: &str = "CERN-SRM";
const TARGET: &str = "DESY-SRM";

/// One file of a transfer transformation, its task and (optionally) the
/// transfer request behind the task. The request id is `100 + file_id`.
fn transfer_file(
    host: &InMemoryHost,
    trans_id: TransId,
    file_id: u64,
    lfn: &str,
    status: FileStatus,
    request: Option<RequestStatus>,
) {
    let request_id = 100 + file_id;
    host.add_file(TransformationFile {
        trans_id,
        file_id,
        lfn: lfn.to_string(),
        status,
        error_count: 0,
        last_update: Utc::now(),
        task_id: Some(file_id),
    });
    host.add_task(TransformationTask {
        trans_id,
        task_id: file_id,
        file_id: Some(file_id),
        external_id: request_id,
        external_status: JobStatus::Failed,
        last_update: Utc::now(),
    });
    if let Some(status) = request {
        host.add_request(Request {
            request_id,
            name: format!("transfer_{request_id}"),
            job_id: None,
            status,
            lfns: vec![lfn.to_string()],
        });
    }
}

fn agent(host: &InMemoryHost, enabled: bool) -> FileStatusAgent {
    FileStatusAgent::new(context(host, enabled), file_status_settings())
}

#[test]
fn replication_files_follow_their_replicas() -> TestResult {
    init_tracing();
    let host = World::new()
        .transfer(20, TransformationType::Replication, SOURCE, TARGET)
        .build();
    transfer_file(&host, 20, 1, "/dm/gone.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    transfer_file(&host, 20, 2, "/dm/src.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    transfer_file(&host, 20, 3, "/dm/both.slcio", FileStatus::Problematic, Some(RequestStatus::Failed));
    host.add_catalog_file("/dm/src.slcio", &[SOURCE]);
    host.add_catalog_file("/dm/both.slcio", &[SOURCE, TARGET]);

    let reports = agent(&host, true).execute_cycle()?;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].examined, 3);
    assert_eq!(host.file_status(20, "/dm/gone.slcio"), Some(FileStatus::Deleted));
    assert_eq!(host.file_status(20, "/dm/src.slcio"), Some(FileStatus::Processed));
    assert_eq!(host.file_status(20, "/dm/both.slcio"), Some(FileStatus::Processed));
    assert!(reports[0].reset_requests.is_empty());
    Ok(())
}

#[test]
fn moving_retries_when_target_has_the_file() -> TestResult {
    let host = World::new()
        .transfer(21, TransformationType::Moving, SOURCE, TARGET)
        .build();
    transfer_file(&host, 21, 1, "/dm/both.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    transfer_file(&host, 21, 2, "/dm/target.slcio", FileStatus::Assigned, None);
    host.add_catalog_file("/dm/both.slcio", &[SOURCE, TARGET]);
    host.add_catalog_file("/dm/target.slcio", &[TARGET]);

    let reports = agent(&host, true).execute_cycle()?;

    assert_eq!(reports[0].reset_requests, vec![101]);
    assert_eq!(host.request(101).map(|r| r.status), Some(RequestStatus::Waiting));
    assert_eq!(host.file_status(21, "/dm/both.slcio"), Some(FileStatus::Assigned));
    // No request left to reset: the file itself goes back to the pool.
    assert_eq!(host.file_status(21, "/dm/target.slcio"), Some(FileStatus::Unused));
    Ok(())
}

#[test]
fn files_with_healthy_requests_are_left_alone() -> TestResult {
    let host = World::new()
        .transfer(22, TransformationType::Replication, SOURCE, TARGET)
        .build();
    transfer_file(&host, 22, 1, "/dm/busy.slcio", FileStatus::Assigned, Some(RequestStatus::Waiting));

    let reports = agent(&host, true).execute_cycle()?;

    assert_eq!(reports[0].examined, 0);
    assert!(!reports[0].changed());
    assert_eq!(host.file_status(22, "/dm/busy.slcio"), Some(FileStatus::Assigned));
    Ok(())
}

#[test]
fn dry_run_only_reports() -> TestResult {
    let host = World::new()
        .transfer(23, TransformationType::Moving, SOURCE, TARGET)
        .build();
    transfer_file(&host, 23, 1, "/dm/gone.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    transfer_file(&host, 23, 2, "/dm/both.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    host.add_catalog_file("/dm/both.slcio", &[SOURCE, TARGET]);

    let reports = agent(&host, false).execute_cycle()?;

    assert_eq!(reports[0].set_status["/dm/gone.slcio"], FileStatus::Deleted);
    assert_eq!(reports[0].reset_requests, vec![102]);
    assert_eq!(host.file_status(23, "/dm/gone.slcio"), Some(FileStatus::Assigned));
    assert_eq!(host.request(102).map(|r| r.status), Some(RequestStatus::Failed));
    Ok(())
}

#[test]
fn catalog_failures_skip_only_the_affected_file() -> TestResult {
    let host = World::new()
        .transfer(24, TransformationType::Replication, SOURCE, TARGET)
        .build();
    transfer_file(&host, 24, 1, "/dm/flaky.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    transfer_file(&host, 24, 2, "/dm/gone.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));
    host.fail_catalog_lookups_for("/dm/flaky.slcio");

    let reports = agent(&host, true).execute_cycle()?;

    assert!(reports[0].skipped.contains_key("/dm/flaky.slcio"));
    assert_eq!(host.file_status(24, "/dm/flaky.slcio"), Some(FileStatus::Assigned));
    assert_eq!(host.file_status(24, "/dm/gone.slcio"), Some(FileStatus::Deleted));
    Ok(())
}

#[test]
fn broken_body_fails_the_cycle_before_any_change() -> TestResult {
    let host = World::new()
        .transfer(25, TransformationType::Replication, SOURCE, TARGET)
        .transformation(26, TransformationType::Moving)
        .build();
    transfer_file(&host, 25, 1, "/dm/gone.slcio", FileStatus::Assigned, Some(RequestStatus::Failed));

    let mut agent = agent(&host, true);
    let err = agent.execute().unwrap_err();

    assert!(matches!(err, McProdError::ConfigError(_)));
    assert_eq!(host.file_status(25, "/dm/gone.slcio"), Some(FileStatus::Assigned));
    Ok(())
}
