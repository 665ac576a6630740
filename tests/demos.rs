// tests/demos.rs

mod common;
use crate::common::builders::{context, recovery_settings};
use crate::common::init_tracing;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use mcprod::cli::{AgentKind, CliArgs};
use mcprod::config::loader::load_and_validate;
use mcprod::host::snapshot::load_snapshot;
use mcprod::recovery::DataRecoveryAgent;
use mcprod::types::{FileStatus, JobStatus};
use mcprod::{build_agents, build_context};

type TestResult = Result<(), Box<dyn Error>>;

const GEN_OUTPUT: &str = "/ilc/prod/ilc/mc-dbd/generated/500-TDR_ws/ae_ell/gen_1001.stdhep";
const REC_INPUT: &str = "/ilc/prod/ilc/mc-dbd/sim/in_4004.slcio";
const REC_OUTPUT: &str = "/ilc/prod/ilc/mc-dbd/rec/a_4004.slcio";

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn demo_world_is_recovered() -> TestResult {
    init_tracing();
    let host = load_snapshot(&demo("world.toml"))?;

    let reports = DataRecoveryAgent::new(context(&host, true), recovery_settings()).execute_cycle()?;

    assert_eq!(reports.len(), 2);
    assert_eq!(host.job_status(1001).as_deref(), Some("Done"));
    assert_eq!(host.task_status(1001, 1), Some(JobStatus::Done));
    assert!(host.catalog_contains(GEN_OUTPUT));

    assert!(!host.catalog_contains(REC_OUTPUT));
    assert!(!host.storage_contains("DESY-SRM", REC_OUTPUT));
    assert!(!host.storage_contains("CERN-SRM", REC_OUTPUT));
    assert!(host.catalog_contains(REC_INPUT));
    assert_eq!(host.file_status(12, REC_INPUT), Some(FileStatus::Unused));

    // One report mail per transformation that changed something.
    assert_eq!(host.sent_notifications().len(), 2);
    Ok(())
}

#[test]
fn demo_world_dry_run_changes_nothing() -> TestResult {
    let host = load_snapshot(&demo("world.toml"))?;

    let reports = DataRecoveryAgent::new(context(&host, false), recovery_settings()).execute_cycle()?;

    assert_eq!(reports.iter().map(|r| r.fired()).sum::<usize>(), 2);
    assert_eq!(host.job_status(1001).as_deref(), Some("Failed"));
    assert!(host.catalog_contains(REC_OUTPUT));
    assert_eq!(host.file_status(12, REC_INPUT), Some(FileStatus::Assigned));
    Ok(())
}

#[test]
fn demo_config_builds_every_agent() -> TestResult {
    let cfg = load_and_validate(demo("mcprod.toml"))?;
    let host = load_snapshot(&demo("world.toml"))?;
    let ctx = build_context(&cfg, Arc::new(host), false);
    assert!(!ctx.enabled);

    let kinds = [AgentKind::Recovery, AgentKind::FileStatus, AgentKind::Monitor];
    let agents = build_agents(&cfg, &ctx, &kinds)?;
    let names: Vec<&str> = agents.iter().map(|(a, _)| a.name()).collect();

    assert_eq!(names.len(), 3);
    assert_eq!(agents[0].1, cfg.recovery.polling);
    assert_eq!(agents[2].1, cfg.monitor.polling);
    Ok(())
}

#[tokio::test]
async fn once_mode_runs_the_demo_to_completion() -> TestResult {
    let args = CliArgs {
        config: demo("mcprod.toml"),
        state: Some(demo("world.toml")),
        agents: vec![AgentKind::Recovery, AgentKind::FileStatus],
        once: true,
        enable: true,
        check: false,
        log_level: None,
    };

    common::with_timeout(mcprod::run(args)).await?;
    Ok(())
}
