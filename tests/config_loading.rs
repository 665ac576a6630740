// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use mcprod::config::loader::{load_and_validate, load_or_default};
use mcprod::errors::McProdError;
use mcprod::types::{FileStatus, OverrunPolicy, TransformationType};
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn demo_config_path() -> PathBuf {
    let root = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(root).join("demos").join("mcprod.toml")
}

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

fn config_error(contents: &str) -> Result<String, Box<dyn Error>> {
    let file = write_config(contents)?;
    match load_and_validate(file.path()) {
        Err(McProdError::ConfigError(msg)) => Ok(msg),
        Err(other) => Err(format!("expected a config error, got {other}").into()),
        Ok(_) => Err("config unexpectedly validated".into()),
    }
}

#[test]
fn demo_config_loads() -> TestResult {
    let cfg = load_and_validate(demo_config_path())?;

    assert!(!cfg.agent.enabled);
    assert_eq!(cfg.agent.overrun, OverrunPolicy::Queue);
    assert_eq!(cfg.recovery.polling, Duration::from_secs(3600));
    assert!(cfg.recovery.transformations_to_ignore.contains(&9999));
    assert_eq!(
        cfg.recovery.retry.backoff,
        vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]
    );
    assert_eq!(
        cfg.file_status.transformation_types,
        vec![TransformationType::Replication, TransformationType::Moving]
    );
    assert_eq!(
        cfg.file_status.file_statuses,
        vec![FileStatus::Assigned, FileStatus::Problematic]
    );
    assert_eq!(cfg.monitor.polling, Duration::from_secs(600));
    assert!(cfg.monitor.commit_urls);
    Ok(())
}

#[test]
fn missing_file_falls_back_to_defaults() -> TestResult {
    let dir = tempfile::tempdir()?;
    let cfg = load_or_default(dir.path().join("absent.toml"))?;

    assert_eq!(cfg.agent.overrun, OverrunPolicy::Skip);
    assert_eq!(cfg.recovery.max_reset_counter, 10);
    assert_eq!(cfg.recovery.retry.max_attempts, 3);
    Ok(())
}

#[test]
fn empty_file_is_all_defaults() -> TestResult {
    let file = write_config("")?;
    let cfg = load_and_validate(file.path())?;
    assert!(cfg.agent.mail_to.is_empty());
    assert_eq!(cfg.monitor.ping_timeout, Duration::from_secs(5));
    Ok(())
}

#[test]
fn transfer_type_is_rejected_for_recovery() -> TestResult {
    let msg = config_error(
        r#"
[recovery]
transformation_types = ["MCSimulation", "Replication"]
"#,
    )?;
    assert!(msg.contains("[recovery].transformation_types"));
    Ok(())
}

#[test]
fn production_type_is_rejected_for_file_status() -> TestResult {
    let msg = config_error(
        r#"
[file_status]
transformation_types = ["MCReconstruction"]
"#,
    )?;
    assert!(msg.contains("[file_status].transformation_types"));
    Ok(())
}

#[test]
fn bad_duration_names_the_field() -> TestResult {
    let msg = config_error(
        r#"
[monitor]
polling_time = "10 fortnights"
"#,
    )?;
    assert!(msg.starts_with("[monitor].polling_time"));
    Ok(())
}

#[test]
fn zero_attempts_are_rejected() -> TestResult {
    let msg = config_error(
        r#"
[recovery]
max_attempts = 0
"#,
    )?;
    assert!(msg.contains("max_attempts"));
    Ok(())
}

#[test]
fn unknown_section_fails_to_parse() -> TestResult {
    let file = write_config("[scheduler]\nworkers = 4\n")?;
    assert!(matches!(
        load_and_validate(file.path()),
        Err(McProdError::TomlError(_))
    ));
    Ok(())
}

#[test]
fn unknown_overrun_policy_fails_to_parse() -> TestResult {
    let file = write_config("[agent]\noverrun = \"pile-up\"\n")?;
    assert!(matches!(
        load_and_validate(file.path()),
        Err(McProdError::TomlError(_))
    ));
    Ok(())
}
