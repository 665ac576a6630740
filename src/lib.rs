// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod filestatus;
pub mod fs;
pub mod host;
pub mod logging;
pub mod monitor;
pub mod planner;
pub mod records;
pub mod recovery;
pub mod transformation;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::{AgentKind, CliArgs};
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::{spawn_ticker, Agent, BlockingAgentBackend};
use crate::filestatus::FileStatusAgent;
use crate::fs::RealFileSystem;
use crate::host::memory::InMemoryHost;
use crate::host::snapshot::load_snapshot;
use crate::host::{AgentContext, HostClients, LogNotifier, MailSettings};
use crate::monitor::{MonitorAgent, RunitControl, SysinfoProcessControl, TcpPinger};
use crate::recovery::DataRecoveryAgent;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the host clients and the agent context
/// - agents, backend and runtime
/// - polling tickers
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;

    if args.check {
        print_check(&cfg);
        return Ok(());
    }

    let host = match &args.state {
        Some(path) => {
            info!(path = %path.display(), "loading host snapshot");
            load_snapshot(path)?
        }
        None => InMemoryHost::new(),
    };
    let ctx = build_context(&cfg, Arc::new(host), args.enable);
    if !ctx.enabled {
        info!("agents are disabled; mutations will only be logged");
    }

    let agents = build_agents(&cfg, &ctx, &args.selected_agents())?;
    let names: Vec<String> = agents.iter().map(|(a, _)| a.name().to_string()).collect();
    info!(agents = ?names, once = args.once, "starting agents");

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let mut periods = Vec::with_capacity(agents.len());
    let mut boxed = Vec::with_capacity(agents.len());
    for (agent, period) in agents {
        periods.push((agent.name().to_string(), period));
        boxed.push(agent);
    }
    let backend = BlockingAgentBackend::new(boxed, rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    // In `--once` mode every agent is due exactly once; otherwise tickers
    // keep the cycles coming.
    let _tickers = if args.once {
        for (agent, _) in &periods {
            rt_tx
                .send(RuntimeEvent::CycleDue {
                    agent: agent.clone(),
                })
                .await?;
        }
        Vec::new()
    } else {
        periods
            .iter()
            .map(|(agent, period)| spawn_ticker(agent.clone(), *period, rt_tx.clone()))
            .collect()
    };
    drop(rt_tx);

    let options = RuntimeOptions {
        exit_after_one_cycle: args.once,
    };
    let core = CoreRuntime::new(names, cfg.agent.overrun, options);
    let runtime = Runtime::new(core, rt_rx, backend);
    runtime.run().await?;
    Ok(())
}

/// The explicit per-process context. `--enable` forces mutations on.
pub fn build_context(cfg: &ConfigFile, host: Arc<InMemoryHost>, enable: bool) -> AgentContext {
    AgentContext {
        enabled: cfg.agent.enabled || enable,
        host: HostClients::from_single(host),
        notifier: Arc::new(LogNotifier),
        mail: MailSettings {
            to: cfg.agent.mail_to.clone(),
            from: cfg.agent.mail_from.clone(),
        },
    }
}

/// Instantiate the selected agents together with their polling periods.
pub fn build_agents(
    cfg: &ConfigFile,
    ctx: &AgentContext,
    kinds: &[AgentKind],
) -> crate::errors::Result<Vec<(Box<dyn Agent>, Duration)>> {
    let mut agents: Vec<(Box<dyn Agent>, Duration)> = Vec::new();
    for kind in kinds {
        match kind {
            AgentKind::Recovery => agents.push((
                Box::new(DataRecoveryAgent::new(ctx.clone(), cfg.recovery.clone())),
                cfg.recovery.polling,
            )),
            AgentKind::FileStatus => agents.push((
                Box::new(FileStatusAgent::new(ctx.clone(), cfg.file_status.clone())),
                cfg.file_status.polling,
            )),
            AgentKind::Monitor => {
                let m = &cfg.monitor;
                let agent = MonitorAgent::new(
                    ctx.clone(),
                    m.clone(),
                    Box::new(RunitControl::new(RealFileSystem, m.runit_dir.clone())),
                    Box::new(SysinfoProcessControl::new(m.kill_grace)),
                    Box::new(TcpPinger::new(m.ping_timeout)),
                )?;
                agents.push((Box::new(agent), m.polling));
            }
        }
    }
    Ok(agents)
}

/// `--check` output: the validated configuration.
fn print_check(cfg: &ConfigFile) {
    let a = &cfg.agent;
    println!("mcprod configuration");
    println!("  agent.enabled = {}", a.enabled);
    println!("  agent.mail_to = {:?}", a.mail_to);
    println!("  agent.mail_from = {}", a.mail_from);
    println!("  agent.overrun = {:?}", a.overrun);
    println!();

    let r = &cfg.recovery;
    println!("[recovery]");
    println!("  polling = {:?}", r.polling);
    println!("  transformation_types = {:?}", r.transformation_types);
    println!("  transformation_statuses = {:?}", r.transformation_statuses);
    if !r.transformations_to_ignore.is_empty() {
        println!("  transformations_to_ignore = {:?}", r.transformations_to_ignore);
    }
    println!("  job_statuses = {:?}", r.job_statuses);
    println!("  max_reset_counter = {}", r.max_reset_counter);
    println!("  print_every_n_jobs = {}", r.print_every_n_jobs);
    println!("  shifter_role = {}", r.shifter_role);
    println!("  max_attempts = {}", r.retry.max_attempts);
    println!("  retry_backoff = {:?}", r.retry.backoff);
    println!();

    let f = &cfg.file_status;
    println!("[file_status]");
    println!("  polling = {:?}", f.polling);
    println!("  transformation_types = {:?}", f.transformation_types);
    println!("  transformation_statuses = {:?}", f.transformation_statuses);
    println!("  file_statuses = {:?}", f.file_statuses);
    println!();

    let m = &cfg.monitor;
    println!("[monitor]");
    println!("  polling = {:?}", m.polling);
    println!("  host = {}", m.host);
    println!("  runit_dir = {}", m.runit_dir.display());
    println!(
        "  restart agents/executors/services = {}/{}/{}",
        m.restart_agents, m.restart_executors, m.restart_services
    );
    println!("  commit_urls = {}", m.commit_urls);
    if !m.ignore.is_empty() {
        println!("  ignore = {:?}", m.ignore);
    }
    println!("  ping_timeout = {:?}", m.ping_timeout);
    println!("  kill_grace = {:?}", m.kill_grace);
}
