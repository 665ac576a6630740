// src/monitor/mod.rs

//! Host monitoring: keeps the components of one host alive and in their
//! configured state, and keeps service URLs in the configuration in sync.
//!
//! Each cycle:
//! - restarts agents and executors whose log went stale (executors only
//!   when they still have jobs waiting in `Checking`);
//! - restarts services that do not answer a ping;
//! - starts or stops components to match the host's `Running`/`Stopped` sets
//!   and reports installed components found in neither as unknown;
//! - adds the URL of every running service to its `URLs` entry and removes
//!   the URL of every stopped one, committing only when allowed.
//!
//! Every failure is recorded in the cycle report; the cycle always runs to
//! the end and sends one consolidated notification.

pub mod control;
pub mod ping;
pub mod process;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use crate::config::model::MonitorSection;
use crate::errors::{McProdError, Result};
use crate::exec::{Agent, CycleSummary};
use crate::host::{AgentContext, ComponentConfig, ComponentId, ComponentKind, HostSetup};

pub use control::{ComponentControl, ComponentStatus, RunitControl};
pub use ping::{ServicePinger, TcpPinger};
pub use process::{ProcessControl, SysinfoProcessControl};

const MIN_LOG_AGE: Duration = Duration::from_secs(2 * 3600);
const LOG_AGE_MARGIN: Duration = Duration::from_secs(3600);

/// Age after which a log file counts as stale for a component polling every
/// `polling`.
pub fn log_age_limit(polling: Duration) -> Duration {
    (polling + LOG_AGE_MARGIN).max(MIN_LOG_AGE)
}

pub fn service_url(host: &str, port: u16, id: &ComponentId) -> String {
    format!("dips://{host}:{port}/{}/{}", id.system, id.name)
}

fn kind_name(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Agent => "agent",
        ComponentKind::Executor => "executor",
        ComponentKind::Service => "service",
    }
}

/// What one monitoring cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub host: String,
    pub restarted: Vec<String>,
    pub started: Vec<ComponentId>,
    pub stopped: Vec<ComponentId>,
    pub unknown: Vec<ComponentId>,
    pub url_changes: Vec<String>,
    pub committed: bool,
    pub errors: Vec<String>,
}

impl MonitorReport {
    pub fn is_empty(&self) -> bool {
        self.restarted.is_empty()
            && self.started.is_empty()
            && self.stopped.is_empty()
            && self.unknown.is_empty()
            && self.url_changes.is_empty()
            && self.errors.is_empty()
    }

    fn error(&mut self, what: impl std::fmt::Display, err: &McProdError) {
        warn!(host = %self.host, error = %err, "{what}");
        self.errors.push(format!("{what}: {err}"));
    }

    pub fn subject(&self) -> String {
        format!("Monitoring report for {}", self.host)
    }

    pub fn body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Components on {}", self.host);

        let mut section = |title: &str, lines: Vec<String>| {
            if lines.is_empty() {
                return;
            }
            let _ = writeln!(out, "\n{title}:");
            for line in lines {
                let _ = writeln!(out, "  {line}");
            }
        };
        let ids = |v: &[ComponentId]| v.iter().map(ToString::to_string).collect::<Vec<_>>();

        section("Restarted", self.restarted.clone());
        section("Started", ids(&self.started));
        section("Stopped", ids(&self.stopped));
        section("Unknown (in neither Running nor Stopped)", ids(&self.unknown));
        let mut urls = self.url_changes.clone();
        if !urls.is_empty() && !self.committed {
            urls.push("(not committed)".to_string());
        }
        section("URLs", urls);
        section("Errors", self.errors.clone());
        out
    }
}

#[derive(Debug)]
pub struct MonitorAgent {
    ctx: AgentContext,
    settings: MonitorSection,
    control: Box<dyn ComponentControl>,
    processes: Box<dyn ProcessControl>,
    pinger: Box<dyn ServicePinger>,
    ignore: GlobSet,
    clock: fn() -> SystemTime,
}

impl MonitorAgent {
    pub fn new(
        ctx: AgentContext,
        settings: MonitorSection,
        control: Box<dyn ComponentControl>,
        processes: Box<dyn ProcessControl>,
        pinger: Box<dyn ServicePinger>,
    ) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &settings.ignore {
            let glob = Glob::new(pattern).map_err(|e| {
                McProdError::ConfigError(format!("invalid ignore pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| McProdError::ConfigError(format!("invalid ignore patterns: {e}")))?;

        Ok(Self {
            ctx,
            settings,
            control,
            processes,
            pinger,
            ignore,
            clock: SystemTime::now,
        })
    }

    pub fn with_clock(mut self, clock: fn() -> SystemTime) -> Self {
        self.clock = clock;
        self
    }

    fn ignored(&self, id: &ComponentId) -> bool {
        self.ignore.is_match(id.to_string())
    }

    pub fn execute_cycle(&self) -> MonitorReport {
        let host = self.settings.host.clone();
        let mut report = MonitorReport {
            host: host.clone(),
            ..MonitorReport::default()
        };
        let registry = &self.ctx.host.registry;

        let components = registry.components(&host).unwrap_or_else(|e| {
            report.error("listing configured components", &e);
            Vec::new()
        });
        let setup = registry.host_setup(&host).unwrap_or_else(|e| {
            report.error("reading host setup", &e);
            HostSetup::default()
        });
        let installed: BTreeSet<ComponentId> = match self.control.installed() {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                report.error("listing installed components", &e);
                BTreeSet::new()
            }
        };

        let mut statuses = BTreeMap::new();
        for id in &installed {
            match self.control.status(id) {
                Ok(status) => {
                    statuses.insert(id.clone(), status);
                }
                Err(e) => report.error(format_args!("status of {id}"), &e),
            }
        }

        for component in &components {
            let Some(status) = statuses.get(&component.id) else {
                continue;
            };
            if !status.running || self.ignored(&component.id) {
                continue;
            }
            self.check_health(component, *status, &mut report);
        }

        self.converge(&setup, &installed, &statuses, &mut report);
        self.sync_urls(&components, &setup, &mut report);

        if report.is_empty() {
            debug!(%host, "nothing to report");
        } else if let Err(e) = self.ctx.notify(report.subject(), report.body()) {
            warn!(%host, error = %e, "failed to send monitoring report");
        }
        report
    }

    fn check_health(&self, c: &ComponentConfig, status: ComponentStatus, report: &mut MonitorReport) {
        let reason = match c.kind {
            ComponentKind::Agent if self.settings.restart_agents => self.stale_log(c, report),
            ComponentKind::Executor if self.settings.restart_executors => {
                match self.stale_log(c, report) {
                    Some(reason) if self.has_checking_jobs(c, report) => Some(reason),
                    _ => None,
                }
            }
            ComponentKind::Service if self.settings.restart_services => c.port.and_then(|port| {
                self.pinger
                    .ping(&self.settings.host, port)
                    .err()
                    .map(|e| format!("ping failed: {e}"))
            }),
            _ => None,
        };
        let Some(reason) = reason else {
            return;
        };

        let Some(pid) = status.pid else {
            report.errors.push(format!("{} needs a restart ({reason}) but has no pid", c.id));
            return;
        };
        if !self.ctx.enabled {
            info!(component = %c.id, pid, %reason, "dry run: would restart component");
        } else if let Err(e) = self.processes.terminate(pid) {
            report.error(format_args!("restarting {}", c.id), &e);
            return;
        }
        report
            .restarted
            .push(format!("{} {} ({reason})", kind_name(c.kind), c.id));
    }

    fn stale_log(&self, c: &ComponentConfig, report: &mut MonitorReport) -> Option<String> {
        let modified = match self.control.log_modified(&c.id) {
            Ok(t) => t,
            Err(e) => {
                report.error(format_args!("log of {}", c.id), &e);
                return None;
            }
        };
        let age = (self.clock)().duration_since(modified).unwrap_or_default();
        let limit = log_age_limit(Duration::from_secs(c.polling_secs.unwrap_or(0)));
        (age > limit).then(|| format!("log not updated for {} min", age.as_secs() / 60))
    }

    fn has_checking_jobs(&self, c: &ComponentConfig, report: &mut MonitorReport) -> bool {
        let attrs = BTreeMap::from([
            ("Status".to_string(), "Checking".to_string()),
            ("MinorStatus".to_string(), c.id.name.clone()),
        ]);
        match self.ctx.host.jobs.get_jobs(&attrs) {
            Ok(jobs) => {
                debug!(component = %c.id, checking = jobs.len(), "jobs waiting for executor");
                !jobs.is_empty()
            }
            Err(e) => {
                report.error(format_args!("checking jobs of {}", c.id), &e);
                false
            }
        }
    }

    fn converge(
        &self,
        setup: &HostSetup,
        installed: &BTreeSet<ComponentId>,
        statuses: &BTreeMap<ComponentId, ComponentStatus>,
        report: &mut MonitorReport,
    ) {
        for id in &setup.running {
            if !installed.contains(id) {
                report
                    .errors
                    .push(format!("{id} is configured to run but not installed"));
                continue;
            }
            if statuses.get(id).is_some_and(|s| !s.running) {
                if !self.ctx.enabled {
                    info!(component = %id, "dry run: would start component");
                } else if let Err(e) = self.control.start(id) {
                    report.error(format_args!("starting {id}"), &e);
                    continue;
                }
                report.started.push(id.clone());
            }
        }

        for id in &setup.stopped {
            if statuses.get(id).is_some_and(|s| s.running) {
                if !self.ctx.enabled {
                    info!(component = %id, "dry run: would stop component");
                } else if let Err(e) = self.control.stop(id) {
                    report.error(format_args!("stopping {id}"), &e);
                    continue;
                }
                report.stopped.push(id.clone());
            }
        }

        report.unknown.extend(
            installed
                .iter()
                .filter(|id| !setup.running.contains(*id) && !setup.stopped.contains(*id))
                .cloned(),
        );
    }

    fn sync_urls(&self, components: &[ComponentConfig], setup: &HostSetup, report: &mut MonitorReport) {
        let registry = &self.ctx.host.registry;
        let mut changed = false;

        for c in components.iter().filter(|c| c.kind == ComponentKind::Service) {
            let Some(port) = c.port else {
                continue;
            };
            let wanted = if setup.running.contains(&c.id) {
                true
            } else if setup.stopped.contains(&c.id) {
                false
            } else {
                continue;
            };
            let url = service_url(&self.settings.host, port, &c.id);

            let mut urls = match registry.service_urls(&c.id) {
                Ok(urls) => urls,
                Err(e) => {
                    report.error(format_args!("reading URLs of {}", c.id), &e);
                    continue;
                }
            };
            let present = urls.contains(&url);
            let line = match (wanted, present) {
                (true, false) => {
                    urls.push(url.clone());
                    format!("Added URL {url} for {}", c.id)
                }
                (false, true) => {
                    urls.retain(|u| u != &url);
                    format!("Removed URL {url} for {}", c.id)
                }
                _ => continue,
            };

            if self.ctx.enabled {
                if let Err(e) = registry.set_service_urls(&c.id, &urls) {
                    report.error(format_args!("updating URLs of {}", c.id), &e);
                    continue;
                }
                changed = true;
            } else {
                info!(component = %c.id, %url, "dry run: would update service URLs");
            }
            report.url_changes.push(line);
        }

        if changed && self.settings.commit_urls {
            match registry.commit() {
                Ok(()) => report.committed = true,
                Err(e) => report.error("committing URL changes", &e),
            }
        }
    }
}

impl Agent for MonitorAgent {
    fn name(&self) -> &str {
        "Monitor"
    }

    fn execute(&mut self) -> Result<CycleSummary> {
        let report = self.execute_cycle();
        let changed = report.restarted.len()
            + report.started.len()
            + report.stopped.len()
            + report.url_changes.len();
        Ok(CycleSummary {
            examined: report.unknown.len() + changed,
            changed,
            notifications: usize::from(!report.is_empty()),
        })
    }
}
