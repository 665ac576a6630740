// src/monitor/process.rs

use std::fmt::Debug;
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, Signal, System};
use tracing::{debug, info, warn};

use crate::errors::{McProdError, Result};

const POLL: Duration = Duration::from_millis(100);

/// Terminates component processes so that their supervisor respawns them.
pub trait ProcessControl: Send + Sync + Debug {
    /// Send SIGTERM, wait up to the grace period, then SIGKILL.
    /// A process that is already gone is not an error.
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Process-table access through `sysinfo`.
#[derive(Debug, Clone)]
pub struct SysinfoProcessControl {
    grace: Duration,
}

impl SysinfoProcessControl {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl ProcessControl for SysinfoProcessControl {
    fn terminate(&self, pid: u32) -> Result<()> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(pid) {
            debug!(%pid, "process already gone");
            return Ok(());
        }

        let Some(process) = system.process(pid) else {
            return Ok(());
        };
        info!(%pid, name = %process.name(), "sending SIGTERM");
        if process.kill_with(Signal::Term) != Some(true) {
            warn!(%pid, "SIGTERM not delivered, falling back to SIGKILL");
        } else {
            let deadline = Instant::now() + self.grace;
            while Instant::now() < deadline {
                thread::sleep(POLL);
                if !system.refresh_process(pid) {
                    debug!(%pid, "process exited after SIGTERM");
                    return Ok(());
                }
            }
        }

        match system.process(pid) {
            Some(process) => {
                info!(%pid, "sending SIGKILL");
                if process.kill() {
                    Ok(())
                } else {
                    Err(McProdError::Process(format!("could not kill process {pid}")))
                }
            }
            None => Ok(()),
        }
    }
}
