#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use mcprod::errors::{McProdError, Result};
use mcprod::exec::{Agent, CycleSummary};
use mcprod::monitor::{ProcessControl, ServicePinger};

/// Process control that only records which pids it was asked to terminate.
#[derive(Debug, Clone, Default)]
pub struct RecordingProcesses {
    terminated: Arc<Mutex<Vec<u32>>>,
}

impl RecordingProcesses {
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingProcesses {
    fn terminate(&self, pid: u32) -> Result<()> {
        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }
}

/// Pinger answering on every port except the ones marked dead.
#[derive(Debug, Clone, Default)]
pub struct StaticPinger {
    dead_ports: BTreeSet<u16>,
}

impl StaticPinger {
    pub fn with_dead(ports: &[u16]) -> Self {
        Self {
            dead_ports: ports.iter().copied().collect(),
        }
    }
}

impl ServicePinger for StaticPinger {
    fn ping(&self, host: &str, port: u16) -> Result<()> {
        if self.dead_ports.contains(&port) {
            Err(McProdError::host("ping", format!("{host}:{port} refused")))
        } else {
            Ok(())
        }
    }
}

/// Agent counting its cycles; fails every cycle when `fail` is set.
#[derive(Debug, Clone)]
pub struct CountingAgent {
    name: String,
    cycles: Arc<Mutex<u32>>,
    fail: bool,
}

impl CountingAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cycles: Arc::new(Mutex::new(0)),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn cycles(&self) -> u32 {
        *self.cycles.lock().unwrap()
    }
}

impl Agent for CountingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> Result<CycleSummary> {
        *self.cycles.lock().unwrap() += 1;
        if self.fail {
            return Err(McProdError::host("test", "cycle failed"));
        }
        Ok(CycleSummary {
            examined: 1,
            ..CycleSummary::default()
        })
    }
}
