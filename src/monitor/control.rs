// src/monitor/control.rs

//! Component supervision through runit service directories.
//!
//! Layout under the startup root, one directory per component:
//!
//! ```text
//! {root}/{System}_{Name}/supervise/stat     "run" or "down"
//! {root}/{System}_{Name}/supervise/pid
//! {root}/{System}_{Name}/supervise/control  write "u" to start, "d" to stop
//! {root}/{System}_{Name}/log/current        component log
//! ```

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::host::ComponentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentStatus {
    pub running: bool,
    pub pid: Option<u32>,
}

pub trait ComponentControl: Send + Sync + Debug {
    /// Components with a service directory on this host.
    fn installed(&self) -> Result<Vec<ComponentId>>;

    fn status(&self, id: &ComponentId) -> Result<ComponentStatus>;

    fn start(&self, id: &ComponentId) -> Result<()>;

    fn stop(&self, id: &ComponentId) -> Result<()>;

    /// Modification time of the component's current log file.
    fn log_modified(&self, id: &ComponentId) -> Result<SystemTime>;
}

#[derive(Debug, Clone)]
pub struct RunitControl<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> RunitControl<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    fn dir(&self, id: &ComponentId) -> PathBuf {
        self.root.join(id.runit_name())
    }

    fn control(&self, id: &ComponentId, command: &[u8]) -> Result<()> {
        let path = self.dir(id).join("supervise").join("control");
        self.fs
            .write(&path, command)
            .with_context(|| format!("sending control command to {id}"))?;
        debug!(component = %id, command = %String::from_utf8_lossy(command), "runit control");
        Ok(())
    }
}

fn component_from_dir(path: &Path) -> Option<ComponentId> {
    let name = path.file_name()?.to_str()?;
    let (system, component) = name.split_once('_')?;
    if system.is_empty() || component.is_empty() {
        return None;
    }
    Some(ComponentId::new(system, component))
}

impl<F: FileSystem> ComponentControl for RunitControl<F> {
    fn installed(&self) -> Result<Vec<ComponentId>> {
        let mut ids: Vec<ComponentId> = self
            .fs
            .read_dir(&self.root)?
            .iter()
            .filter(|p| self.fs.is_dir(p))
            .filter_map(|p| component_from_dir(p))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn status(&self, id: &ComponentId) -> Result<ComponentStatus> {
        let supervise = self.dir(id).join("supervise");
        let stat = self
            .fs
            .read_to_string(&supervise.join("stat"))
            .with_context(|| format!("reading runit status of {id}"))?;
        let running = stat.trim() == "run";
        let pid = if running {
            self.fs
                .read_to_string(&supervise.join("pid"))
                .ok()
                .and_then(|p| p.trim().parse().ok())
        } else {
            None
        };
        Ok(ComponentStatus { running, pid })
    }

    fn start(&self, id: &ComponentId) -> Result<()> {
        self.control(id, b"u")
    }

    fn stop(&self, id: &ComponentId) -> Result<()> {
        self.control(id, b"d")
    }

    fn log_modified(&self, id: &ComponentId) -> Result<SystemTime> {
        let path = self.dir(id).join("log").join("current");
        Ok(self.fs.modified(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn runit() -> (MockFileSystem, RunitControl<MockFileSystem>) {
        let fs = MockFileSystem::new();
        fs.add_file("/opt/startup/WorkloadManagement_JobCleaningAgent/supervise/stat", "run\n");
        fs.add_file("/opt/startup/WorkloadManagement_JobCleaningAgent/supervise/pid", "4242\n");
        fs.add_file("/opt/startup/Production_ProductionManager/supervise/stat", "down\n");
        fs.add_file("/opt/startup/README", "not a component");
        (fs.clone(), RunitControl::new(fs, "/opt/startup"))
    }

    #[test]
    fn lists_installed_components() {
        let (_, control) = runit();
        assert_eq!(
            control.installed().unwrap(),
            vec![
                ComponentId::new("Production", "ProductionManager"),
                ComponentId::new("WorkloadManagement", "JobCleaningAgent"),
            ]
        );
    }

    #[test]
    fn reads_status_and_pid() {
        let (_, control) = runit();
        let running = control
            .status(&ComponentId::new("WorkloadManagement", "JobCleaningAgent"))
            .unwrap();
        assert_eq!(running, ComponentStatus { running: true, pid: Some(4242) });

        let down = control
            .status(&ComponentId::new("Production", "ProductionManager"))
            .unwrap();
        assert!(!down.running);
    }

    #[test]
    fn start_and_stop_write_control_commands() {
        let (fs, control) = runit();
        let id = ComponentId::new("Production", "ProductionManager");
        control.start(&id).unwrap();
        control.stop(&id).unwrap();

        let writes = fs.writes();
        let control_path = PathBuf::from("/opt/startup/Production_ProductionManager/supervise/control");
        assert_eq!(writes, vec![(control_path.clone(), b"u".to_vec()), (control_path, b"d".to_vec())]);
    }
}
