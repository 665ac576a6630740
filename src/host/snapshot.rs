// src/host/snapshot.rs

//! TOML snapshot of a whole host world, loaded into an [`InMemoryHost`].
//!
//! Used by `--state` to run the agents against a recorded production state.
//!
//! ```toml
//! [[transformations]]
//! id = 12
//! name = "ild_rec_500"
//! type = "MCReconstruction"
//! status = "Active"
//!
//! [[jobs]]
//! job_id = 4711
//! trans_id = 12
//! status = "Failed"
//! jdl = '[ TaskID = 3; InputData = {"LFN:/ilc/sim/f.slcio"}; ]'
//!
//! [[catalog]]
//! lfn = "/ilc/sim/f.slcio"
//! ses = ["CERN-SRM"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::memory::InMemoryHost;
use super::{
    ComponentConfig, ComponentId, FileCatalogClient, HostSetup, Metadata, Request, Transformation,
    TransformationFile, TransformationTask,
};
use crate::errors::{McProdError, Result};
use crate::types::{job_group, JobId, JobStatus, TransId};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub files: Vec<TransformationFile>,
    #[serde(default)]
    pub tasks: Vec<TransformationTask>,
    #[serde(default)]
    pub jobs: Vec<SnapshotJob>,
    #[serde(default)]
    pub catalog: Vec<SnapshotCatalogFile>,
    #[serde(default)]
    pub directories: Vec<SnapshotDirectory>,
    #[serde(default)]
    pub requests: Vec<Request>,
    #[serde(default)]
    pub components: Vec<SnapshotComponent>,
    /// Host name -> desired component states.
    #[serde(default)]
    pub setups: BTreeMap<String, HostSetup>,
    #[serde(default)]
    pub urls: Vec<SnapshotUrls>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotJob {
    pub job_id: JobId,
    pub trans_id: TransId,
    pub status: JobStatus,
    #[serde(default)]
    pub jdl: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotCatalogFile {
    pub lfn: String,
    #[serde(default)]
    pub ses: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub descendants: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotDirectory {
    pub path: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotComponent {
    pub host: String,
    #[serde(flatten)]
    pub config: ComponentConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotUrls {
    pub system: String,
    pub name: String,
    pub urls: Vec<String>,
}

impl Snapshot {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build a fresh in-memory host holding this snapshot.
    pub fn into_host(self) -> Result<InMemoryHost> {
        let host = InMemoryHost::new();

        for t in self.transformations {
            host.add_transformation_record(t);
        }
        for f in self.files {
            host.add_file(f);
        }
        for t in self.tasks {
            host.add_task(t);
        }
        for j in self.jobs {
            host.add_job(j.job_id, &job_group(j.trans_id), j.status, j.jdl, j.attributes);
        }
        for d in self.directories {
            host.set_metadata(&d.path, &d.metadata)?;
        }
        for c in self.catalog {
            let ses: Vec<&str> = c.ses.iter().map(String::as_str).collect();
            host.add_catalog_file(&c.lfn, &ses);
            if !c.metadata.is_empty() {
                host.set_file_metadata(&c.lfn, c.metadata);
            }
            for child in &c.descendants {
                host.add_descendant(&c.lfn, child);
            }
        }
        for r in self.requests {
            host.add_request(r);
        }
        for c in self.components {
            if c.host.is_empty() {
                return Err(McProdError::ConfigError(format!(
                    "component {} has an empty host name",
                    c.config.id
                )));
            }
            host.add_component(&c.host, c.config);
        }
        for (name, setup) in self.setups {
            host.set_host_setup(&name, setup);
        }
        for u in self.urls {
            host.set_committed_urls(&ComponentId::new(u.system, u.name), u.urls);
        }

        Ok(host)
    }
}

/// Read and load a snapshot file.
pub fn load_snapshot(path: &Path) -> Result<InMemoryHost> {
    let text = fs::read_to_string(path)?;
    let snapshot = Snapshot::parse(&text)?;
    info!(
        path = %path.display(),
        transformations = snapshot.transformations.len(),
        jobs = snapshot.jobs.len(),
        lfns = snapshot.catalog.len(),
        "loaded host snapshot"
    );
    snapshot.into_host()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::JobMonitoringClient;
    use crate::types::FileStatus;

    const WORLD: &str = r#"
        [[transformations]]
        id = 12
        name = "ild_rec_500"
        type = "MCReconstruction"
        status = "Active"

        [[files]]
        trans_id = 12
        file_id = 1
        lfn = "/ilc/sim/f.slcio"
        status = "Assigned"
        task_id = 3

        [[jobs]]
        job_id = 4711
        trans_id = 12
        status = "Failed"
        jdl = '[ TaskID = 3; ]'

        [[catalog]]
        lfn = "/ilc/sim/f.slcio"
        ses = ["CERN-SRM"]
        descendants = ["/ilc/rec/f.slcio"]

        [[directories]]
        path = "/ilc/sim"
        metadata = { Datatype = "SIM" }

        [[components]]
        host = "prod1"
        id = { system = "Production", name = "DataRecovery" }
        kind = "Agent"
        polling_secs = 3600

        [setups.prod1]
        running = [{ system = "Production", name = "DataRecovery" }]
    "#;

    #[test]
    fn snapshot_populates_every_store() {
        let host = Snapshot::parse(WORLD).unwrap().into_host().unwrap();

        assert_eq!(host.file_status(12, "/ilc/sim/f.slcio"), Some(FileStatus::Assigned));
        assert_eq!(host.job_status(4711).as_deref(), Some("Failed"));
        let attrs = host.get_job_attributes(4711, &["JobGroup"]).unwrap();
        assert_eq!(attrs["JobGroup"], "00000012");
        assert!(host.catalog_contains("/ilc/sim/f.slcio"));
        assert!(host.storage_contains("CERN-SRM", "/ilc/sim/f.slcio"));
        let desc = host
            .get_file_descendents(&["/ilc/sim/f.slcio".to_string()], &[1])
            .unwrap();
        assert_eq!(desc.successful["/ilc/sim/f.slcio"], vec!["/ilc/rec/f.slcio".to_string()]);
        assert_eq!(
            host.directory_metadata("/ilc/sim").unwrap()["Datatype"],
            "SIM"
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Snapshot::parse("[[jobs]]\njob_id = 1\ntrans_id = 1\nstatus = \"Done\"\nbogus = 1\n")
            .unwrap_err();
        assert!(matches!(err, McProdError::TomlError(_)));
    }
}
