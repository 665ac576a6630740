#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use mcprod::config::model::{FileStatusSection, RecoverySection};
use mcprod::host::memory::InMemoryHost;
use mcprod::host::{
    AgentContext, HostClients, MailSettings, Request, Transformation, TransformationFile,
    TransformationTask,
};
use mcprod::recovery::RetryPolicy;
use mcprod::transformation::TransformationBody;
use mcprod::types::{
    job_group, FileId, FileStatus, JobId, JobStatus, RequestStatus, TaskId, TransId,
    TransformationStatus, TransformationType,
};

/// Storage element every seeded replica lives on.
pub const TEST_SE: &str = "DESY-SRM";

/// Builder for an `InMemoryHost` populated with transformations and jobs.
pub struct World {
    host: InMemoryHost,
    next_file_id: FileId,
}

impl World {
    pub fn new() -> Self {
        Self {
            host: InMemoryHost::new(),
            next_file_id: 1,
        }
    }

    pub fn host(&self) -> &InMemoryHost {
        &self.host
    }

    /// An Active production transformation with an empty workflow body.
    pub fn transformation(self, trans_id: TransId, trans_type: TransformationType) -> Self {
        let body = TransformationBody::Workflow { steps: Vec::new() }
            .to_toml()
            .expect("workflow body serializes");
        self.host.add_transformation_record(Transformation {
            id: trans_id,
            name: format!("prod_{trans_id}"),
            trans_type,
            status: TransformationStatus::Active,
            body,
            input_query: BTreeMap::new(),
            group: "ILD".to_string(),
        });
        self
    }

    /// An Active Replication or Moving transformation between two SEs.
    pub fn transfer(
        self,
        trans_id: TransId,
        trans_type: TransformationType,
        source: &str,
        target: &str,
    ) -> Self {
        let body = TransformationBody::Transfer {
            source_ses: vec![source.to_string()],
            target_ses: vec![target.to_string()],
        }
        .to_toml()
        .expect("transfer body serializes");
        self.host.add_storage_element(source);
        self.host.add_storage_element(target);
        self.host.add_transformation_record(Transformation {
            id: trans_id,
            name: format!("transfer_{trans_id}"),
            trans_type,
            status: TransformationStatus::Active,
            body,
            input_query: BTreeMap::new(),
            group: "ILD".to_string(),
        });
        self
    }

    /// Register a job, its task and (for input-consuming jobs) its input file.
    ///
    /// The first task registered for an input owns it in the file table,
    /// unless a later one is built with [`JobSpec::owns_input`].
    pub fn job(mut self, spec: JobSpec) -> Self {
        let file_id = spec.input.as_ref().map(|input| {
            match self.host.file(spec.trans_id, &input.lfn) {
                Some(mut existing) => {
                    if input.owner {
                        existing.task_id = Some(spec.task_id);
                        self.host.add_file(existing.clone());
                    }
                    existing.file_id
                }
                None => {
                    let file_id = self.next_file_id;
                    self.next_file_id += 1;
                    self.host.add_file(TransformationFile {
                        trans_id: spec.trans_id,
                        file_id,
                        lfn: input.lfn.clone(),
                        status: input.status,
                        error_count: input.error_count,
                        last_update: Utc::now(),
                        task_id: Some(spec.task_id),
                    });
                    if input.in_catalog {
                        self.host.add_catalog_file(&input.lfn, &[TEST_SE]);
                    }
                    file_id
                }
            }
        });

        self.host.add_task(TransformationTask {
            trans_id: spec.trans_id,
            task_id: spec.task_id,
            file_id,
            external_id: spec.job_id,
            external_status: spec.status,
            last_update: Utc::now(),
        });

        for (lfn, exists) in &spec.outputs {
            if *exists {
                self.host.add_catalog_file(lfn, &[TEST_SE]);
            }
        }

        let input_lfn = spec.input.as_ref().map(|i| i.lfn.as_str());
        let outputs: Vec<&str> = spec.outputs.iter().map(|(lfn, _)| lfn.as_str()).collect();
        self.host.add_job(
            spec.job_id,
            &job_group(spec.trans_id),
            spec.status,
            jdl(spec.trans_id, spec.task_id, input_lfn, &outputs),
            BTreeMap::new(),
        );

        if let Some(status) = spec.request {
            self.host.add_request(Request {
                request_id: spec.job_id * 10,
                name: format!("job_{}", spec.job_id),
                job_id: Some(spec.job_id),
                status,
                lfns: Vec::new(),
            });
        }
        self
    }

    pub fn build(self) -> InMemoryHost {
        self.host
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct InputSpec {
    pub lfn: String,
    pub status: FileStatus,
    pub in_catalog: bool,
    pub error_count: u32,
    /// Take over the file row of an input already registered by another task.
    pub owner: bool,
}

/// One production job as seen by the recovery agent.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub trans_id: TransId,
    pub job_id: JobId,
    pub task_id: TaskId,
    pub status: JobStatus,
    pub input: Option<InputSpec>,
    /// Output LFN and whether it is registered in the catalog.
    pub outputs: Vec<(String, bool)>,
    pub request: Option<RequestStatus>,
}

impl JobSpec {
    pub fn new(trans_id: TransId, job_id: JobId, task_id: TaskId, status: JobStatus) -> Self {
        Self {
            trans_id,
            job_id,
            task_id,
            status,
            input: None,
            outputs: Vec::new(),
            request: None,
        }
    }

    pub fn input(mut self, lfn: &str, status: FileStatus) -> Self {
        self.input = Some(InputSpec {
            lfn: lfn.to_string(),
            status,
            in_catalog: true,
            error_count: 0,
            owner: false,
        });
        self
    }

    /// Input known to the transformation but gone from the catalog.
    pub fn missing_input(mut self, lfn: &str, status: FileStatus) -> Self {
        self.input = Some(InputSpec {
            lfn: lfn.to_string(),
            status,
            in_catalog: false,
            error_count: 0,
            owner: false,
        });
        self
    }

    pub fn error_count(mut self, count: u32) -> Self {
        if let Some(input) = self.input.as_mut() {
            input.error_count = count;
        }
        self
    }

    pub fn owns_input(mut self) -> Self {
        if let Some(input) = self.input.as_mut() {
            input.owner = true;
        }
        self
    }

    pub fn output(mut self, lfn: &str, exists: bool) -> Self {
        self.outputs.push((lfn.to_string(), exists));
        self
    }

    pub fn request(mut self, status: RequestStatus) -> Self {
        self.request = Some(status);
        self
    }
}

/// Job description in the shape the production jobs carry.
pub fn jdl(trans_id: TransId, task_id: TaskId, input: Option<&str>, outputs: &[&str]) -> String {
    let mut lines = vec![
        format!("  JobGroup = \"{}\";", job_group(trans_id)),
        format!("  TaskID = {task_id};"),
    ];
    if let Some(lfn) = input {
        lines.push(format!("  InputData = {{\"LFN:{lfn}\"}};"));
    }
    let quoted: Vec<String> = outputs.iter().map(|o| format!("\"{o}\"")).collect();
    lines.push(format!("  ProductionOutputData = {{{}}};", quoted.join(", ")));
    format!("[\n{}\n]", lines.join("\n"))
}

/// Context whose notifier is the host itself, so sent mails can be inspected.
pub fn context(host: &InMemoryHost, enabled: bool) -> AgentContext {
    let shared = Arc::new(host.clone());
    AgentContext {
        enabled,
        host: HostClients::from_single(shared.clone()),
        notifier: shared,
        mail: MailSettings {
            to: vec!["ilc-dirac@cern.ch".to_string()],
            from: "mcprod@cern.ch".to_string(),
        },
    }
}

/// Recovery settings with instant retries.
pub fn recovery_settings() -> RecoverySection {
    RecoverySection {
        retry: RetryPolicy::immediate(3),
        ..RecoverySection::default()
    }
}

pub fn file_status_settings() -> FileStatusSection {
    FileStatusSection::default()
}
