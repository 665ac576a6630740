// src/host/mod.rs

//! Capability set of the host workload manager.
//!
//! The agents never talk to the grid middleware directly; they depend only on
//! the client traits below. Production deployments plug in RPC-backed
//! clients, tests and the `--state` mode use [`memory::InMemoryHost`].
//!
//! - [`TransformationClient`]: transformations, their files and tasks.
//! - [`JobMonitoringClient`]: job attributes, descriptions and logging.
//! - [`FileCatalogClient`]: LFN existence, replicas, lineage and metadata.
//! - [`RequestManagerClient`]: deferred requests attached to jobs.
//! - [`StorageElementClient`]: physical presence and removal on an SE.
//! - [`IdentityProvider`]: temporary shifter credentials.
//! - [`Notifier`]: plain-text notification mails.
//! - [`ComponentRegistry`]: per-host component configuration (monitoring).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{McProdError, Result};
use crate::types::{
    FileId, FileStatus, JobId, JobStatus, RequestId, RequestStatus, TaskId, TransId,
    TransformationStatus, TransformationType,
};

pub mod memory;
pub mod snapshot;

/// Directory or file level user metadata.
pub type Metadata = BTreeMap<String, String>;

/// Result of a batch call: per-key successes and per-key failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult<T, K: Ord = String> {
    pub successful: BTreeMap<K, T>,
    pub failed: BTreeMap<K, String>,
}

impl<T, K: Ord> Default for BatchResult<T, K> {
    fn default() -> Self {
        Self {
            successful: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// Turn a non-empty `failed` map into [`McProdError::PartialCatalog`].
    pub fn into_result(self) -> Result<BTreeMap<String, T>> {
        if self.failed.is_empty() {
            Ok(self.successful)
        } else {
            Err(McProdError::PartialCatalog {
                failed: self.failed,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    pub id: TransId,
    pub name: String,
    #[serde(rename = "type")]
    pub trans_type: TransformationType,
    pub status: TransformationStatus,
    /// Serialized [`crate::transformation::TransformationBody`].
    #[serde(default)]
    pub body: String,
    /// Metadata query selecting the input files.
    #[serde(default)]
    pub input_query: Metadata,
    #[serde(default)]
    pub group: String,
}

/// Parameters for registering a new transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransformation {
    pub name: String,
    pub trans_type: TransformationType,
    pub body: String,
    pub input_query: Metadata,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationFile {
    pub trans_id: TransId,
    pub file_id: FileId,
    pub lfn: String,
    pub status: FileStatus,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
    /// Most recent task that consumed this file.
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationTask {
    pub trans_id: TransId,
    pub task_id: TaskId,
    #[serde(default)]
    pub file_id: Option<FileId>,
    /// Job id for production tasks, request id for data-management tasks.
    pub external_id: u64,
    pub external_status: JobStatus,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformationFilter {
    pub ids: Vec<TransId>,
    pub types: Vec<TransformationType>,
    pub statuses: Vec<TransformationStatus>,
}

impl TransformationFilter {
    pub fn matches(&self, t: &Transformation) -> bool {
        (self.ids.is_empty() || self.ids.contains(&t.id))
            && (self.types.is_empty() || self.types.contains(&t.trans_type))
            && (self.statuses.is_empty() || self.statuses.contains(&t.status))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub trans_id: TransId,
    pub statuses: Vec<FileStatus>,
    pub lfns: Vec<String>,
}

impl FileFilter {
    pub fn for_transformation(trans_id: TransId) -> Self {
        Self {
            trans_id,
            ..Self::default()
        }
    }

    pub fn matches(&self, f: &TransformationFile) -> bool {
        f.trans_id == self.trans_id
            && (self.statuses.is_empty() || self.statuses.contains(&f.status))
            && (self.lfns.is_empty() || self.lfns.contains(&f.lfn))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub trans_id: TransId,
    pub task_ids: Vec<TaskId>,
}

/// Entry appended to a job's logging history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingRecord {
    pub status: String,
    pub minor_status: String,
    pub source: String,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub status: RequestStatus,
    #[serde(default)]
    pub lfns: Vec<String>,
}

/// A temporarily assumed production-role credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShifterIdentity {
    pub role: String,
    pub subject: String,
}

/// A plain-text notification mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Kind of a monitored component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Agent,
    Executor,
    Service,
}

/// `System/Name` pair identifying a component instance on a host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    pub system: String,
    pub name: String,
}

impl ComponentId {
    pub fn new(system: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            name: name.into(),
        }
    }

    /// Name of the runit service directory (`System_Name`).
    pub fn runit_name(&self) -> String {
        format!("{}_{}", self.system, self.name)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system, self.name)
    }
}

/// Configuration of one component installed on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: ComponentId,
    pub kind: ComponentKind,
    /// Polling time in seconds (agents and executors).
    #[serde(default)]
    pub polling_secs: Option<u64>,
    /// Listening port (services).
    #[serde(default)]
    pub port: Option<u16>,
}

/// Desired running state of components on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSetup {
    #[serde(default)]
    pub running: BTreeSet<ComponentId>,
    #[serde(default)]
    pub stopped: BTreeSet<ComponentId>,
}

pub trait TransformationClient: Send + Sync + Debug {
    fn get_transformations(&self, filter: &TransformationFilter) -> Result<Vec<Transformation>>;

    fn get_transformation_files(&self, filter: &FileFilter) -> Result<Vec<TransformationFile>>;

    fn get_transformation_tasks(&self, filter: &TaskFilter) -> Result<Vec<TransformationTask>>;

    /// Selected parameters (`TransformationName`, `Type`, `Status`, `Body`,
    /// `TransformationGroup`) of one transformation.
    fn get_transformation_parameters(
        &self,
        trans_id: TransId,
        keys: &[&str],
    ) -> Result<BTreeMap<String, String>>;

    /// Without `force`, files already `Processed` are left untouched and
    /// reported as failed.
    fn set_file_status_for_transformation(
        &self,
        trans_id: TransId,
        status: FileStatus,
        lfns: &[String],
        force: bool,
    ) -> Result<BatchResult<()>>;

    fn set_task_status(&self, trans_name: &str, task_id: TaskId, status: JobStatus) -> Result<()>;

    fn add_transformation(&self, new: NewTransformation) -> Result<TransId>;
}

pub trait JobMonitoringClient: Send + Sync + Debug {
    /// Ids of all jobs whose attributes match every pair of `attrs`.
    fn get_jobs(&self, attrs: &BTreeMap<String, String>) -> Result<Vec<JobId>>;

    fn get_job_jdl(&self, job_id: JobId) -> Result<String>;

    fn get_job_attributes(&self, job_id: JobId, keys: &[&str]) -> Result<BTreeMap<String, String>>;

    fn set_job_attribute(&self, job_id: JobId, key: &str, value: &str, update: bool) -> Result<()>;

    fn add_logging_record(&self, job_id: JobId, record: LoggingRecord) -> Result<()>;
}

pub trait FileCatalogClient: Send + Sync + Debug {
    fn exists(&self, lfns: &[String]) -> Result<BatchResult<bool>>;

    /// SE name to physical file name, per LFN.
    fn get_replicas(&self, lfns: &[String]) -> Result<BatchResult<BTreeMap<String, String>>>;

    /// Descendants at every depth listed in `depths` (1 = direct children).
    fn get_file_descendents(&self, lfns: &[String], depths: &[u32]) -> Result<BatchResult<Vec<String>>>;

    fn remove_file(&self, lfns: &[String]) -> Result<BatchResult<()>>;

    fn get_directory_user_metadata(&self, dir: &str) -> Result<Metadata>;

    fn find_directories_by_metadata(&self, query: &Metadata) -> Result<Vec<String>>;

    fn find_files_by_metadata(&self, query: &Metadata, basepath: &str) -> Result<Vec<String>>;

    fn get_file_user_metadata(&self, lfn: &str) -> Result<Metadata>;

    fn create_directory(&self, dir: &str) -> Result<()>;

    fn set_metadata(&self, path: &str, meta: &Metadata) -> Result<()>;
}

pub trait RequestManagerClient: Send + Sync + Debug {
    fn read_requests_for_jobs(&self, job_ids: &[JobId]) -> Result<BatchResult<Request, JobId>>;

    fn get_request(&self, request_id: RequestId) -> Result<Option<Request>>;

    fn reset_failed_request(&self, request_id: RequestId) -> Result<()>;
}

pub trait StorageElementClient: Send + Sync + Debug {
    fn exists(&self, se: &str, lfns: &[String]) -> Result<BatchResult<bool>>;

    fn remove_file(&self, se: &str, lfns: &[String]) -> Result<BatchResult<()>>;
}

pub trait IdentityProvider: Send + Sync + Debug {
    fn acquire(&self, role: &str) -> Result<ShifterIdentity>;

    fn release(&self, identity: &ShifterIdentity);
}

pub trait Notifier: Send + Sync + Debug {
    fn send(&self, notification: &Notification) -> Result<()>;
}

pub trait ComponentRegistry: Send + Sync + Debug {
    fn components(&self, host: &str) -> Result<Vec<ComponentConfig>>;

    fn host_setup(&self, host: &str) -> Result<HostSetup>;

    fn service_urls(&self, id: &ComponentId) -> Result<Vec<String>>;

    /// Stage a new `URLs` value; visible to readers only after [`commit`](Self::commit).
    fn set_service_urls(&self, id: &ComponentId, urls: &[String]) -> Result<()>;

    fn commit(&self) -> Result<()>;
}

/// Notifier that only writes the mail to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            to = ?notification.to,
            subject = %notification.subject,
            "notification:\n{}",
            notification.body
        );
        Ok(())
    }
}

/// The full set of clients the agents work with.
#[derive(Debug, Clone)]
pub struct HostClients {
    pub transformations: Arc<dyn TransformationClient>,
    pub jobs: Arc<dyn JobMonitoringClient>,
    pub catalog: Arc<dyn FileCatalogClient>,
    pub requests: Arc<dyn RequestManagerClient>,
    pub storage: Arc<dyn StorageElementClient>,
    pub identity: Arc<dyn IdentityProvider>,
    pub registry: Arc<dyn ComponentRegistry>,
}

impl HostClients {
    /// Use one object implementing every client trait.
    pub fn from_single<H>(host: Arc<H>) -> Self
    where
        H: TransformationClient
            + JobMonitoringClient
            + FileCatalogClient
            + RequestManagerClient
            + StorageElementClient
            + IdentityProvider
            + ComponentRegistry
            + 'static,
    {
        Self {
            transformations: host.clone(),
            jobs: host.clone(),
            catalog: host.clone(),
            requests: host.clone(),
            storage: host.clone(),
            identity: host.clone(),
            registry: host,
        }
    }
}

/// Mail routing shared by every agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailSettings {
    pub to: Vec<String>,
    pub from: String,
}

/// Explicit per-process context handed to every agent.
///
/// Created once at start-up; holds everything that would otherwise be
/// process-wide mutable state.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// When false, mutations are logged but not executed.
    pub enabled: bool,
    pub host: HostClients,
    pub notifier: Arc<dyn Notifier>,
    pub mail: MailSettings,
}

impl AgentContext {
    pub fn notify(&self, subject: impl Into<String>, body: impl Into<String>) -> Result<()> {
        let notification = Notification {
            to: self.mail.to.clone(),
            from: self.mail.from.clone(),
            subject: subject.into(),
            body: body.into(),
        };
        self.notifier.send(&notification)
    }
}
