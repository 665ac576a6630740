// src/host/memory.rs

//! In-memory implementation of every host client trait.
//!
//! `InMemoryHost` keeps the transformation store, job database, file catalog,
//! request store, storage elements and component configuration behind one
//! `Arc<Mutex<_>>`, so clones share state. It supports failure injection
//! (per-LFN catalog failures, failing the next N calls of an operation,
//! refusing shifter identities) for exercising the recovery paths.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use super::{
    BatchResult, ComponentConfig, ComponentId, ComponentRegistry, FileCatalogClient, FileFilter,
    HostSetup, IdentityProvider, JobMonitoringClient, LoggingRecord, Metadata, NewTransformation,
    Notification, Notifier, Request, RequestManagerClient, ShifterIdentity, StorageElementClient,
    TaskFilter, Transformation, TransformationClient, TransformationFile, TransformationFilter,
    TransformationTask,
};
use crate::errors::{McProdError, Result};
use crate::types::{
    FileStatus, JobId, JobStatus, RequestId, RequestStatus, TaskId, TransId, TransformationStatus,
};

/// A job as stored in the job database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRecord {
    pub jdl: String,
    /// All attributes, including `Status`, `MinorStatus` and `JobGroup`.
    pub attributes: BTreeMap<String, String>,
    pub logging: Vec<LoggingRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CatalogEntry {
    replicas: BTreeMap<String, String>,
    metadata: Metadata,
}

/// Parent/child relations between LFNs.
#[derive(Debug, Default)]
struct Lineage {
    graph: DiGraphMap<u32, ()>,
    ids: BTreeMap<String, u32>,
    names: BTreeMap<u32, String>,
    next: u32,
}

impl Lineage {
    fn node(&mut self, lfn: &str) -> u32 {
        if let Some(id) = self.ids.get(lfn) {
            return *id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(lfn.to_string(), id);
        self.names.insert(id, lfn.to_string());
        self.graph.add_node(id);
        id
    }

    fn add_child(&mut self, parent: &str, child: &str) {
        let p = self.node(parent);
        let c = self.node(child);
        self.graph.add_edge(p, c, ());
    }

    fn remove(&mut self, lfn: &str) {
        if let Some(id) = self.ids.remove(lfn) {
            self.names.remove(&id);
            self.graph.remove_node(id);
        }
    }

    /// Descendants found exactly at one of `depths` generations below `lfn`.
    fn descendants(&self, lfn: &str, depths: &[u32]) -> Vec<String> {
        let Some(&start) = self.ids.get(lfn) else {
            return Vec::new();
        };
        let max_depth = depths.iter().copied().max().unwrap_or(0);

        let mut found = Vec::new();
        let mut seen: BTreeSet<u32> = BTreeSet::from([start]);
        let mut queue: VecDeque<(u32, u32)> = VecDeque::from([(start, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if !seen.insert(child) {
                    continue;
                }
                if depths.contains(&(depth + 1)) {
                    if let Some(name) = self.names.get(&child) {
                        found.push(name.clone());
                    }
                }
                queue.push_back((child, depth + 1));
            }
        }

        found
    }
}

#[derive(Debug, Default)]
struct Failures {
    /// LFNs for which catalog lookups land in the `failed` map.
    catalog_lfns: BTreeSet<String>,
    /// Operation name -> number of upcoming calls that fail.
    next_calls: BTreeMap<String, u32>,
    refuse_identity: bool,
}

#[derive(Debug, Default)]
struct HostState {
    transformations: BTreeMap<TransId, Transformation>,
    files: BTreeMap<(TransId, String), TransformationFile>,
    tasks: BTreeMap<(TransId, TaskId), TransformationTask>,
    jobs: BTreeMap<JobId, JobRecord>,
    catalog: BTreeMap<String, CatalogEntry>,
    directories: BTreeMap<String, Metadata>,
    lineage: Lineage,
    requests: BTreeMap<RequestId, Request>,
    storage: BTreeMap<String, BTreeSet<String>>,
    components: BTreeMap<String, Vec<ComponentConfig>>,
    setups: BTreeMap<String, HostSetup>,
    urls: BTreeMap<ComponentId, Vec<String>>,
    staged_urls: BTreeMap<ComponentId, Vec<String>>,
    commits: u32,
    active_identities: u32,
    sent: Vec<Notification>,
    failures: Failures,
}

impl HostState {
    fn check_failure(&mut self, op: &'static str) -> Result<()> {
        if let Some(remaining) = self.failures.next_calls.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                debug!(op, remaining = *remaining, "injected host failure");
                return Err(McProdError::host(op, "injected failure"));
            }
        }
        Ok(())
    }

    /// Directory metadata including everything inherited from parents.
    fn effective_dir_metadata(&self, dir: &str) -> Metadata {
        let mut meta = Metadata::new();
        let mut prefix = String::new();
        for part in dir.trim_end_matches('/').split('/').filter(|p| !p.is_empty()) {
            prefix.push('/');
            prefix.push_str(part);
            if let Some(m) = self.directories.get(&prefix) {
                meta.extend(m.clone());
            }
        }
        meta
    }
}

fn query_matches(query: &Metadata, meta: &Metadata) -> bool {
    query.iter().all(|(k, v)| meta.get(k) == Some(v))
}

fn parent_dir(lfn: &str) -> &str {
    match lfn.rfind('/') {
        Some(0) => "/",
        Some(idx) => &lfn[..idx],
        None => "",
    }
}

fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ----- seeding -------------------------------------------------------

    pub fn add_transformation_record(&self, t: Transformation) {
        self.state().transformations.insert(t.id, t);
    }

    pub fn add_file(&self, file: TransformationFile) {
        self.state()
            .files
            .insert((file.trans_id, file.lfn.clone()), file);
    }

    pub fn add_task(&self, task: TransformationTask) {
        self.state()
            .tasks
            .insert((task.trans_id, task.task_id), task);
    }

    /// Register a job; `Status`, `MinorStatus` and `JobGroup` are taken from the
    /// arguments and `attributes` may add any others.
    pub fn add_job(
        &self,
        job_id: JobId,
        job_group: &str,
        status: JobStatus,
        jdl: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) {
        let mut attrs = attributes;
        attrs.insert("Status".to_string(), status.to_string());
        attrs
            .entry("MinorStatus".to_string())
            .or_insert_with(String::new);
        attrs.insert("JobGroup".to_string(), job_group.to_string());
        self.state().jobs.insert(
            job_id,
            JobRecord {
                jdl: jdl.into(),
                attributes: attrs,
                logging: Vec::new(),
            },
        );
    }

    /// Register an LFN in the catalog with a replica on each of `ses`.
    pub fn add_catalog_file(&self, lfn: &str, ses: &[&str]) {
        let mut state = self.state();
        let entry = state.catalog.entry(lfn.to_string()).or_default();
        for se in ses {
            entry
                .replicas
                .insert(se.to_string(), format!("srm://{se}{lfn}"));
        }
        for se in ses {
            state
                .storage
                .entry(se.to_string())
                .or_default()
                .insert(lfn.to_string());
        }
    }

    pub fn set_file_metadata(&self, lfn: &str, meta: Metadata) {
        let mut state = self.state();
        let entry = state.catalog.entry(lfn.to_string()).or_default();
        entry.metadata.extend(meta);
    }

    /// Place a physical copy on an SE without touching the catalog.
    pub fn add_storage_copy(&self, se: &str, lfn: &str) {
        self.state()
            .storage
            .entry(se.to_string())
            .or_default()
            .insert(lfn.to_string());
    }

    /// Make an (empty) SE known; lookups on unknown SEs fail.
    pub fn add_storage_element(&self, se: &str) {
        self.state().storage.entry(se.to_string()).or_default();
    }

    pub fn add_descendant(&self, parent: &str, child: &str) {
        self.state().lineage.add_child(parent, child);
    }

    pub fn add_request(&self, request: Request) {
        self.state().requests.insert(request.request_id, request);
    }

    pub fn add_component(&self, host: &str, component: ComponentConfig) {
        self.state()
            .components
            .entry(host.to_string())
            .or_default()
            .push(component);
    }

    pub fn set_host_setup(&self, host: &str, setup: HostSetup) {
        self.state().setups.insert(host.to_string(), setup);
    }

    pub fn set_committed_urls(&self, id: &ComponentId, urls: Vec<String>) {
        self.state().urls.insert(id.clone(), urls);
    }

    // ----- failure injection ---------------------------------------------

    /// Catalog lookups for `lfn` end up in the `failed` map.
    pub fn fail_catalog_lookups_for(&self, lfn: &str) {
        self.state().failures.catalog_lfns.insert(lfn.to_string());
    }

    pub fn clear_catalog_failures(&self) {
        self.state().failures.catalog_lfns.clear();
    }

    /// The next `count` calls of operation `op` fail with a host error.
    ///
    /// Operation names are the trait method names, e.g. `"exists"`,
    /// `"get_job_jdl"`, `"read_requests_for_jobs"`.
    pub fn fail_next(&self, op: &str, count: u32) {
        self.state()
            .failures
            .next_calls
            .insert(op.to_string(), count);
    }

    pub fn refuse_identity(&self, refuse: bool) {
        self.state().failures.refuse_identity = refuse;
    }

    // ----- inspection ----------------------------------------------------

    pub fn file(&self, trans_id: TransId, lfn: &str) -> Option<TransformationFile> {
        self.state().files.get(&(trans_id, lfn.to_string())).cloned()
    }

    pub fn file_status(&self, trans_id: TransId, lfn: &str) -> Option<FileStatus> {
        self.file(trans_id, lfn).map(|f| f.status)
    }

    pub fn task_status(&self, trans_id: TransId, task_id: TaskId) -> Option<JobStatus> {
        self.state()
            .tasks
            .get(&(trans_id, task_id))
            .map(|t| t.external_status)
    }

    pub fn job(&self, job_id: JobId) -> Option<JobRecord> {
        self.state().jobs.get(&job_id).cloned()
    }

    pub fn job_status(&self, job_id: JobId) -> Option<String> {
        self.job(job_id)
            .and_then(|j| j.attributes.get("Status").cloned())
    }

    pub fn catalog_contains(&self, lfn: &str) -> bool {
        self.state().catalog.contains_key(lfn)
    }

    pub fn storage_contains(&self, se: &str, lfn: &str) -> bool {
        self.state()
            .storage
            .get(se)
            .is_some_and(|lfns| lfns.contains(lfn))
    }

    pub fn directory_metadata(&self, dir: &str) -> Option<Metadata> {
        self.state().directories.get(&normalize_dir(dir)).cloned()
    }

    pub fn request(&self, request_id: RequestId) -> Option<Request> {
        self.state().requests.get(&request_id).cloned()
    }

    pub fn transformation(&self, trans_id: TransId) -> Option<Transformation> {
        self.state().transformations.get(&trans_id).cloned()
    }

    pub fn committed_urls(&self, id: &ComponentId) -> Vec<String> {
        self.state().urls.get(id).cloned().unwrap_or_default()
    }

    pub fn commits(&self) -> u32 {
        self.state().commits
    }

    pub fn active_identities(&self) -> u32 {
        self.state().active_identities
    }

    pub fn sent_notifications(&self) -> Vec<Notification> {
        self.state().sent.clone()
    }
}

impl TransformationClient for InMemoryHost {
    fn get_transformations(&self, filter: &TransformationFilter) -> Result<Vec<Transformation>> {
        let mut state = self.state();
        state.check_failure("get_transformations")?;
        Ok(state
            .transformations
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    fn get_transformation_files(&self, filter: &FileFilter) -> Result<Vec<TransformationFile>> {
        let mut state = self.state();
        state.check_failure("get_transformation_files")?;
        Ok(state
            .files
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    fn get_transformation_tasks(&self, filter: &TaskFilter) -> Result<Vec<TransformationTask>> {
        let mut state = self.state();
        state.check_failure("get_transformation_tasks")?;
        Ok(state
            .tasks
            .values()
            .filter(|t| {
                t.trans_id == filter.trans_id
                    && (filter.task_ids.is_empty() || filter.task_ids.contains(&t.task_id))
            })
            .cloned()
            .collect())
    }

    fn get_transformation_parameters(
        &self,
        trans_id: TransId,
        keys: &[&str],
    ) -> Result<BTreeMap<String, String>> {
        let mut state = self.state();
        state.check_failure("get_transformation_parameters")?;
        let t = state.transformations.get(&trans_id).ok_or_else(|| {
            McProdError::host(
                "get_transformation_parameters",
                format!("transformation {trans_id} does not exist"),
            )
        })?;

        let mut params = BTreeMap::new();
        for key in keys {
            let value = match *key {
                "TransformationName" => t.name.clone(),
                "Type" => t.trans_type.to_string(),
                "Status" => t.status.to_string(),
                "Body" => t.body.clone(),
                "TransformationGroup" => t.group.clone(),
                _ => continue,
            };
            params.insert(key.to_string(), value);
        }
        Ok(params)
    }

    fn set_file_status_for_transformation(
        &self,
        trans_id: TransId,
        status: FileStatus,
        lfns: &[String],
        force: bool,
    ) -> Result<BatchResult<()>> {
        let mut state = self.state();
        state.check_failure("set_file_status_for_transformation")?;

        let mut result = BatchResult::default();
        for lfn in lfns {
            match state.files.get_mut(&(trans_id, lfn.clone())) {
                None => {
                    result
                        .failed
                        .insert(lfn.clone(), "file not in transformation".to_string());
                }
                Some(file) if file.status == FileStatus::Processed && !force && status != FileStatus::Processed => {
                    result
                        .failed
                        .insert(lfn.clone(), "file is Processed; use force".to_string());
                }
                Some(file) => {
                    if file.status == FileStatus::Assigned && status == FileStatus::Unused {
                        file.error_count += 1;
                    }
                    file.status = status;
                    file.last_update = Utc::now();
                    result.successful.insert(lfn.clone(), ());
                }
            }
        }
        Ok(result)
    }

    fn set_task_status(&self, trans_name: &str, task_id: TaskId, status: JobStatus) -> Result<()> {
        let mut state = self.state();
        state.check_failure("set_task_status")?;
        let trans_id = state
            .transformations
            .values()
            .find(|t| t.name == trans_name)
            .map(|t| t.id)
            .ok_or_else(|| {
                McProdError::host("set_task_status", format!("unknown transformation {trans_name}"))
            })?;
        let task = state.tasks.get_mut(&(trans_id, task_id)).ok_or_else(|| {
            McProdError::host("set_task_status", format!("unknown task {trans_id}/{task_id}"))
        })?;
        task.external_status = status;
        task.last_update = Utc::now();
        Ok(())
    }

    fn add_transformation(&self, new: NewTransformation) -> Result<TransId> {
        let mut state = self.state();
        state.check_failure("add_transformation")?;
        if state.transformations.values().any(|t| t.name == new.name) {
            return Err(McProdError::host(
                "add_transformation",
                format!("transformation {} already exists", new.name),
            ));
        }
        let id = state.transformations.keys().next_back().copied().unwrap_or(0) + 1;
        state.transformations.insert(
            id,
            Transformation {
                id,
                name: new.name,
                trans_type: new.trans_type,
                status: TransformationStatus::Active,
                body: new.body,
                input_query: new.input_query,
                group: new.group,
            },
        );
        Ok(id)
    }
}

impl JobMonitoringClient for InMemoryHost {
    fn get_jobs(&self, attrs: &BTreeMap<String, String>) -> Result<Vec<JobId>> {
        let mut state = self.state();
        state.check_failure("get_jobs")?;
        Ok(state
            .jobs
            .iter()
            .filter(|(_, job)| query_matches(attrs, &job.attributes))
            .map(|(id, _)| *id)
            .collect())
    }

    fn get_job_jdl(&self, job_id: JobId) -> Result<String> {
        let mut state = self.state();
        state.check_failure("get_job_jdl")?;
        state
            .jobs
            .get(&job_id)
            .map(|j| j.jdl.clone())
            .ok_or_else(|| McProdError::host("get_job_jdl", format!("job {job_id} not found")))
    }

    fn get_job_attributes(&self, job_id: JobId, keys: &[&str]) -> Result<BTreeMap<String, String>> {
        let mut state = self.state();
        state.check_failure("get_job_attributes")?;
        let job = state.jobs.get(&job_id).ok_or_else(|| {
            McProdError::host("get_job_attributes", format!("job {job_id} not found"))
        })?;
        Ok(job
            .attributes
            .iter()
            .filter(|(k, _)| keys.is_empty() || keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn set_job_attribute(&self, job_id: JobId, key: &str, value: &str, _update: bool) -> Result<()> {
        let mut state = self.state();
        state.check_failure("set_job_attribute")?;
        let job = state.jobs.get_mut(&job_id).ok_or_else(|| {
            McProdError::host("set_job_attribute", format!("job {job_id} not found"))
        })?;
        job.attributes.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn add_logging_record(&self, job_id: JobId, record: LoggingRecord) -> Result<()> {
        let mut state = self.state();
        state.check_failure("add_logging_record")?;
        let job = state.jobs.get_mut(&job_id).ok_or_else(|| {
            McProdError::host("add_logging_record", format!("job {job_id} not found"))
        })?;
        job.logging.push(record);
        Ok(())
    }
}

impl FileCatalogClient for InMemoryHost {
    fn exists(&self, lfns: &[String]) -> Result<BatchResult<bool>> {
        let mut state = self.state();
        state.check_failure("exists")?;
        let mut result = BatchResult::default();
        for lfn in lfns {
            if state.failures.catalog_lfns.contains(lfn) {
                result
                    .failed
                    .insert(lfn.clone(), "catalog lookup failed".to_string());
            } else {
                result
                    .successful
                    .insert(lfn.clone(), state.catalog.contains_key(lfn));
            }
        }
        Ok(result)
    }

    fn get_replicas(&self, lfns: &[String]) -> Result<BatchResult<BTreeMap<String, String>>> {
        let mut state = self.state();
        state.check_failure("get_replicas")?;
        let mut result = BatchResult::default();
        for lfn in lfns {
            if state.failures.catalog_lfns.contains(lfn) {
                result
                    .failed
                    .insert(lfn.clone(), "catalog lookup failed".to_string());
                continue;
            }
            match state.catalog.get(lfn) {
                Some(entry) => {
                    result.successful.insert(lfn.clone(), entry.replicas.clone());
                }
                None => {
                    result
                        .failed
                        .insert(lfn.clone(), "No such file or directory".to_string());
                }
            }
        }
        Ok(result)
    }

    fn get_file_descendents(&self, lfns: &[String], depths: &[u32]) -> Result<BatchResult<Vec<String>>> {
        let mut state = self.state();
        state.check_failure("get_file_descendents")?;
        let mut result = BatchResult::default();
        for lfn in lfns {
            let desc = state.lineage.descendants(lfn, depths);
            if !desc.is_empty() {
                result.successful.insert(lfn.clone(), desc);
            }
        }
        Ok(result)
    }

    fn remove_file(&self, lfns: &[String]) -> Result<BatchResult<()>> {
        let mut state = self.state();
        state.check_failure("remove_file")?;
        let mut result = BatchResult::default();
        for lfn in lfns {
            if state.failures.catalog_lfns.contains(lfn) {
                result
                    .failed
                    .insert(lfn.clone(), "catalog removal failed".to_string());
                continue;
            }
            state.catalog.remove(lfn);
            state.lineage.remove(lfn);
            result.successful.insert(lfn.clone(), ());
        }
        Ok(result)
    }

    fn get_directory_user_metadata(&self, dir: &str) -> Result<Metadata> {
        let mut state = self.state();
        state.check_failure("get_directory_user_metadata")?;
        Ok(state.effective_dir_metadata(dir))
    }

    fn find_directories_by_metadata(&self, query: &Metadata) -> Result<Vec<String>> {
        let mut state = self.state();
        state.check_failure("find_directories_by_metadata")?;
        Ok(state
            .directories
            .keys()
            .filter(|dir| query_matches(query, &state.effective_dir_metadata(dir)))
            .cloned()
            .collect())
    }

    fn find_files_by_metadata(&self, query: &Metadata, basepath: &str) -> Result<Vec<String>> {
        let mut state = self.state();
        state.check_failure("find_files_by_metadata")?;
        Ok(state
            .catalog
            .iter()
            .filter(|(lfn, _)| lfn.starts_with(basepath))
            .filter(|(lfn, entry)| {
                let mut meta = state.effective_dir_metadata(parent_dir(lfn));
                meta.extend(entry.metadata.clone());
                query_matches(query, &meta)
            })
            .map(|(lfn, _)| lfn.clone())
            .collect())
    }

    fn get_file_user_metadata(&self, lfn: &str) -> Result<Metadata> {
        let mut state = self.state();
        state.check_failure("get_file_user_metadata")?;
        state
            .catalog
            .get(lfn)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| {
                McProdError::host("get_file_user_metadata", format!("{lfn}: No such file"))
            })
    }

    fn create_directory(&self, dir: &str) -> Result<()> {
        let mut state = self.state();
        state.check_failure("create_directory")?;
        state.directories.entry(normalize_dir(dir)).or_default();
        Ok(())
    }

    fn set_metadata(&self, path: &str, meta: &Metadata) -> Result<()> {
        let mut state = self.state();
        state.check_failure("set_metadata")?;
        if let Some(entry) = state.catalog.get_mut(path) {
            entry.metadata.extend(meta.clone());
        } else {
            state
                .directories
                .entry(normalize_dir(path))
                .or_default()
                .extend(meta.clone());
        }
        Ok(())
    }
}

impl RequestManagerClient for InMemoryHost {
    fn read_requests_for_jobs(&self, job_ids: &[JobId]) -> Result<BatchResult<Request, JobId>> {
        let mut state = self.state();
        state.check_failure("read_requests_for_jobs")?;
        let mut result = BatchResult::default();
        for job_id in job_ids {
            if let Some(req) = state
                .requests
                .values()
                .find(|r| r.job_id == Some(*job_id))
            {
                result.successful.insert(*job_id, req.clone());
            }
        }
        Ok(result)
    }

    fn get_request(&self, request_id: RequestId) -> Result<Option<Request>> {
        let mut state = self.state();
        state.check_failure("get_request")?;
        Ok(state.requests.get(&request_id).cloned())
    }

    fn reset_failed_request(&self, request_id: RequestId) -> Result<()> {
        let mut state = self.state();
        state.check_failure("reset_failed_request")?;
        let req = state.requests.get_mut(&request_id).ok_or_else(|| {
            McProdError::host(
                "reset_failed_request",
                format!("request {request_id} does not exist"),
            )
        })?;
        if req.status == RequestStatus::Failed {
            req.status = RequestStatus::Waiting;
        }
        Ok(())
    }
}

impl StorageElementClient for InMemoryHost {
    fn exists(&self, se: &str, lfns: &[String]) -> Result<BatchResult<bool>> {
        let mut state = self.state();
        state.check_failure("se_exists")?;
        let mut result = BatchResult::default();
        let Some(present) = state.storage.get(se) else {
            for lfn in lfns {
                result.failed.insert(lfn.clone(), format!("unknown SE {se}"));
            }
            return Ok(result);
        };
        for lfn in lfns {
            result.successful.insert(lfn.clone(), present.contains(lfn));
        }
        Ok(result)
    }

    fn remove_file(&self, se: &str, lfns: &[String]) -> Result<BatchResult<()>> {
        let mut state = self.state();
        state.check_failure("se_remove_file")?;
        let mut result = BatchResult::default();
        let copies = state.storage.entry(se.to_string()).or_default();
        for lfn in lfns {
            copies.remove(lfn);
            result.successful.insert(lfn.clone(), ());
        }
        Ok(result)
    }
}

impl IdentityProvider for InMemoryHost {
    fn acquire(&self, role: &str) -> Result<ShifterIdentity> {
        let mut state = self.state();
        if state.failures.refuse_identity {
            return Err(McProdError::Identity {
                role: role.to_string(),
                message: "no proxy available".to_string(),
            });
        }
        state.active_identities += 1;
        Ok(ShifterIdentity {
            role: role.to_string(),
            subject: format!("/DC=org/CN=shifter-{}", role.to_lowercase()),
        })
    }

    fn release(&self, _identity: &ShifterIdentity) {
        let mut state = self.state();
        state.active_identities = state.active_identities.saturating_sub(1);
    }
}

impl Notifier for InMemoryHost {
    fn send(&self, notification: &Notification) -> Result<()> {
        self.state().sent.push(notification.clone());
        Ok(())
    }
}

impl ComponentRegistry for InMemoryHost {
    fn components(&self, host: &str) -> Result<Vec<ComponentConfig>> {
        let mut state = self.state();
        state.check_failure("components")?;
        Ok(state.components.get(host).cloned().unwrap_or_default())
    }

    fn host_setup(&self, host: &str) -> Result<HostSetup> {
        let mut state = self.state();
        state.check_failure("host_setup")?;
        Ok(state.setups.get(host).cloned().unwrap_or_default())
    }

    fn service_urls(&self, id: &ComponentId) -> Result<Vec<String>> {
        let mut state = self.state();
        state.check_failure("service_urls")?;
        Ok(state.urls.get(id).cloned().unwrap_or_default())
    }

    fn set_service_urls(&self, id: &ComponentId, urls: &[String]) -> Result<()> {
        let mut state = self.state();
        state.check_failure("set_service_urls")?;
        state.staged_urls.insert(id.clone(), urls.to_vec());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state();
        state.check_failure("commit")?;
        let staged = std::mem::take(&mut state.staged_urls);
        state.urls.extend(staged);
        state.commits += 1;
        Ok(())
    }
}
