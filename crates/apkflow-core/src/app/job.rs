//! Job - ジョブの構築と起動
//!
//! The orchestrator turns a `JobRequest` into a wired `Job`: one group per
//! resource kind the requested tasks touch, the tasks themselves and the
//! aggregator, all sharing one `JobContext`.
//!
//! # フロー
//! 1. `create_job`: 検証 -> グループ表 -> タスク/集約器の構築と attach
//! 2. `start_processing`: RUNNING 通知 -> 補助ファイル -> エミュレータ -> APK
//!
//! Delivery is synchronous, so `start_processing` returns once the seeds
//! have been pushed through every task that could run.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use super::aggregator::Aggregator;
use super::document::ResultDocument;
use crate::bus::{DeliveryFailure, DeliveryLog, ResourceTable};
use crate::domain::{
    AccessibilityIssue, ApkFile, DisplayIssue, EmulatorSlot, JobError, JobId, JobRequest, Origin,
    Resource, ResourceType, Screenshot, StatusKind, SupplementaryFile, SupplementaryKind,
    TappabilityPrediction, TaskKind, UtgTrace,
};
use crate::observability::{JobSnapshot, TaskSnapshot};
use crate::ports::{AlgorithmBackend, BlobStore, IdGenerator, ResultsSink, StatusSink};
use crate::tasks::{AnalysisTask, JobContext, TaskOptions, build_task};

/// Shared collaborators every job is built from.
pub struct Orchestrator {
    pub(crate) backends: HashMap<TaskKind, Arc<dyn AlgorithmBackend>>,
    pub(crate) options: HashMap<TaskKind, TaskOptions>,
    pub(crate) blob: Arc<dyn BlobStore>,
    pub(crate) results: Arc<dyn ResultsSink>,
    pub(crate) status: Arc<dyn StatusSink>,
    /// Shared by every job; a lease taken by one job blocks the others.
    pub(crate) emulators: Vec<EmulatorSlot>,
    pub(crate) work_root: PathBuf,
    pub(crate) ids: Arc<dyn IdGenerator>,
}

/// Items published when the job starts.
struct Seeds {
    apk: ApkFile,
    supplementary: Vec<SupplementaryFile>,
    emulators: Vec<EmulatorSlot>,
}

pub struct Job {
    ctx: JobContext,
    tasks: Vec<Arc<dyn AnalysisTask>>,
    aggregator: Arc<Aggregator>,
    seeds: Mutex<Option<Seeds>>,
}

impl Orchestrator {
    pub fn work_root(&self) -> &std::path::Path {
        &self.work_root
    }

    /// Requested task kinds in request order, duplicates dropped.
    fn requested_tasks(request: &JobRequest) -> Result<Vec<TaskKind>, JobError> {
        let mut kinds = Vec::with_capacity(request.algorithms.len());
        for name in &request.algorithms {
            let kind: TaskKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Err(JobError::NoTasks);
        }
        Ok(kinds)
    }

    fn supplementary_files(request: &JobRequest) -> Result<Vec<SupplementaryFile>, JobError> {
        request
            .additional_files
            .iter()
            .map(|(name, path)| {
                let kind = SupplementaryKind::for_task_name(name)
                    .ok_or_else(|| JobError::UnknownSupplementary(name.clone()))?;
                Ok(SupplementaryFile {
                    kind,
                    path: path.clone(),
                })
            })
            .collect()
    }

    /// Producer count of every group the requested tasks read or write.
    fn producer_counts(
        &self,
        kinds: &[TaskKind],
        supplementary: &[SupplementaryFile],
    ) -> BTreeMap<ResourceType, usize> {
        let mut counts = BTreeMap::new();
        for kind in kinds {
            for input in kind.inputs() {
                counts.entry(*input).or_insert(0);
            }
            for output in kind.outputs() {
                *counts.entry(*output).or_insert(0) += 1;
            }
        }
        for (resource, count) in counts.iter_mut() {
            match resource {
                ResourceType::ApkFile => *count = 1,
                ResourceType::Emulator => *count = usize::from(!self.emulators.is_empty()),
                ResourceType::SupplementaryFile => *count = usize::from(!supplementary.is_empty()),
                _ => {}
            }
        }
        counts
    }

    /// Validate `request` and wire a job for it. Nothing is published yet.
    pub async fn create_job(&self, request: JobRequest) -> Result<Job, JobError> {
        let job_id = match &request.uuid {
            Some(uuid) => JobId::new(uuid.as_str())?,
            None => self.ids.generate_job_id(),
        };
        let kinds = Self::requested_tasks(&request)?;
        for kind in &kinds {
            if !self.backends.contains_key(kind) {
                return Err(JobError::MissingBackend(*kind));
            }
            if kind.needs_emulator() && self.emulators.is_empty() {
                return Err(JobError::MissingEmulator(*kind));
            }
        }
        let supplementary = Self::supplementary_files(&request)?;

        let mut table = ResourceTable::new(DeliveryLog::new());
        for (resource, producers) in self.producer_counts(&kinds, &supplementary) {
            create_group(&mut table, resource, producers);
        }

        let output_dir = self.work_root.join(job_id.as_str());
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| JobError::Workspace {
                path: output_dir.display().to_string(),
                source,
            })?;

        let ctx = JobContext::new(job_id, output_dir, Arc::new(table));
        let mut tasks = Vec::with_capacity(kinds.len());
        for kind in &kinds {
            let backend = self
                .backends
                .get(kind)
                .cloned()
                .ok_or(JobError::MissingBackend(*kind))?;
            let options = self.options.get(kind).copied().unwrap_or_default();
            tasks.push(build_task(*kind, ctx.clone(), backend, options));
        }

        let aggregator = Aggregator::new(
            ctx.clone(),
            Arc::clone(&self.blob),
            Arc::clone(&self.results),
            Arc::clone(&self.status),
            tasks.clone(),
        );
        aggregator.attach().await?;
        for task in &tasks {
            task.attach().await?;
        }

        tracing::info!(
            job = %ctx.job_id,
            tasks = ?kinds.iter().map(|k| k.wire_name()).collect::<Vec<_>>(),
            groups = ctx.resources.kinds().len(),
            "job created"
        );

        Ok(Job {
            ctx,
            tasks,
            aggregator,
            seeds: Mutex::new(Some(Seeds {
                apk: ApkFile {
                    path: request.apk_file,
                },
                supplementary,
                emulators: self.emulators.clone(),
            })),
        })
    }
}

fn create_group(table: &mut ResourceTable, kind: ResourceType, producers: usize) {
    match kind {
        ResourceType::ApkFile => {
            table.create::<ApkFile>(producers);
        }
        ResourceType::Emulator => {
            table.create::<EmulatorSlot>(producers);
        }
        ResourceType::Screenshot => {
            table.create::<Screenshot>(producers);
        }
        ResourceType::AccessibilityIssue => {
            table.create::<AccessibilityIssue>(producers);
        }
        ResourceType::DisplayIssue => {
            table.create::<DisplayIssue>(producers);
        }
        ResourceType::TappabilityPrediction => {
            table.create::<TappabilityPrediction>(producers);
        }
        ResourceType::UtgTrace => {
            table.create::<UtgTrace>(producers);
        }
        ResourceType::SupplementaryFile => {
            table.create::<SupplementaryFile>(producers);
        }
    }
}

/// Publish `items` as the seed producer, the last one final.
async fn seed<T: Resource>(resources: &ResourceTable, items: Vec<T>) -> Result<(), JobError> {
    let Some(group) = resources.group::<T>() else {
        return Ok(());
    };
    if !group.is_active() {
        return Ok(());
    }
    let last = items.len().saturating_sub(1);
    for (index, item) in items.into_iter().enumerate() {
        group.publish(Origin::Seed, item, index == last).await?;
    }
    Ok(())
}

impl Job {
    pub fn id(&self) -> &JobId {
        &self.ctx.job_id
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn tasks(&self) -> Vec<TaskKind> {
        self.tasks.iter().map(|task| task.kind()).collect()
    }

    /// Report every task RUNNING, then publish the seeds.
    pub async fn start_processing(&self) -> Result<(), JobError> {
        let seeds = self
            .seeds
            .lock()
            .take()
            .ok_or_else(|| JobError::AlreadyStarted(self.ctx.job_id.clone()))?;

        tracing::info!(job = %self.ctx.job_id, apk = %seeds.apk.path.display(), "job started");
        self.aggregator.start().await;

        let resources = &self.ctx.resources;
        seed(resources, seeds.supplementary).await?;
        seed(resources, seeds.emulators).await?;
        seed(resources, vec![seeds.apk]).await?;

        tracing::info!(
            job = %self.ctx.job_id,
            status = ?self.aggregator.job_status().await,
            "seeds delivered"
        );
        Ok(())
    }

    pub async fn document(&self) -> ResultDocument {
        self.aggregator.document().await
    }

    pub fn failures(&self) -> Vec<DeliveryFailure> {
        self.ctx.resources.failures().snapshot()
    }

    /// Job status, once every task reported its terminal status.
    pub async fn status(&self) -> Option<StatusKind> {
        self.aggregator.job_status().await
    }

    pub async fn is_finished(&self) -> bool {
        self.status().await.is_some()
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let finished = self.aggregator.finished().await;
        let tasks = self
            .tasks
            .iter()
            .map(|task| {
                let kind = task.kind();
                TaskSnapshot {
                    task: kind,
                    complete: task.is_complete(),
                    status: finished.get(&kind).copied(),
                    report: task.report(),
                }
            })
            .collect();
        JobSnapshot {
            job_id: self.ctx.job_id.clone(),
            status: self.status().await,
            groups: self.ctx.resources.snapshot(),
            tasks,
            failures: self.failures(),
            document: self.document().await,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.ctx.job_id)
            .field("tasks", &self.tasks())
            .finish()
    }
}
