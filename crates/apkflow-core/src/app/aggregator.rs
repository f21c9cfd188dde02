//! Aggregator - 結果の集約と状態通知
//!
//! Folds every result artifact of a job into the `ResultDocument`, keeps
//! the results service up to date and reports task and job status.
//!
//! # フロー（結果 1 件ごと）
//! 1. 画面 identity を取り出す
//! 2. 初見の identity ならベース画像をアップロードしてエントリ作成
//! 3. 結果の成果物をアップロード（ドキュメントにローカルパスを残さない）
//! 4. タスク名のキーにマージし、ドキュメント全体を push
//! 5. 結果グループが枯渇し、タスクが完了していればタスク状態を通知
//! 6. 全タスク完了でジョブ状態を一度だけ通知

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

use super::document::{ResultDocument, SubResult};
use crate::bus::Subscriber;
use crate::domain::{
    AccessibilityIssue, BusError, DeliveryError, DisplayIssue, ResourceType, ResourceWrapper,
    Screenshot, StatusKind, StatusUpdate, StorageError, TappabilityPrediction, TaskKind,
    TaskReport, TaskResult, UtgTrace,
};
use crate::ports::{BlobRef, BlobStore, ResultsSink, StatusSink, blob_key};
use crate::tasks::{AnalysisTask, JobContext, subscribe_if_present};

const SUBSCRIBER_NAME: &str = "aggregator";

#[derive(Default)]
struct State {
    document: ResultDocument,
    /// Tasks whose terminal status was reported.
    finished: BTreeMap<TaskKind, TaskReport>,
    /// No terminal status goes out before the RUNNING ones.
    started: bool,
    job_status: Option<StatusKind>,
}

pub struct Aggregator {
    this: Weak<Self>,
    ctx: JobContext,
    blob: Arc<dyn BlobStore>,
    results: Arc<dyn ResultsSink>,
    status: Arc<dyn StatusSink>,
    tasks: Vec<Arc<dyn AnalysisTask>>,
    state: Mutex<State>,
}

impl Aggregator {
    pub fn new(
        ctx: JobContext,
        blob: Arc<dyn BlobStore>,
        results: Arc<dyn ResultsSink>,
        status: Arc<dyn StatusSink>,
        tasks: Vec<Arc<dyn AnalysisTask>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            ctx,
            blob,
            results,
            status,
            tasks,
            state: Mutex::new(State::default()),
        })
    }

    /// Subscribe to screenshots and to the result group of every task.
    pub async fn attach(&self) -> Result<(), BusError> {
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        let resources = &self.ctx.resources;
        subscribe_if_present::<Screenshot>(resources, this.clone()).await?;
        for task in &self.tasks {
            match task.kind() {
                TaskKind::Accessibility => {
                    subscribe_if_present::<AccessibilityIssue>(resources, this.clone()).await?
                }
                TaskKind::DisplayIssue => {
                    subscribe_if_present::<DisplayIssue>(resources, this.clone()).await?
                }
                TaskKind::Tappability => {
                    subscribe_if_present::<TappabilityPrediction>(resources, this.clone()).await?
                }
                TaskKind::UsageTrace => {
                    subscribe_if_present::<UtgTrace>(resources, this.clone()).await?
                }
            }
        }
        Ok(())
    }

    /// Report every task RUNNING, then allow terminal statuses. Tasks that
    /// already finished (nothing to do) are reported right after.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        for task in &self.tasks {
            let kind = task.kind();
            let update =
                StatusUpdate::new(StatusKind::Running).with_logs(format!("{kind} running"));
            self.send_status(Some(kind), &update).await;
        }
        state.started = true;
        for task in &self.tasks {
            self.evaluate(&mut state, task.kind()).await;
        }
    }

    pub async fn document(&self) -> ResultDocument {
        self.state.lock().await.document.clone()
    }

    pub async fn job_status(&self) -> Option<StatusKind> {
        self.state.lock().await.job_status
    }

    /// Terminal status per finished task.
    pub async fn finished(&self) -> BTreeMap<TaskKind, StatusKind> {
        self.state
            .lock()
            .await
            .finished
            .iter()
            .map(|(kind, report)| (*kind, terminal_status(report)))
            .collect()
    }

    async fn fold(&self, result: TaskResult) -> Result<(), DeliveryError> {
        let task = result.task();
        let id = result.identity();
        let mut state = self.state.lock().await;

        if !state.document.contains(&id) {
            let base = self.upload(result.base_image()).await?;
            state.document.insert_entry(&id, base);
        }
        let sub = self.externalize(&result).await?;
        state.document.merge(&id, sub);
        tracing::debug!(job = %self.ctx.job_id, %task, screen = %id, "folded result");

        self.push(&state.document).await;
        self.evaluate(&mut state, task).await;
        Ok(())
    }

    /// Replace every local path of `result` with an uploaded reference.
    async fn externalize(&self, result: &TaskResult) -> Result<SubResult, StorageError> {
        Ok(match result {
            TaskResult::Accessibility(issue) => SubResult::Accessibility {
                image: self.upload(&issue.image_path).await?,
                description: issue.description.clone(),
            },
            TaskResult::Display(issue) => SubResult::Display {
                image: self.upload(&issue.image_path).await?,
            },
            TaskResult::Tappability(prediction) => {
                let image = self.upload(&prediction.image_path).await?;
                let mut heatmaps = Vec::with_capacity(prediction.heatmaps.len());
                for path in &prediction.heatmaps {
                    heatmaps.push(self.upload(path).await?);
                }
                SubResult::Tappability {
                    image,
                    description: prediction.description.clone(),
                    heatmaps,
                }
            }
            TaskResult::Utg(trace) => SubResult::Utg {
                utg: self.upload(&trace.utg_path).await?,
                trace: self.upload(&trace.trace_path).await?,
            },
        })
    }

    async fn upload(&self, path: &Path) -> Result<BlobRef, StorageError> {
        let key = blob_key(&self.ctx.job_id, &self.ctx.output_dir, path);
        self.blob.upload(&key, path).await
    }

    async fn push(&self, document: &ResultDocument) {
        if let Err(err) = self.results.push(&self.ctx.job_id, document).await {
            tracing::warn!(job = %self.ctx.job_id, error = %err, "results push failed");
        }
    }

    async fn send_status(&self, task: Option<TaskKind>, update: &StatusUpdate) {
        tracing::info!(
            job = %self.ctx.job_id,
            task = task.map(TaskKind::wire_name).unwrap_or("job"),
            status = update.status.as_str(),
            "status"
        );
        if let Err(err) = self.status.update(&self.ctx.job_id, task, update).await {
            tracing::warn!(job = %self.ctx.job_id, error = %err, "status update failed");
        }
    }

    /// Report `kind` finished once its result group is exhausted and the
    /// task is complete; report the job once every task has finished.
    async fn evaluate(&self, state: &mut State, kind: TaskKind) {
        if !state.started || state.finished.contains_key(&kind) {
            return;
        }
        let Some(task) = self.tasks.iter().find(|t| t.kind() == kind) else {
            return;
        };
        let exhausted = self.ctx.resources.all_exhausted(&[kind.result_kind()]);
        if !exhausted || !task.is_complete() {
            return;
        }

        let report = task.report();
        let update = StatusUpdate::new(terminal_status(&report)).with_logs(report.summary(kind));
        self.send_status(Some(kind), &update).await;
        state.finished.insert(kind, report);

        if state.finished.len() == self.tasks.len() && state.job_status.is_none() {
            let update = self.job_update(&state.finished);
            state.job_status = Some(update.status);
            self.send_status(None, &update).await;
        }
    }

    fn job_update(&self, finished: &BTreeMap<TaskKind, TaskReport>) -> StatusUpdate {
        let failed_tasks: Vec<&str> = finished
            .iter()
            .filter(|(_, report)| !report.is_success())
            .map(|(kind, _)| kind.wire_name())
            .collect();
        let delivery_failures = self.ctx.resources.failures().len();
        if failed_tasks.is_empty() && delivery_failures == 0 {
            return StatusUpdate::new(StatusKind::Successful);
        }

        let mut problems = Vec::new();
        if !failed_tasks.is_empty() {
            problems.push(format!("failed tasks: {}", failed_tasks.join(", ")));
        }
        if delivery_failures > 0 {
            problems.push(format!("{delivery_failures} delivery failures"));
        }
        StatusUpdate::new(StatusKind::Failed).with_logs(problems.join("; "))
    }

    async fn on_result_exhausted(&self, kind: ResourceType) {
        let mut state = self.state.lock().await;
        let tasks: Vec<TaskKind> = self
            .tasks
            .iter()
            .map(|t| t.kind())
            .filter(|k| k.result_kind() == kind)
            .collect();
        for task in tasks {
            self.evaluate(&mut state, task).await;
        }
    }
}

fn terminal_status(report: &TaskReport) -> StatusKind {
    if report.is_success() {
        StatusKind::Successful
    } else {
        StatusKind::Failed
    }
}

#[async_trait]
impl Subscriber<Screenshot> for Aggregator {
    fn subscriber_name(&self) -> &str {
        SUBSCRIBER_NAME
    }

    /// Screenshots only open entries; results are folded from the result
    /// groups.
    async fn on_resource(
        &self,
        item: Arc<ResourceWrapper<Screenshot>>,
    ) -> Result<(), DeliveryError> {
        let shot = item.payload();
        let id = shot.identity();
        let mut state = self.state.lock().await;
        if state.document.contains(&id) {
            return Ok(());
        }
        let base = self.upload(&shot.image_path).await?;
        state.document.insert_entry(&id, base);
        self.push(&state.document).await;
        Ok(())
    }
}

macro_rules! fold_results {
    ($($payload:ty => $variant:ident),* $(,)?) => {
        $(
            #[async_trait]
            impl Subscriber<$payload> for Aggregator {
                fn subscriber_name(&self) -> &str {
                    SUBSCRIBER_NAME
                }

                async fn on_resource(
                    &self,
                    item: Arc<ResourceWrapper<$payload>>,
                ) -> Result<(), DeliveryError> {
                    self.fold(TaskResult::$variant(item.payload().clone())).await
                }

                async fn on_exhausted(&self, kind: ResourceType) -> Result<(), DeliveryError> {
                    self.on_result_exhausted(kind).await;
                    Ok(())
                }
            }
        )*
    };
}

fold_results! {
    AccessibilityIssue => Accessibility,
    DisplayIssue => Display,
    TappabilityPrediction => Tappability,
    UtgTrace => Utg,
}
