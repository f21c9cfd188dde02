//! In-memory ports - テスト用・dry-run 用の実装
//!
//! Everything is recorded in order so tests can assert on exactly what
//! left the process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::document::ResultDocument;
use crate::domain::{JobId, SinkError, StatusUpdate, StorageError, TaskKind};
use crate::ports::{BlobRef, BlobStore, ResultsSink, StatusSink};

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub key: String,
    pub local_path: PathBuf,
    pub blob: BlobRef,
}

/// Checks the file exists, then hands out `mem://{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    bucket: String,
    uploads: Arc<Mutex<Vec<Upload>>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            uploads: Arc::default(),
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, local_path: &Path) -> Result<BlobRef, StorageError> {
        tokio::fs::metadata(local_path)
            .await
            .map_err(|source| StorageError::Io {
                path: local_path.display().to_string(),
                source,
            })?;
        let blob = BlobRef::new(format!("mem://{}/{}", self.bucket, key));
        self.uploads.lock().push(Upload {
            key: key.to_string(),
            local_path: local_path.to_path_buf(),
            blob: blob.clone(),
        });
        Ok(blob)
    }
}

/// Keeps every pushed document. `failing()` rejects every push after
/// recording it, to exercise the swallow-and-log path.
#[derive(Debug, Clone, Default)]
pub struct RecordingResultsSink {
    pushes: Arc<Mutex<Vec<(JobId, ResultDocument)>>>,
    fail: bool,
}

impl RecordingResultsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn pushes(&self) -> Vec<(JobId, ResultDocument)> {
        self.pushes.lock().clone()
    }

    pub fn last(&self) -> Option<ResultDocument> {
        self.pushes.lock().last().map(|(_, doc)| doc.clone())
    }
}

#[async_trait]
impl ResultsSink for RecordingResultsSink {
    async fn push(&self, job: &JobId, document: &ResultDocument) -> Result<(), SinkError> {
        self.pushes.lock().push((job.clone(), document.clone()));
        if self.fail {
            return Err(SinkError::Status {
                url: format!("memory://results/{job}"),
                status: 503,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatus {
    pub job: JobId,
    pub task: Option<TaskKind>,
    pub update: StatusUpdate,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStatusSink {
    updates: Arc<Mutex<Vec<RecordedStatus>>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<RecordedStatus> {
        self.updates.lock().clone()
    }

    /// Updates for one task, or for the job itself with `None`.
    pub fn for_task(&self, task: Option<TaskKind>) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .iter()
            .filter(|recorded| recorded.task == task)
            .map(|recorded| recorded.update.clone())
            .collect()
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn update(
        &self,
        job: &JobId,
        task: Option<TaskKind>,
        update: &StatusUpdate,
    ) -> Result<(), SinkError> {
        self.updates.lock().push(RecordedStatus {
            job: job.clone(),
            task,
            update: update.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StatusKind;

    #[tokio::test]
    async fn memory_blob_store_records_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("shot.png");
        std::fs::write(&file, b"png").unwrap();

        let store = MemoryBlobStore::new("apk-bucket");
        let blob = store.upload("job-1/xbot/shot.png", &file).await.unwrap();
        assert_eq!(blob.as_str(), "mem://apk-bucket/job-1/xbot/shot.png");
        assert_eq!(store.uploads().len(), 1);

        let missing = store.upload("k", &dir.path().join("nope.png")).await;
        assert!(matches!(missing, Err(StorageError::Io { .. })));
        assert_eq!(store.uploads().len(), 1);
    }

    #[tokio::test]
    async fn status_sink_filters_by_task() {
        let sink = RecordingStatusSink::new();
        let job = JobId::new("job-1").unwrap();
        sink.update(&job, Some(TaskKind::Tappability), &StatusUpdate::new(StatusKind::Running))
            .await
            .unwrap();
        sink.update(&job, None, &StatusUpdate::new(StatusKind::Successful))
            .await
            .unwrap();

        assert_eq!(sink.for_task(Some(TaskKind::Tappability)).len(), 1);
        assert_eq!(sink.for_task(None)[0].status, StatusKind::Successful);
    }

    #[tokio::test]
    async fn failing_results_sink_still_records() {
        let sink = RecordingResultsSink::failing();
        let job = JobId::new("job-1").unwrap();
        assert!(sink.push(&job, &ResultDocument::default()).await.is_err());
        assert_eq!(sink.pushes().len(), 1);
    }
}
