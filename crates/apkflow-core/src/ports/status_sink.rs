//! StatusSink port - 状態遷移の通知先
//!
//! Best-effort telemetry: callers log and swallow errors.

use async_trait::async_trait;

use crate::domain::{JobId, SinkError, StatusUpdate, TaskKind};

#[async_trait]
pub trait StatusSink: Send + Sync {
    /// `task == None` reports the whole job.
    async fn update(
        &self,
        job: &JobId,
        task: Option<TaskKind>,
        update: &StatusUpdate,
    ) -> Result<(), SinkError>;
}
