//! Observability - ジョブの状態ビュー
//!
//! Serializable snapshot of a job: group states, per-task progress,
//! delivery failures and the current result document.

use serde::Serialize;

use crate::app::ResultDocument;
use crate::bus::{DeliveryFailure, GroupSnapshot};
use crate::domain::{JobId, StatusKind, TaskKind, TaskReport};

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task: TaskKind,
    pub complete: bool,
    /// Terminal status once reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusKind>,
    pub report: TaskReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusKind>,
    pub groups: Vec<GroupSnapshot>,
    pub tasks: Vec<TaskSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DeliveryFailure>,
    pub document: ResultDocument,
}
