//! JobContext - ジョブごとの実行コンテキスト
//!
//! Handed to every task and to the aggregator at construction. It is the
//! only way to reach the job's groups.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bus::ResourceTable;
use crate::domain::{JobId, TaskKind};

#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    /// `{work_root}/{job_id}`; every local artifact of the job lives below.
    pub output_dir: PathBuf,
    pub resources: Arc<ResourceTable>,
}

impl JobContext {
    pub fn new(job_id: JobId, output_dir: PathBuf, resources: Arc<ResourceTable>) -> Self {
        Self {
            job_id,
            output_dir,
            resources,
        }
    }

    /// Output directory of one task, named after its wire name.
    pub fn task_dir(&self, kind: TaskKind) -> PathBuf {
        self.output_dir.join(kind.wire_name())
    }
}
