//! Status - ジョブとタスクの状態遷移
//!
//! Transitions reported to the status service:
//! - task: RUNNING -> SUCCESSFUL | FAILED
//! - job: SUCCESSFUL | FAILED, once, after every requested task finished

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Running,
    Successful,
    Failed,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Running => "RUNNING",
            StatusKind::Successful => "SUCCESSFUL",
            StatusKind::Failed => "FAILED",
        }
    }
}

/// Body of `POST /status/{job}[/{task}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: StatusKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: StatusKind) -> Self {
        Self { status, logs: None }
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = Some(logs.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_level_update_has_no_logs_field() {
        let s = serde_json::to_string(&StatusUpdate::new(StatusKind::Successful)).unwrap();
        assert_eq!(s, r#"{"status":"SUCCESSFUL"}"#);
    }

    #[test]
    fn task_level_update_carries_logs() {
        let update = StatusUpdate::new(StatusKind::Running).with_logs("xbot running");
        let v = serde_json::to_value(&update).unwrap();
        assert_eq!(v["status"], "RUNNING");
        assert_eq!(v["logs"], "xbot running");
    }
}
