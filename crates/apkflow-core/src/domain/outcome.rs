//! Outcome model: what a task produced and how its units of work ended.
//!
//! `TaskResult` is the closed set of result payloads the aggregator folds.
//! Each variant carries its typed payload, so the fold is an exhaustive
//! match instead of a comparison on the producer's name.

use serde::{Deserialize, Serialize};

use super::artifacts::{
    AccessibilityIssue, DisplayIssue, ScreenIdentity, TappabilityPrediction, UtgTrace,
};
use super::task_kind::TaskKind;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Accessibility(AccessibilityIssue),
    Display(DisplayIssue),
    Tappability(TappabilityPrediction),
    Utg(UtgTrace),
}

impl TaskResult {
    pub fn task(&self) -> TaskKind {
        match self {
            TaskResult::Accessibility(_) => TaskKind::Accessibility,
            TaskResult::Display(_) => TaskKind::DisplayIssue,
            TaskResult::Tappability(_) => TaskKind::Tappability,
            TaskResult::Utg(_) => TaskKind::UsageTrace,
        }
    }

    pub fn identity(&self) -> ScreenIdentity {
        match self {
            TaskResult::Accessibility(issue) => issue.screenshot.identity(),
            TaskResult::Display(issue) => issue.screenshot.identity(),
            TaskResult::Tappability(prediction) => prediction.screenshot.identity(),
            TaskResult::Utg(trace) => trace.screen.clone(),
        }
    }

    /// Reference image for the screen, uploaded when the entry is first seen.
    pub fn base_image(&self) -> &std::path::Path {
        match self {
            TaskResult::Accessibility(issue) => &issue.screenshot.image_path,
            TaskResult::Display(issue) => &issue.screenshot.image_path,
            TaskResult::Tappability(prediction) => &prediction.screenshot.image_path,
            TaskResult::Utg(trace) => &trace.image_path,
        }
    }
}

/// Unit-of-work classification.
///
/// Serialized as SCREAMING_SNAKE_CASE to match the status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitOutcome {
    Succeeded,
    Failed { reason: String },
}

/// A unit of work that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub unit: String,
    pub reason: String,
}

/// Summary of a task's units, used to pick the task's final status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub succeeded: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedUnit>,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Human readable summary for the status service `logs` field.
    pub fn summary(&self, task: TaskKind) -> String {
        if self.failed.is_empty() {
            return format!("{task} successful ({} units)", self.succeeded);
        }
        let reasons: Vec<String> = self
            .failed
            .iter()
            .map(|f| format!("{}: {}", f.unit, f.reason))
            .collect();
        format!(
            "{task} failed ({} succeeded, {} failed): {}",
            self.succeeded,
            self.failed.len(),
            reasons.join("; ")
        )
    }
}
