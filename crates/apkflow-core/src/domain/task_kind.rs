//! TaskKind - 解析タスクの種類
//!
//! The set of analysis tasks is closed. Each kind declares which resource
//! kinds it consumes and produces; the orchestrator derives the job's group
//! table from these declarations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::artifacts::SupplementaryKind;
use super::resource::ResourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Accessibility scanning (Xbot). Explores the app on an emulator.
    Accessibility,
    /// Visual display-issue detection (OwlEye).
    DisplayIssue,
    /// Tap-target prediction with heatmaps.
    Tappability,
    /// Usage-trace generation from a screen recording (GIFdroid).
    UsageTrace,
}

/// Unknown task name in a job request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task name: {0}")]
pub struct UnknownTask(pub String);

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Accessibility,
        TaskKind::DisplayIssue,
        TaskKind::Tappability,
        TaskKind::UsageTrace,
    ];

    /// Name used on the wire: sub-result key in the document and the task
    /// segment of status URLs.
    pub fn wire_name(self) -> &'static str {
        match self {
            TaskKind::Accessibility => "xbot",
            TaskKind::DisplayIssue => "owleye",
            TaskKind::Tappability => "tappable",
            TaskKind::UsageTrace => "gifdroid",
        }
    }

    pub fn inputs(self) -> &'static [ResourceType] {
        match self {
            TaskKind::Accessibility => &[ResourceType::ApkFile, ResourceType::Emulator],
            TaskKind::DisplayIssue => &[ResourceType::Screenshot],
            TaskKind::Tappability => &[ResourceType::Screenshot],
            TaskKind::UsageTrace => &[
                ResourceType::ApkFile,
                ResourceType::Emulator,
                ResourceType::SupplementaryFile,
            ],
        }
    }

    pub fn outputs(self) -> &'static [ResourceType] {
        match self {
            TaskKind::Accessibility => {
                &[ResourceType::Screenshot, ResourceType::AccessibilityIssue]
            }
            TaskKind::DisplayIssue => &[ResourceType::DisplayIssue],
            TaskKind::Tappability => &[ResourceType::TappabilityPrediction],
            TaskKind::UsageTrace => &[ResourceType::UtgTrace],
        }
    }

    /// The output kind the aggregator folds into the result document.
    pub fn result_kind(self) -> ResourceType {
        match self {
            TaskKind::Accessibility => ResourceType::AccessibilityIssue,
            TaskKind::DisplayIssue => ResourceType::DisplayIssue,
            TaskKind::Tappability => ResourceType::TappabilityPrediction,
            TaskKind::UsageTrace => ResourceType::UtgTrace,
        }
    }

    /// Supplementary upload this task expects alongside the APK, if any.
    pub fn supplementary(self) -> Option<SupplementaryKind> {
        match self {
            TaskKind::UsageTrace => Some(SupplementaryKind::Gif),
            _ => None,
        }
    }

    /// Does this task need an emulator lease?
    pub fn needs_emulator(self) -> bool {
        self.inputs().contains(&ResourceType::Emulator)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownTask;

    /// Accepts the wire name or the descriptive name, case-insensitively
    /// ("Xbot", "xbot", "accessibility", "display_issue", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "xbot" | "accessibility" => Ok(TaskKind::Accessibility),
            "owleye" | "display_issue" | "display" => Ok(TaskKind::DisplayIssue),
            "tappable" | "tappability" => Ok(TaskKind::Tappability),
            "gifdroid" | "usage_trace" | "utg" => Ok(TaskKind::UsageTrace),
            _ => Err(UnknownTask(s.to_string())),
        }
    }
}
