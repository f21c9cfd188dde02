//! Resource kinds and the envelope every published artifact travels in.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::task_kind::TaskKind;

/// Closed set of artifact kinds exchanged on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    ApkFile,
    Emulator,
    Screenshot,
    AccessibilityIssue,
    DisplayIssue,
    TappabilityPrediction,
    UtgTrace,
    SupplementaryFile,
}

impl ResourceType {
    pub const ALL: [ResourceType; 8] = [
        ResourceType::ApkFile,
        ResourceType::Emulator,
        ResourceType::Screenshot,
        ResourceType::AccessibilityIssue,
        ResourceType::DisplayIssue,
        ResourceType::TappabilityPrediction,
        ResourceType::UtgTrace,
        ResourceType::SupplementaryFile,
    ];
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::ApkFile => "APK_FILE",
            ResourceType::Emulator => "EMULATOR",
            ResourceType::Screenshot => "SCREENSHOT",
            ResourceType::AccessibilityIssue => "ACCESSIBILITY_ISSUE",
            ResourceType::DisplayIssue => "DISPLAY_ISSUE",
            ResourceType::TappabilityPrediction => "TAPPABILITY_PREDICTION",
            ResourceType::UtgTrace => "UTG_TRACE",
            ResourceType::SupplementaryFile => "SUPPLEMENTARY_FILE",
        };
        f.write_str(name)
    }
}

/// Resource は payload 型と ResourceType を対応付ける
///
/// # 使用例
/// ```ignore
/// impl Resource for Screenshot {
///     const KIND: ResourceType = ResourceType::Screenshot;
/// }
/// ```
///
/// A group for kind `K` only accepts the payload type whose `KIND` is `K`,
/// so an ill-typed publish does not compile.
pub trait Resource: fmt::Debug + Send + Sync + 'static {
    const KIND: ResourceType;
}

/// Who published an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "task", rename_all = "snake_case")]
pub enum Origin {
    /// Seeded by the orchestrator (APK, supplementary files, emulators).
    Seed,
    Task(TaskKind),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Seed => f.write_str("seed"),
            Origin::Task(kind) => write!(f, "{kind}"),
        }
    }
}

/// Immutable envelope around one published artifact.
///
/// Owned by the group that holds it; subscribers get `Arc` views.
#[derive(Debug)]
pub struct ResourceWrapper<T: Resource> {
    origin: Origin,
    payload: T,
    sequence: u64,
}

impl<T: Resource> ResourceWrapper<T> {
    pub(crate) fn new(origin: Origin, payload: T, sequence: u64) -> Self {
        Self {
            origin,
            payload,
            sequence,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Position within the group, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> ResourceType {
        T::KIND
    }
}
