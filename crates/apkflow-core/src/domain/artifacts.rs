//! Payload types carried on the bus.
//!
//! Paths are local to the machine running the job; they are replaced by
//! blob references before anything leaves the process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::resource::{Resource, ResourceType};
use crate::bus::Exclusive;

/// The APK under analysis. Exactly one per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApkFile {
    pub path: PathBuf,
}

impl Resource for ApkFile {
    const KIND: ResourceType = ResourceType::ApkFile;
}

/// An emulator reachable over adb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorDevice {
    /// adb connection string, e.g. `emulator-5554` or `host:5555`.
    pub serial: String,
}

/// Emulators are published as exclusive capabilities; a consumer must hold
/// the lease while it drives the device.
pub type EmulatorSlot = Exclusive<EmulatorDevice>;

impl Resource for EmulatorSlot {
    const KIND: ResourceType = ResourceType::Emulator;
}

/// Hex digits of the identity digest in a stage name.
const STAGE_DIGEST_LEN: usize = 12;

/// Logical screen identity used to key the result document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScreenIdentity {
    /// Activity name.
    pub screen: String,
    pub structure_id: String,
}

impl ScreenIdentity {
    pub fn new(screen: impl Into<String>, structure_id: impl Into<String>) -> Self {
        Self {
            screen: screen.into(),
            structure_id: structure_id.into(),
        }
    }

    /// File-system safe name used when staging files for batched runs.
    ///
    /// Sanitizing alone can map two identities onto one name, so a digest
    /// of the unsanitized pair is appended.
    pub fn stage_name(&self) -> String {
        let readable: String = format!("{}-{}", self.screen, self.structure_id)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.screen.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.structure_id.as_bytes());
        let digest = hasher.finalize().to_hex();
        format!("{readable}-{}", &digest.as_str()[..STAGE_DIGEST_LEN])
    }
}

impl fmt::Display for ScreenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.screen, self.structure_id)
    }
}

/// A captured UI state: screenshot image plus layout hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub screen: String,
    pub structure_id: String,
    pub image_path: PathBuf,
    pub layout_path: PathBuf,
}

impl Screenshot {
    pub fn identity(&self) -> ScreenIdentity {
        ScreenIdentity::new(self.screen.clone(), self.structure_id.clone())
    }
}

impl Resource for Screenshot {
    const KIND: ResourceType = ResourceType::Screenshot;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibilityIssue {
    pub screenshot: Screenshot,
    /// Screenshot annotated with the offending elements.
    pub image_path: PathBuf,
    pub description: String,
}

impl Resource for AccessibilityIssue {
    const KIND: ResourceType = ResourceType::AccessibilityIssue;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayIssue {
    pub screenshot: Screenshot,
    pub image_path: PathBuf,
}

impl Resource for DisplayIssue {
    const KIND: ResourceType = ResourceType::DisplayIssue;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TappabilityPrediction {
    pub screenshot: Screenshot,
    pub image_path: PathBuf,
    pub description: String,
    pub heatmaps: Vec<PathBuf>,
}

impl Resource for TappabilityPrediction {
    const KIND: ResourceType = ResourceType::TappabilityPrediction;
}

/// UI transition graph plus the execution trace reconstructed from a
/// screen recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtgTrace {
    /// Entry screen of the graph.
    pub screen: ScreenIdentity,
    pub image_path: PathBuf,
    pub utg_path: PathBuf,
    pub trace_path: PathBuf,
}

impl Resource for UtgTrace {
    const KIND: ResourceType = ResourceType::UtgTrace;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplementaryKind {
    /// Screen recording used by usage-trace generation.
    Gif,
    /// UI design rules file.
    UiRules,
}

impl SupplementaryKind {
    /// Maps the task name a file was uploaded for to the file kind.
    pub fn for_task_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gifdroid" | "usage_trace" => Some(SupplementaryKind::Gif),
            "uichecker" => Some(SupplementaryKind::UiRules),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementaryFile {
    pub kind: SupplementaryKind,
    pub path: PathBuf,
}

impl Resource for SupplementaryFile {
    const KIND: ResourceType = ResourceType::SupplementaryFile;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_name_is_filesystem_safe() {
        let id = ScreenIdentity::new("com.app/.LoginActivity", "a1 b2");
        let name = id.stage_name();
        assert!(name.starts_with("com.app_.LoginActivity-a1_b2-"));
        assert_eq!(name.len(), "com.app_.LoginActivity-a1_b2-".len() + STAGE_DIGEST_LEN);
        assert!(!name.contains('/') && !name.contains(' '));
        assert_eq!(name, id.stage_name());
    }

    #[test]
    fn stage_names_keep_identities_apart() {
        let a = ScreenIdentity::new("A-b", "c");
        let b = ScreenIdentity::new("A", "b-c");
        assert_ne!(a.stage_name(), b.stage_name());

        let c = ScreenIdentity::new("Main Activity", "s");
        let d = ScreenIdentity::new("Main/Activity", "s");
        assert_ne!(c.stage_name(), d.stage_name());
    }

    #[test]
    fn supplementary_kind_follows_task_name() {
        assert_eq!(SupplementaryKind::for_task_name("Gifdroid"), Some(SupplementaryKind::Gif));
        assert_eq!(SupplementaryKind::for_task_name("uichecker"), Some(SupplementaryKind::UiRules));
        assert_eq!(SupplementaryKind::for_task_name("xbot"), None);
    }
}
