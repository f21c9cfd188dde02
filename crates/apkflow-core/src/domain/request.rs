//! Job submission body.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A request to analyse one APK.
///
/// Shape matches what the web front end posts:
/// ```json
/// {
///   "uuid": "57730388-de61-45c1-8098-d449491004ec",
///   "algorithms": ["xbot", "owleye"],
///   "apk_file": "/home/data/uploads/a2dp.Vol_133.apk",
///   "additional_files": { "gifdroid": "/home/data/uploads/run.gif" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job identity. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Requested task names (see `TaskKind::from_str`).
    pub algorithms: Vec<String>,

    pub apk_file: PathBuf,

    /// Supplementary files keyed by the task name they were uploaded for.
    #[serde(default)]
    pub additional_files: BTreeMap<String, PathBuf>,
}
