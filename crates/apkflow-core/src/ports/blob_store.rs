//! BlobStore port - Blob ストレージ（S3 互換 / Local）
//!
//! Binary artifacts (screenshots, annotated images, heatmaps, traces) are
//! uploaded before they are referenced from anything pushed to the results
//! service. The document never carries a local path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::domain::{JobId, StorageError};

/// Resolvable reference to an uploaded blob (an URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<BlobRef> for String {
    fn from(blob: BlobRef) -> Self {
        blob.0
    }
}

/// Where a job's uploads go.
///
/// # 設計原則
/// - key は `{job}/{job ディレクトリからの相対パス}`
/// - 同じパスの再アップロードは同じ key を上書きする（冪等）
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `key` is the storage key computed by [`blob_key`].
    async fn upload(&self, key: &str, local_path: &Path) -> Result<BlobRef, StorageError>;
}

/// Storage key for a file produced inside (or outside) a job directory.
///
/// Files under `job_dir` keep their relative path; anything else is keyed
/// by file name.
pub fn blob_key(job: &JobId, job_dir: &Path, local_path: &Path) -> String {
    let relative = local_path
        .strip_prefix(job_dir)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| rel.to_path_buf())
        .or_else(|| local_path.file_name().map(Into::into))
        .unwrap_or_default();
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{job}/{relative}")
}
