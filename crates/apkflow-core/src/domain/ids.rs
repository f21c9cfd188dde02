//! Domain identifiers.
//!
//! Job ids arrive from the submission layer (usually UUID strings), so a
//! `JobId` accepts any non-empty token. Locally generated ids use ULID so
//! they sort by creation time (see `ports::id_generator`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of a job (one APK under analysis).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

/// JobId の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobIdError {
    #[error("job id must not be empty")]
    Empty,

    #[error("job id contains a path separator: {0}")]
    PathSeparator(String),
}

impl JobId {
    /// Validate and wrap an externally supplied id.
    ///
    /// The id doubles as a directory name and a storage key prefix, so path
    /// separators are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, JobIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(JobIdError::Empty);
        }
        if trimmed.contains('/') || trimmed.contains('\\') {
            return Err(JobIdError::PathSeparator(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// ULID から JobId を作成（"job-" プレフィックス付き）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("job-{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = JobIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn external_uuid_is_kept_verbatim() {
        let id = JobId::new("57730388-de61-45c1-8098-d449491004ec").unwrap();
        assert_eq!(id.as_str(), "57730388-de61-45c1-8098-d449491004ec");
        assert_eq!(id.to_string(), "57730388-de61-45c1-8098-d449491004ec");
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    fn empty_ids_are_rejected(#[case] raw: &str) {
        assert_eq!(JobId::new(raw), Err(JobIdError::Empty));
    }

    #[test]
    fn path_separators_are_rejected() {
        assert!(matches!(
            JobId::new("../etc"),
            Err(JobIdError::PathSeparator(_))
        ));
    }

    #[test]
    fn ulid_ids_are_prefixed_and_sortable() {
        let id1 = JobId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2)); // 時刻が進むのを待つ
        let id2 = JobId::from_ulid(Ulid::new());

        assert!(id1.as_str().starts_with("job-"));
        assert!(id1 < id2);
    }

    #[test]
    fn deserializing_validates() {
        let ok: JobId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");

        let err = serde_json::from_str::<JobId>("\"\"");
        assert!(err.is_err());
    }
}
