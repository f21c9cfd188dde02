//! Errors - エラー型と分類
//!
//! Three operational classes:
//! - Transport: results/status/storage services unreachable or rejecting
//! - Algorithm: an analysis backend failed or produced unreadable output
//! - Contract: misuse of the bus (publish after exhaustion, double subscribe)
//!
//! Nothing here is retried automatically.

use serde::{Deserialize, Serialize};

use super::ids::{JobId, JobIdError};
use super::resource::{Origin, ResourceType};
use super::task_kind::{TaskKind, UnknownTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Algorithm,
    Contract,
}

/// Bus contract violations. Programming errors, never recovered from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("publish to exhausted group {kind}")]
    Inactive { kind: ResourceType },

    #[error("{origin} already declared its final item on group {kind}")]
    ProducerFinished { kind: ResourceType, origin: Origin },

    #[error("{subscriber} is already subscribed to group {kind}")]
    AlreadySubscribed {
        kind: ResourceType,
        subscriber: String,
    },

    #[error("no {kind} group in this job")]
    MissingGroup { kind: ResourceType },
}

/// Failure of a blob storage upload.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage rejected upload of {key}: HTTP {status}")]
    Status { key: String, status: u16 },
}

/// Failure talking to the results or status service.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Failure of an external analysis algorithm invocation.
#[derive(Debug, thiserror::Error)]
pub enum AlgorithmError {
    #[error("algorithm request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("algorithm service answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("argument template references unknown parameter {{{0}}}")]
    MissingParam(String),

    #[error("unreadable algorithm output: {0}")]
    Output(String),

    #[error("staging files: {0}")]
    Staging(#[from] std::io::Error),
}

/// Error returned by a subscriber. Logged and recorded in the job's
/// delivery log; never stops delivery to other subscribers.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryError::Bus(_) => ErrorKind::Contract,
            DeliveryError::Algorithm(_) => ErrorKind::Algorithm,
            DeliveryError::Storage(_) => ErrorKind::Transport,
        }
    }
}

/// Job construction and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    InvalidId(#[from] JobIdError),

    #[error(transparent)]
    UnknownTask(#[from] UnknownTask),

    #[error("job requests no tasks")]
    NoTasks,

    #[error("no algorithm backend configured for {0}")]
    MissingBackend(TaskKind),

    #[error("{0} needs an emulator but none is configured")]
    MissingEmulator(TaskKind),

    #[error("unknown supplementary file task: {0}")]
    UnknownSupplementary(String),

    #[error("job {0} was already started")]
    AlreadyStarted(JobId),

    #[error("prepare job directory {path}: {source}")]
    Workspace {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Bus(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_errors_are_classified() {
        let contract = DeliveryError::from(BusError::Inactive {
            kind: ResourceType::Screenshot,
        });
        assert_eq!(contract.kind(), ErrorKind::Contract);

        let algorithm = DeliveryError::from(AlgorithmError::Output("bad".to_string()));
        assert_eq!(algorithm.kind(), ErrorKind::Algorithm);

        let storage = DeliveryError::from(StorageError::Status {
            key: "k".to_string(),
            status: 500,
        });
        assert_eq!(storage.kind(), ErrorKind::Transport);
    }

    #[test]
    fn bus_error_messages_name_the_group() {
        let err = BusError::ProducerFinished {
            kind: ResourceType::Screenshot,
            origin: Origin::Task(TaskKind::Accessibility),
        };
        assert_eq!(
            err.to_string(),
            "xbot already declared its final item on group SCREENSHOT"
        );
    }
}
