//! DeliveryLog - 配送失敗の記録
//!
//! Subscriber failures never stop delivery. They are logged and collected
//! here so the job can report them once it is done.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{DeliveryError, ErrorKind, ResourceType};

/// One failed delivery (or exhaustion notification) to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub group: ResourceType,
    pub subscriber: String,
    /// `None` for exhaustion notifications.
    pub sequence: Option<u64>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Shared, append-only failure log of one job.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    failures: Arc<Mutex<Vec<DeliveryFailure>>>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        group: ResourceType,
        subscriber: &str,
        sequence: Option<u64>,
        error: &DeliveryError,
    ) {
        tracing::warn!(
            group = %group,
            subscriber,
            sequence,
            kind = ?error.kind(),
            error = %error,
            "subscriber failed"
        );
        self.failures.lock().push(DeliveryFailure {
            group,
            subscriber: subscriber.to_string(),
            sequence,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn snapshot(&self) -> Vec<DeliveryFailure> {
        self.failures.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BusError;

    #[test]
    fn clones_share_the_same_log() {
        let log = DeliveryLog::new();
        let other = log.clone();
        other.record(
            ResourceType::Screenshot,
            "owleye",
            Some(3),
            &DeliveryError::from(BusError::Inactive {
                kind: ResourceType::DisplayIssue,
            }),
        );

        let failures = log.snapshot();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subscriber, "owleye");
        assert_eq!(failures[0].sequence, Some(3));
        assert_eq!(failures[0].kind, ErrorKind::Contract);
    }
}
