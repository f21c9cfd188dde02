//! WorkLedger - タスク内の作業単位の管理
//!
//! Tracks every unit a task has seen, keyed by the task's own notion of
//! identity. A unit moves pending -> in flight -> settled; a key is
//! admitted at most once for the lifetime of the task.

use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use crate::domain::{FailedUnit, TaskReport, UnitOutcome};

#[derive(Debug)]
pub struct WorkLedger<K, U> {
    seen: HashSet<K>,
    pending: VecDeque<(K, U)>,
    in_flight: HashSet<K>,
    report: TaskReport,
}

impl<K, U> Default for WorkLedger<K, U> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            pending: VecDeque::new(),
            in_flight: HashSet::new(),
            report: TaskReport::default(),
        }
    }
}

impl<K: Eq + Hash + Clone + Display, U> WorkLedger<K, U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `unit` unless `key` was seen before. Returns whether it was new.
    pub fn admit(&mut self, key: K, unit: U) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.pending.push_back((key, unit));
        true
    }

    /// Move up to `limit` pending units, oldest first, into flight.
    pub fn take_pending(&mut self, limit: usize) -> Vec<(K, U)> {
        let n = limit.min(self.pending.len());
        let batch: Vec<(K, U)> = self.pending.drain(..n).collect();
        for (key, _) in &batch {
            self.in_flight.insert(key.clone());
        }
        batch
    }

    pub fn take_all(&mut self) -> Vec<(K, U)> {
        self.take_pending(usize::MAX)
    }

    /// Settle an in-flight unit. Unknown or already settled keys are ignored.
    pub fn record(&mut self, key: &K, outcome: UnitOutcome) {
        if !self.in_flight.remove(key) {
            return;
        }
        match outcome {
            UnitOutcome::Succeeded => self.report.succeeded += 1,
            UnitOutcome::Failed { reason } => self.report.failed.push(FailedUnit {
                unit: key.to_string(),
                reason,
            }),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Distinct units admitted so far.
    pub fn known(&self) -> usize {
        self.seen.len()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    pub fn report(&self) -> TaskReport {
        self.report.clone()
    }
}
