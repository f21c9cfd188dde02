//! Tasks - 解析タスク
//!
//! A task subscribes to its input groups, turns received items into units
//! of work, runs its algorithm backend over them and publishes what the
//! algorithm produced into its output groups.
//!
//! # 完了条件
//! `is_complete()` は「既知の作業単位がすべて確定」かつ「入力グループが
//! すべて枯渇」のときだけ true。入力の枯渇だけでは完了にしない。
//!
//! # 含まれるタスク
//! - **AccessibilityTask** (xbot): APK + emulator -> screenshots, accessibility issues
//! - **DisplayIssueTask** (owleye): screenshot -> display issues (batched)
//! - **TappabilityTask** (tappable): screenshot -> tap predictions (batched)
//! - **UsageTraceTask** (gifdroid): APK + emulator + recording -> UTG

pub mod accessibility;
pub mod context;
pub mod display;
pub mod ledger;
pub mod outputs;
pub mod screen_batch;
pub mod staging;
pub mod tappability;
pub mod usage_trace;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::bus::{Lease, ResourceTable, Subscriber};
use crate::domain::{BusError, EmulatorDevice, EmulatorSlot, Resource, TaskKind, TaskReport};
use crate::ports::AlgorithmBackend;

pub use self::accessibility::AccessibilityTask;
pub use self::context::JobContext;
pub use self::display::{DisplayIssueTask, Owleye};
pub use self::ledger::WorkLedger;
pub use self::outputs::{EmitGuard, Outputs};
pub use self::screen_batch::{ScreenAnalysis, ScreenBatchTask};
pub use self::staging::Staging;
pub use self::tappability::{Tappable, TappabilityTask};
pub use self::usage_trace::UsageTraceTask;

/// A running analysis task of one job.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Subscribe to every declared input group present in the job.
    /// Replay means this may already run work for items published earlier.
    async fn attach(&self) -> Result<(), BusError>;

    fn is_complete(&self) -> bool;

    fn report(&self) -> TaskReport;
}

/// Per-task tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Units per backend invocation for batched tasks.
    pub batch_size: usize,
    /// Tap prediction threshold in percent.
    pub threshold: u32,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            batch_size: 8,
            threshold: 50,
        }
    }
}

/// Construct the task of `kind` for one job. Not attached yet.
pub fn build_task(
    kind: TaskKind,
    ctx: JobContext,
    backend: Arc<dyn AlgorithmBackend>,
    options: TaskOptions,
) -> Arc<dyn AnalysisTask> {
    match kind {
        TaskKind::Accessibility => AccessibilityTask::new(ctx, backend),
        TaskKind::DisplayIssue => DisplayIssueTask::new(Owleye, ctx, backend, options),
        TaskKind::Tappability => {
            TappabilityTask::new(Tappable::new(options.threshold), ctx, backend, options)
        }
        TaskKind::UsageTrace => UsageTraceTask::new(ctx, backend),
    }
}

/// State every task carries.
pub(crate) struct TaskCore {
    pub kind: TaskKind,
    pub ctx: JobContext,
    pub backend: Arc<dyn AlgorithmBackend>,
    pub outputs: Outputs,
    pub options: TaskOptions,
    /// Held for the duration of a backend run; one run per task at a time.
    pub drive: tokio::sync::Mutex<()>,
    batches: AtomicUsize,
}

impl TaskCore {
    pub fn new(
        kind: TaskKind,
        ctx: JobContext,
        backend: Arc<dyn AlgorithmBackend>,
        options: TaskOptions,
    ) -> Self {
        let outputs = Outputs::new(kind, Arc::clone(&ctx.resources));
        Self {
            kind,
            ctx,
            backend,
            outputs,
            options,
            drive: tokio::sync::Mutex::new(()),
            batches: AtomicUsize::new(0),
        }
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.ctx.resources
    }

    pub fn inputs_exhausted(&self) -> bool {
        self.resources().all_exhausted(self.kind.inputs())
    }

    pub fn dir(&self) -> PathBuf {
        self.ctx.task_dir(self.kind)
    }

    pub fn next_batch(&self) -> usize {
        self.batches.fetch_add(1, Ordering::Relaxed)
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size.max(1)
    }
}

/// Subscribe when the job has a group of this kind.
pub(crate) async fn subscribe_if_present<T: Resource>(
    resources: &ResourceTable,
    subscriber: Arc<dyn Subscriber<T>>,
) -> Result<(), BusError> {
    match resources.group::<T>() {
        Some(group) => group.subscribe(subscriber).await,
        None => Ok(()),
    }
}

/// Take any free emulator, or wait until one of them is released.
pub(crate) async fn lease_emulator(slots: &[EmulatorSlot]) -> Option<Lease<EmulatorDevice>> {
    if slots.is_empty() {
        return None;
    }
    loop {
        if let Some(lease) = slots.iter().find_map(|slot| slot.try_acquire()) {
            return Some(lease);
        }
        let releases = slots.iter().map(|slot| Box::pin(slot.released()));
        futures::future::select_all(releases).await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Exclusive;
    use std::time::Duration;

    fn device(serial: &str) -> EmulatorSlot {
        Exclusive::new(EmulatorDevice {
            serial: serial.to_string(),
        })
    }

    #[tokio::test]
    async fn no_emulators_means_no_lease() {
        assert!(lease_emulator(&[]).await.is_none());
    }

    #[tokio::test]
    async fn free_emulator_is_taken_without_waiting() {
        let a = device("emulator-5554");
        let b = device("emulator-5556");
        let _held = a.try_acquire().unwrap();

        let lease = lease_emulator(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(lease.serial, "emulator-5556");
        assert!(!b.is_available());
    }

    #[tokio::test]
    async fn waits_for_whichever_emulator_is_released_first() {
        let a = device("emulator-5554");
        let b = device("emulator-5556");
        let _held_a = a.try_acquire().unwrap();
        let held_b = b.try_acquire().unwrap();

        let waiter = tokio::spawn({
            let slots = vec![a.clone(), b.clone()];
            async move {
                lease_emulator(&slots)
                    .await
                    .map(|lease| lease.serial.clone())
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(held_b);

        let serial = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke up")
            .unwrap();
        assert_eq!(serial.as_deref(), Some("emulator-5556"));
        assert!(!a.is_available());
    }
}
