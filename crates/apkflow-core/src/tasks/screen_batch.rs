//! ScreenBatchTask - スクリーンショット単位のバッチ解析
//!
//! Shared driver for algorithms that take a directory of screenshots and
//! write one result per screen into an output directory. The per-algorithm
//! part (staging, call parameters, reading results) is a `ScreenAnalysis`.
//!
//! # フロー
//! 1. Screenshot を受信 → 画面 identity で重複排除して ledger に追加
//! 2. pending が batch_size に達したら（入力枯渇後は残り全部を）実行
//! 3. 結果を読み、作業単位を確定させてから出力を発行

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::{
    AnalysisTask, JobContext, Staging, TaskCore, TaskOptions, WorkLedger, subscribe_if_present,
};
use crate::bus::Subscriber;
use crate::domain::{
    AlgorithmError, BusError, DeliveryError, Resource, ResourceType, ResourceWrapper,
    ScreenIdentity, Screenshot, TaskKind, TaskReport, UnitOutcome,
};
use crate::ports::{AlgorithmBackend, AlgorithmCall};

#[async_trait]
pub trait ScreenAnalysis: Send + Sync + 'static {
    type Output: Resource;

    fn kind(&self) -> TaskKind;

    /// Copy one screen's inputs into the batch's staging directory.
    async fn stage(
        &self,
        staging: &Staging,
        id: &ScreenIdentity,
        shot: &Screenshot,
    ) -> io::Result<()>;

    fn call(&self, staging: &Staging, output: &Path) -> AlgorithmCall;

    /// Read one screen's result after a successful run. `Ok(None)` means
    /// the algorithm found nothing to report; `Err` fails the unit.
    async fn collect(
        &self,
        output: &Path,
        id: &ScreenIdentity,
        shot: &Screenshot,
    ) -> Result<Option<Self::Output>, String>;
}

type Batch = Vec<(ScreenIdentity, Screenshot)>;

pub struct ScreenBatchTask<A: ScreenAnalysis> {
    this: Weak<Self>,
    analysis: A,
    core: TaskCore,
    ledger: Mutex<WorkLedger<ScreenIdentity, Screenshot>>,
}

impl<A: ScreenAnalysis> ScreenBatchTask<A> {
    pub fn new(
        analysis: A,
        ctx: JobContext,
        backend: Arc<dyn AlgorithmBackend>,
        options: TaskOptions,
    ) -> Arc<Self> {
        let kind = analysis.kind();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            analysis,
            core: TaskCore::new(kind, ctx, backend, options),
            ledger: Mutex::new(WorkLedger::new()),
        })
    }

    /// Run every batch that is ready, then finalize outputs if complete.
    async fn pump(&self) -> Result<(), DeliveryError> {
        loop {
            let batch = {
                let mut ledger = self.ledger.lock();
                let flush = self.core.inputs_exhausted();
                let pending = ledger.pending();
                if pending == 0 || (!flush && pending < self.core.batch_size()) {
                    break;
                }
                ledger.take_pending(self.core.batch_size())
            };
            let (outcomes, results) = self.run_batch(batch).await;
            self.settle(outcomes, results).await?;
        }
        self.settle(Vec::new(), Vec::new()).await
    }

    async fn run_batch(
        &self,
        batch: Batch,
    ) -> (Vec<(ScreenIdentity, UnitOutcome)>, Vec<A::Output>) {
        let _drive = self.core.drive.lock().await;
        let n = self.core.next_batch();
        tracing::info!(
            job = %self.core.ctx.job_id,
            task = %self.core.kind,
            batch = n,
            units = batch.len(),
            "running batch"
        );

        let output = match self.invoke(n, &batch).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(task = %self.core.kind, batch = n, error = %err, "batch failed");
                let reason = err.to_string();
                let outcomes = batch
                    .into_iter()
                    .map(|(id, _)| (id, UnitOutcome::Failed { reason: reason.clone() }))
                    .collect();
                return (outcomes, Vec::new());
            }
        };

        let mut outcomes = Vec::with_capacity(batch.len());
        let mut results = Vec::new();
        for (id, shot) in batch {
            match self.analysis.collect(&output, &id, &shot).await {
                Ok(Some(result)) => {
                    results.push(result);
                    outcomes.push((id, UnitOutcome::Succeeded));
                }
                Ok(None) => outcomes.push((id, UnitOutcome::Succeeded)),
                Err(reason) => {
                    tracing::warn!(task = %self.core.kind, screen = %id, %reason, "unit failed");
                    outcomes.push((id, UnitOutcome::Failed { reason }));
                }
            }
        }
        (outcomes, results)
    }

    async fn invoke(&self, n: usize, batch: &Batch) -> Result<PathBuf, AlgorithmError> {
        let dir = self.core.dir();
        let staging = Staging::prepare(dir.join(format!("staging-{n}"))).await?;
        for (id, shot) in batch {
            self.analysis.stage(&staging, id, shot).await?;
        }
        let output = dir.join(format!("batch-{n}"));
        tokio::fs::create_dir_all(&output).await?;

        let call = self.analysis.call(&staging, &output);
        self.core.backend.invoke(&call).await?;
        Ok(output)
    }

    /// Record outcomes and publish results. The last publish is final when
    /// the task is complete after these outcomes.
    async fn settle(
        &self,
        outcomes: Vec<(ScreenIdentity, UnitOutcome)>,
        results: Vec<A::Output>,
    ) -> Result<(), DeliveryError> {
        let mut emit = self.core.outputs.lock().await;
        let settled = {
            let mut ledger = self.ledger.lock();
            for (id, outcome) in outcomes {
                ledger.record(&id, outcome);
            }
            ledger.is_settled()
        };
        let done = settled && self.core.inputs_exhausted();
        emit.emit(results, done).await?;
        Ok(())
    }

    /// Distinct screens admitted so far.
    pub fn known_units(&self) -> usize {
        self.ledger.lock().known()
    }
}

#[async_trait]
impl<A: ScreenAnalysis> Subscriber<Screenshot> for ScreenBatchTask<A> {
    fn subscriber_name(&self) -> &str {
        self.core.kind.wire_name()
    }

    async fn on_resource(
        &self,
        item: Arc<ResourceWrapper<Screenshot>>,
    ) -> Result<(), DeliveryError> {
        let shot = item.payload().clone();
        let admitted = self.ledger.lock().admit(shot.identity(), shot);
        if !admitted {
            tracing::debug!(
                task = %self.core.kind,
                sequence = item.sequence(),
                "screen already known"
            );
        }
        self.pump().await
    }

    async fn on_exhausted(&self, _kind: ResourceType) -> Result<(), DeliveryError> {
        self.pump().await
    }
}

#[async_trait]
impl<A: ScreenAnalysis> AnalysisTask for ScreenBatchTask<A> {
    fn kind(&self) -> TaskKind {
        self.core.kind
    }

    async fn attach(&self) -> Result<(), BusError> {
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        subscribe_if_present::<Screenshot>(self.core.resources(), this).await
    }

    fn is_complete(&self) -> bool {
        self.ledger.lock().is_settled() && self.core.inputs_exhausted()
    }

    fn report(&self) -> TaskReport {
        self.ledger.lock().report()
    }
}
