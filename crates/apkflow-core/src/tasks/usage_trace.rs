//! UsageTraceTask (gifdroid) - 画面録画からの利用トレース生成
//!
//! droidbot explores the app and records a UI transition graph (UTG);
//! gifdroid then maps the user's screen recording onto that graph. The
//! service leaves `utg.json` and `trace.json` in the output directory.
//! The first UTG node is the entry screen and keys the result.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use super::{
    AnalysisTask, JobContext, TaskCore, TaskOptions, WorkLedger, lease_emulator,
    subscribe_if_present,
};
use crate::bus::Subscriber;
use crate::domain::{
    AlgorithmError, ApkFile, BusError, DeliveryError, EmulatorSlot, ResourceType,
    ResourceWrapper, ScreenIdentity, SupplementaryFile, SupplementaryKind, TaskKind, TaskReport,
    UnitOutcome, UtgTrace,
};
use crate::ports::{AlgorithmBackend, AlgorithmCall};

#[derive(Debug, Deserialize)]
struct Utg {
    nodes: Vec<UtgNode>,
}

#[derive(Debug, Deserialize)]
struct UtgNode {
    activity: String,
    #[serde(default)]
    structure_str: Option<String>,
    image: PathBuf,
}

#[derive(Default)]
struct State {
    ledger: WorkLedger<String, ApkFile>,
    emulators: Vec<EmulatorSlot>,
    recording: Option<PathBuf>,
}

pub struct UsageTraceTask {
    this: Weak<Self>,
    core: TaskCore,
    state: Mutex<State>,
}

impl UsageTraceTask {
    pub fn new(ctx: JobContext, backend: Arc<dyn AlgorithmBackend>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            core: TaskCore::new(TaskKind::UsageTrace, ctx, backend, TaskOptions::default()),
            state: Mutex::new(State::default()),
        })
    }

    async fn drive(&self) -> Result<(), DeliveryError> {
        loop {
            let (slots, pending, recording) = {
                let state = self.state.lock();
                (
                    state.emulators.clone(),
                    state.ledger.pending(),
                    state.recording.clone(),
                )
            };
            if pending == 0 {
                break;
            }
            let Some(recording) = recording else {
                if self.exhausted(ResourceType::SupplementaryFile) {
                    self.fail_pending("no screen recording supplied").await?;
                }
                break;
            };
            if slots.is_empty() {
                if self.exhausted(ResourceType::Emulator) {
                    self.fail_pending("no emulator available").await?;
                }
                break;
            }
            let Some(lease) = lease_emulator(&slots).await else {
                break;
            };

            let mut outcomes = Vec::new();
            let mut traces = Vec::new();
            loop {
                let batch = self.state.lock().ledger.take_pending(1);
                let Some((key, apk)) = batch.into_iter().next() else {
                    break;
                };
                tracing::info!(
                    job = %self.core.ctx.job_id,
                    apk = %key,
                    emulator = %lease.serial,
                    "running gifdroid"
                );
                match self.analyse(&apk, &recording, &lease.serial).await {
                    Ok(trace) => {
                        traces.push(trace);
                        outcomes.push((key, UnitOutcome::Succeeded));
                    }
                    Err(err) => {
                        tracing::warn!(apk = %key, error = %err, "gifdroid failed");
                        outcomes.push((key, UnitOutcome::Failed { reason: err.to_string() }));
                    }
                }
            }
            lease.release();
            self.settle(outcomes, traces).await?;
        }
        self.settle(Vec::new(), Vec::new()).await
    }

    /// Absent groups count as exhausted.
    fn exhausted(&self, kind: ResourceType) -> bool {
        !self.core.resources().is_active(kind).unwrap_or(false)
    }

    async fn fail_pending(&self, reason: &str) -> Result<(), DeliveryError> {
        let outcomes = self
            .state
            .lock()
            .ledger
            .take_all()
            .into_iter()
            .map(|(key, _)| {
                (
                    key,
                    UnitOutcome::Failed {
                        reason: reason.to_string(),
                    },
                )
            })
            .collect();
        self.settle(outcomes, Vec::new()).await
    }

    async fn analyse(
        &self,
        apk: &ApkFile,
        recording: &std::path::Path,
        serial: &str,
    ) -> Result<UtgTrace, AlgorithmError> {
        let out = self.core.dir();
        tokio::fs::create_dir_all(&out).await?;
        let call = AlgorithmCall::new(TaskKind::UsageTrace)
            .path_param("apk_path", &apk.path)
            .path_param("gif_path", recording)
            .path_param("output_dir", &out)
            .param("emulator", serial);
        self.core.backend.invoke(&call).await?;

        let utg_path = out.join("utg.json");
        let trace_path = out.join("trace.json");
        let raw = tokio::fs::read(&utg_path)
            .await
            .map_err(|e| AlgorithmError::Output(format!("read {}: {e}", utg_path.display())))?;
        let utg: Utg = serde_json::from_slice(&raw)
            .map_err(|e| AlgorithmError::Output(format!("parse {}: {e}", utg_path.display())))?;
        let entry = utg
            .nodes
            .into_iter()
            .next()
            .ok_or_else(|| AlgorithmError::Output("UTG has no nodes".to_string()))?;
        if !tokio::fs::try_exists(&trace_path).await.unwrap_or(false) {
            return Err(AlgorithmError::Output(format!(
                "{} is missing",
                trace_path.display()
            )));
        }

        let structure_id = entry.structure_str.unwrap_or_else(|| entry.activity.clone());
        Ok(UtgTrace {
            screen: ScreenIdentity::new(entry.activity, structure_id),
            image_path: out.join(entry.image),
            utg_path,
            trace_path,
        })
    }

    async fn settle(
        &self,
        outcomes: Vec<(String, UnitOutcome)>,
        traces: Vec<UtgTrace>,
    ) -> Result<(), DeliveryError> {
        let mut emit = self.core.outputs.lock().await;
        let settled = {
            let mut state = self.state.lock();
            for (key, outcome) in outcomes {
                state.ledger.record(&key, outcome);
            }
            state.ledger.is_settled()
        };
        let done = settled && self.core.inputs_exhausted();
        emit.emit(traces, done).await?;
        Ok(())
    }
}

#[async_trait]
impl Subscriber<ApkFile> for UsageTraceTask {
    fn subscriber_name(&self) -> &str {
        TaskKind::UsageTrace.wire_name()
    }

    async fn on_resource(&self, item: Arc<ResourceWrapper<ApkFile>>) -> Result<(), DeliveryError> {
        let apk = item.payload().clone();
        let key = apk.path.display().to_string();
        self.state.lock().ledger.admit(key, apk);
        self.drive().await
    }

    async fn on_exhausted(&self, _kind: ResourceType) -> Result<(), DeliveryError> {
        self.drive().await
    }
}

#[async_trait]
impl Subscriber<EmulatorSlot> for UsageTraceTask {
    fn subscriber_name(&self) -> &str {
        TaskKind::UsageTrace.wire_name()
    }

    async fn on_resource(
        &self,
        item: Arc<ResourceWrapper<EmulatorSlot>>,
    ) -> Result<(), DeliveryError> {
        {
            let mut state = self.state.lock();
            let slot = item.payload();
            if !state.emulators.iter().any(|known| known.same_slot(slot)) {
                state.emulators.push(slot.clone());
            }
        }
        self.drive().await
    }

    async fn on_exhausted(&self, _kind: ResourceType) -> Result<(), DeliveryError> {
        self.drive().await
    }
}

#[async_trait]
impl Subscriber<SupplementaryFile> for UsageTraceTask {
    fn subscriber_name(&self) -> &str {
        TaskKind::UsageTrace.wire_name()
    }

    async fn on_resource(
        &self,
        item: Arc<ResourceWrapper<SupplementaryFile>>,
    ) -> Result<(), DeliveryError> {
        let file = item.payload();
        if file.kind != SupplementaryKind::Gif {
            return Ok(());
        }
        self.state
            .lock()
            .recording
            .get_or_insert_with(|| file.path.clone());
        self.drive().await
    }

    async fn on_exhausted(&self, _kind: ResourceType) -> Result<(), DeliveryError> {
        self.drive().await
    }
}

#[async_trait]
impl AnalysisTask for UsageTraceTask {
    fn kind(&self) -> TaskKind {
        TaskKind::UsageTrace
    }

    async fn attach(&self) -> Result<(), BusError> {
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        let resources = self.core.resources();
        subscribe_if_present::<SupplementaryFile>(resources, this.clone()).await?;
        subscribe_if_present::<EmulatorSlot>(resources, this.clone()).await?;
        subscribe_if_present::<ApkFile>(resources, this).await
    }

    fn is_complete(&self) -> bool {
        self.state.lock().ledger.is_settled() && self.core.inputs_exhausted()
    }

    fn report(&self) -> TaskReport {
        self.state.lock().ledger.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Exclusive, ResourceGroup};
    use crate::domain::{EmulatorDevice, Origin};
    use crate::tasks::testing::{FakeBackend, context, table};
    use std::path::Path;

    fn gifdroid_backend() -> Arc<FakeBackend> {
        FakeBackend::new(|call| async move {
            let out = PathBuf::from(call.get("output_dir").unwrap_or_default());
            std::fs::create_dir_all(out.join("states"))?;
            std::fs::write(out.join("states/screen_0.png"), b"png")?;
            std::fs::write(
                out.join("utg.json"),
                r#"{"nodes":[
                    {"activity":"MainActivity","structure_str":"f00d",
                     "image":"states/screen_0.png"},
                    {"activity":"Settings","image":"states/screen_1.png"}
                ]}"#,
            )?;
            std::fs::write(out.join("trace.json"), "[0]")?;
            Ok(())
        })
    }

    struct Fixture {
        apks: Arc<ResourceGroup<ApkFile>>,
        emulators: Arc<ResourceGroup<EmulatorSlot>>,
        files: Arc<ResourceGroup<SupplementaryFile>>,
        traces: Arc<ResourceGroup<UtgTrace>>,
        ctx: JobContext,
    }

    fn fixture(dir: &Path, supplementary_producers: usize) -> Fixture {
        let mut t = table();
        let apks = t.create::<ApkFile>(1);
        let emulators = t.create::<EmulatorSlot>(1);
        let files = t.create::<SupplementaryFile>(supplementary_producers);
        let traces = t.create::<UtgTrace>(1);
        Fixture {
            apks,
            emulators,
            files,
            traces,
            ctx: context(dir, t),
        }
    }

    async fn seed(f: &Fixture, dir: &Path, with_recording: bool) {
        if with_recording {
            f.files
                .publish(
                    Origin::Seed,
                    SupplementaryFile {
                        kind: SupplementaryKind::Gif,
                        path: dir.join("recording.gif"),
                    },
                    true,
                )
                .await
                .unwrap();
        }
        f.emulators
            .publish(
                Origin::Seed,
                Exclusive::new(EmulatorDevice {
                    serial: "emulator-5556".to_string(),
                }),
                true,
            )
            .await
            .unwrap();
        f.apks
            .publish(
                Origin::Seed,
                ApkFile {
                    path: dir.join("app.apk"),
                },
                true,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn entry_screen_of_the_utg_keys_the_trace() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), 1);
        let backend = gifdroid_backend();
        let task = UsageTraceTask::new(f.ctx.clone(), backend.clone());
        task.attach().await.unwrap();
        seed(&f, dir.path(), true).await;

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0]["gif_path"].ends_with("recording.gif"));

        let traces = f.traces.items();
        assert_eq!(traces.len(), 1);
        let trace = traces[0].payload();
        assert_eq!(trace.screen, ScreenIdentity::new("MainActivity", "f00d"));
        assert!(trace.image_path.ends_with("states/screen_0.png"));
        assert!(!f.traces.is_active());
        assert!(task.is_complete());
        assert!(task.report().is_success());
    }

    #[tokio::test]
    async fn missing_recording_fails_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), 0);
        let backend = gifdroid_backend();
        let task = UsageTraceTask::new(f.ctx.clone(), backend.clone());
        task.attach().await.unwrap();
        seed(&f, dir.path(), false).await;

        assert!(backend.calls().is_empty());
        let report = task.report();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason, "no screen recording supplied");
        assert!(!f.traces.is_active());
        assert!(task.is_complete());
    }

    #[tokio::test]
    async fn unreadable_utg_is_an_algorithm_failure() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(dir.path(), 1);
        let backend = FakeBackend::new(|call| async move {
            let out = PathBuf::from(call.get("output_dir").unwrap_or_default());
            std::fs::write(out.join("utg.json"), "var utg = {}")?;
            Ok(())
        });
        let task = UsageTraceTask::new(f.ctx.clone(), backend);
        task.attach().await.unwrap();
        seed(&f, dir.path(), true).await;

        let report = task.report();
        assert!(report.failed[0].reason.starts_with("unreadable algorithm output: parse"));
        assert!(f.traces.is_empty());
        assert!(!f.traces.is_active());
    }
}
