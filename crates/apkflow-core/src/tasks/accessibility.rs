//! AccessibilityTask (xbot) - アクセシビリティ問題の検出
//!
//! xbot explores the app on an emulator and leaves behind:
//!
//! ```text
//! {out}/screenshot/{activity}/*.png        (plus *_thumbnail.png)
//! {out}/layouts/{activity}.xml
//! {out}/issues/{activity}/{activity}.png   annotated screenshot
//! {out}/issues/{activity}/{activity}.txt   description
//! ```
//!
//! Every screenshot is published; issues only for activities xbot flagged.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::{
    AnalysisTask, JobContext, TaskCore, TaskOptions, WorkLedger, lease_emulator,
    subscribe_if_present,
};
use crate::bus::Subscriber;
use crate::domain::{
    AccessibilityIssue, AlgorithmError, ApkFile, BusError, DeliveryError, EmulatorSlot,
    ResourceType, ResourceWrapper, Screenshot, TaskKind, TaskReport, UnitOutcome,
};
use crate::ports::{AlgorithmBackend, AlgorithmCall};

/// Hex digits of the layout digest used as structure id.
const STRUCTURE_ID_LEN: usize = 16;

#[derive(Default)]
struct State {
    /// Keyed by APK path.
    ledger: WorkLedger<String, ApkFile>,
    emulators: Vec<EmulatorSlot>,
}

pub struct AccessibilityTask {
    this: Weak<Self>,
    core: TaskCore,
    state: Mutex<State>,
}

type Found = (Vec<Screenshot>, Vec<AccessibilityIssue>);

impl AccessibilityTask {
    pub fn new(ctx: JobContext, backend: Arc<dyn AlgorithmBackend>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            core: TaskCore::new(TaskKind::Accessibility, ctx, backend, TaskOptions::default()),
            state: Mutex::new(State::default()),
        })
    }

    /// Drain queued APKs while holding an emulator, then finalize if done.
    async fn drive(&self) -> Result<(), DeliveryError> {
        loop {
            let (slots, pending) = {
                let state = self.state.lock();
                (state.emulators.clone(), state.ledger.pending())
            };
            if pending == 0 {
                break;
            }
            if slots.is_empty() {
                if self.emulators_exhausted() {
                    self.fail_pending("no emulator available").await?;
                }
                break;
            }
            let Some(lease) = lease_emulator(&slots).await else {
                break;
            };

            let mut outcomes = Vec::new();
            let mut found: Found = (Vec::new(), Vec::new());
            loop {
                let batch = self.state.lock().ledger.take_pending(1);
                let Some((key, apk)) = batch.into_iter().next() else {
                    break;
                };
                tracing::info!(
                    job = %self.core.ctx.job_id,
                    apk = %key,
                    emulator = %lease.serial,
                    "running xbot"
                );
                match self.analyse(&apk, &lease.serial).await {
                    Ok((shots, issues)) => {
                        found.0.extend(shots);
                        found.1.extend(issues);
                        outcomes.push((key, UnitOutcome::Succeeded));
                    }
                    Err(err) => {
                        tracing::warn!(apk = %key, error = %err, "xbot failed");
                        outcomes.push((key, UnitOutcome::Failed { reason: err.to_string() }));
                    }
                }
            }
            lease.release();
            self.settle(outcomes, found).await?;
        }
        self.settle(Vec::new(), (Vec::new(), Vec::new())).await
    }

    fn emulators_exhausted(&self) -> bool {
        !self
            .core
            .resources()
            .is_active(ResourceType::Emulator)
            .unwrap_or(false)
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
        self.settle(outcomes, (Vec::new(), Vec::new())).await
    }

    async fn analyse(&self, apk: &ApkFile, serial: &str) -> Result<Found, AlgorithmError> {
        let out = self.core.dir();
        tokio::fs::create_dir_all(&out).await?;
        let call = AlgorithmCall::new(TaskKind::Accessibility)
            .path_param("apk_path", &apk.path)
            .path_param("output_dir", &out)
            .param("emulator", serial);
        self.core.backend.invoke(&call).await?;

        let shots = read_screenshots(&out).await?;
        let issues = read_issues(&out, &shots).await?;
        Ok((shots, issues))
    }

    async fn settle(
        &self,
        outcomes: Vec<(String, UnitOutcome)>,
        (shots, issues): Found,
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
        emit.emit(shots, done).await?;
        emit.emit(issues, done).await?;
        Ok(())
    }
}

async fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// One screenshot per activity directory: the first image that is not a
/// thumbnail.
async fn read_screenshots(out: &Path) -> Result<Vec<Screenshot>, AlgorithmError> {
    let images = out.join("screenshot");
    if !tokio::fs::try_exists(&images).await.unwrap_or(false) {
        return Err(AlgorithmError::Output(format!(
            "{} is missing",
            images.display()
        )));
    }

    let mut shots = Vec::new();
    for activity_dir in sorted_entries(&images).await? {
        if !activity_dir.is_dir() {
            continue;
        }
        let Some(activity) = activity_dir.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        let image = sorted_entries(&activity_dir)
            .await?
            .into_iter()
            .find(|p| {
                p.is_file()
                    && !p
                        .file_stem()
                        .map(|s| s.to_string_lossy().ends_with("_thumbnail"))
                        .unwrap_or(true)
            });
        let Some(image_path) = image else {
            continue;
        };
        let layout_path = out.join("layouts").join(format!("{activity}.xml"));
        let structure_id = structure_id(&layout_path, &activity).await;
        shots.push(Screenshot {
            screen: activity,
            structure_id,
            image_path,
            layout_path,
        });
    }
    Ok(shots)
}

/// Digest of the layout hierarchy; falls back to the activity name when
/// xbot wrote no layout.
async fn structure_id(layout: &Path, activity: &str) -> String {
    match tokio::fs::read(layout).await {
        Ok(bytes) => {
            let hex = blake3::hash(&bytes).to_hex();
            hex.as_str()[..STRUCTURE_ID_LEN].to_string()
        }
        Err(_) => activity.to_string(),
    }
}

async fn read_issues(
    out: &Path,
    shots: &[Screenshot],
) -> Result<Vec<AccessibilityIssue>, AlgorithmError> {
    let mut issues = Vec::new();
    for shot in shots {
        let dir = out.join("issues").join(&shot.screen);
        let image_path = dir.join(format!("{}.png", shot.screen));
        let description_path = dir.join(format!("{}.txt", shot.screen));
        if !tokio::fs::try_exists(&image_path).await.unwrap_or(false) {
            continue;
        }
        let description = match tokio::fs::read_to_string(&description_path).await {
            Ok(text) => text.trim().to_string(),
            Err(_) => continue,
        };
        issues.push(AccessibilityIssue {
            screenshot: shot.clone(),
            image_path,
            description,
        });
    }
    Ok(issues)
}

#[async_trait]
impl Subscriber<ApkFile> for AccessibilityTask {
    fn subscriber_name(&self) -> &str {
        TaskKind::Accessibility.wire_name()
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
impl Subscriber<EmulatorSlot> for AccessibilityTask {
    fn subscriber_name(&self) -> &str {
        TaskKind::Accessibility.wire_name()
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
impl AnalysisTask for AccessibilityTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Accessibility
    }

    async fn attach(&self) -> Result<(), BusError> {
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        let resources = self.core.resources();
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
