//! TappabilityTask (tappable) - タップ可能性の予測
//!
//! tappable takes screenshots plus their layout annotations and writes one
//! directory per screen:
//!
//! ```text
//! {output}/{stage_name}/prediction.png
//! {output}/{stage_name}/description.txt
//! {output}/{stage_name}/heatmap*.png
//! ```

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use super::screen_batch::{ScreenAnalysis, ScreenBatchTask};
use super::staging::Staging;
use crate::domain::{ScreenIdentity, Screenshot, TappabilityPrediction, TaskKind};
use crate::ports::AlgorithmCall;

#[derive(Debug, Clone, Copy)]
pub struct Tappable {
    threshold: u32,
}

impl Tappable {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

pub type TappabilityTask = ScreenBatchTask<Tappable>;

#[async_trait]
impl ScreenAnalysis for Tappable {
    type Output = TappabilityPrediction;

    fn kind(&self) -> TaskKind {
        TaskKind::Tappability
    }

    async fn stage(
        &self,
        staging: &Staging,
        id: &ScreenIdentity,
        shot: &Screenshot,
    ) -> io::Result<()> {
        let name = id.stage_name();
        staging.stage_image(&name, &shot.image_path).await?;
        // a screen without a layout is still predicted from the image alone
        if tokio::fs::try_exists(&shot.layout_path).await.unwrap_or(false) {
            staging.stage_annotation(&name, &shot.layout_path).await?;
        }
        Ok(())
    }

    fn call(&self, staging: &Staging, output: &Path) -> AlgorithmCall {
        AlgorithmCall::new(TaskKind::Tappability)
            .path_param("images", &staging.images())
            .path_param("annotations", &staging.annotations())
            .path_param("output", output)
            .param("threshold", self.threshold.to_string())
    }

    async fn collect(
        &self,
        output: &Path,
        id: &ScreenIdentity,
        shot: &Screenshot,
    ) -> Result<Option<TappabilityPrediction>, String> {
        let dir = output.join(id.stage_name());
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err("no prediction produced".to_string());
        }
        let image_path = dir.join("prediction.png");
        if !tokio::fs::try_exists(&image_path).await.unwrap_or(false) {
            return Err("prediction image missing".to_string());
        }
        let description = tokio::fs::read_to_string(dir.join("description.txt"))
            .await
            .unwrap_or_default();
        let heatmaps = heatmaps(&dir).await.map_err(|e| format!("list heatmaps: {e}"))?;

        Ok(Some(TappabilityPrediction {
            screenshot: shot.clone(),
            image_path,
            description: description.trim().to_string(),
            heatmaps,
        }))
    }
}

async fn heatmaps(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("heatmap") && name.ends_with(".png") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Origin;
    use crate::tasks::testing::{Collector, FakeBackend, context, table};
    use crate::tasks::{AnalysisTask, TaskOptions};
    use std::sync::Arc;

    fn shot(dir: &Path, screen: &str) -> Screenshot {
        let image_path = dir.join(format!("{screen}.png"));
        let layout_path = dir.join(format!("{screen}.xml"));
        std::fs::write(&image_path, b"png").unwrap();
        std::fs::write(&layout_path, b"<hierarchy/>").unwrap();
        Screenshot {
            screen: screen.to_string(),
            structure_id: "s".to_string(),
            image_path,
            layout_path,
        }
    }

    /// Predicts every staged image except those named "Skip*".
    fn tappable_backend() -> Arc<FakeBackend> {
        FakeBackend::new(|call| async move {
            let images = PathBuf::from(call.get("images").unwrap_or_default());
            let output = PathBuf::from(call.get("output").unwrap_or_default());
            for entry in std::fs::read_dir(&images)? {
                let path = entry?.path();
                let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
                if stem.starts_with("Skip") {
                    continue;
                }
                let dir = output.join(&stem);
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join("prediction.png"), b"png")?;
                std::fs::write(dir.join("description.txt"), "2 elements below threshold\n")?;
                std::fs::write(dir.join("heatmap_1.png"), b"png")?;
                std::fs::write(dir.join("heatmap_0.png"), b"png")?;
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn predictions_carry_description_and_sorted_heatmaps() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table();
        let screenshots = t.create::<Screenshot>(1);
        let predictions = t.create::<TappabilityPrediction>(1);
        let ctx = context(dir.path(), t);
        let collector = Collector::<TappabilityPrediction>::new();
        predictions.subscribe(collector.clone()).await.unwrap();

        let backend = tappable_backend();
        let task = TappabilityTask::new(
            Tappable::new(60),
            ctx,
            backend.clone(),
            TaskOptions::default(),
        );
        task.attach().await.unwrap();
        screenshots
            .publish(Origin::Seed, shot(dir.path(), "Main"), true)
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["threshold"], "60");
        assert!(calls[0].contains_key("annotations"));

        let items = collector.items.lock().clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "2 elements below threshold");
        let names: Vec<String> = items[0]
            .heatmaps
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["heatmap_0.png", "heatmap_1.png"]);
        assert!(task.report().is_success());
        assert!(!predictions.is_active());
    }

    #[tokio::test]
    async fn missing_output_directory_fails_only_that_screen() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table();
        let screenshots = t.create::<Screenshot>(1);
        let predictions = t.create::<TappabilityPrediction>(1);
        let ctx = context(dir.path(), t);

        let task = TappabilityTask::new(
            Tappable::new(50),
            ctx,
            tappable_backend(),
            TaskOptions::default(),
        );
        task.attach().await.unwrap();
        screenshots
            .publish(Origin::Seed, shot(dir.path(), "Main"), false)
            .await
            .unwrap();
        screenshots
            .publish(Origin::Seed, shot(dir.path(), "SkipMe"), true)
            .await
            .unwrap();

        let report = task.report();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].unit, "SkipMe#s");
        assert_eq!(report.failed[0].reason, "no prediction produced");
        assert_eq!(predictions.len(), 1);
        assert!(!predictions.is_active());
    }
}
