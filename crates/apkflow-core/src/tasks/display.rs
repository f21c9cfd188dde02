//! DisplayIssueTask (owleye) - 表示崩れの検出
//!
//! owleye reads a directory of screenshots and writes a copy of every
//! screenshot it considers broken into the output directory, under the
//! same file stem. No file for a screen means no issue.

use async_trait::async_trait;
use std::io;
use std::path::Path;

use super::screen_batch::{ScreenAnalysis, ScreenBatchTask};
use super::staging::Staging;
use crate::domain::{DisplayIssue, ScreenIdentity, Screenshot, TaskKind};
use crate::ports::AlgorithmCall;

const ISSUE_EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];

#[derive(Debug, Clone, Copy, Default)]
pub struct Owleye;

pub type DisplayIssueTask = ScreenBatchTask<Owleye>;

#[async_trait]
impl ScreenAnalysis for Owleye {
    type Output = DisplayIssue;

    fn kind(&self) -> TaskKind {
        TaskKind::DisplayIssue
    }

    async fn stage(
        &self,
        staging: &Staging,
        id: &ScreenIdentity,
        shot: &Screenshot,
    ) -> io::Result<()> {
        staging.stage_image(&id.stage_name(), &shot.image_path).await?;
        Ok(())
    }

    fn call(&self, staging: &Staging, output: &Path) -> AlgorithmCall {
        AlgorithmCall::new(TaskKind::DisplayIssue)
            .path_param("input", &staging.images())
            .path_param("output", output)
    }

    async fn collect(
        &self,
        output: &Path,
        id: &ScreenIdentity,
        shot: &Screenshot,
    ) -> Result<Option<DisplayIssue>, String> {
        let stem = id.stage_name();
        for ext in ISSUE_EXTENSIONS {
            let candidate = output.join(format!("{stem}.{ext}"));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(DisplayIssue {
                    screenshot: shot.clone(),
                    image_path: candidate,
                }));
            }
        }
        Ok(None)
    }
}
