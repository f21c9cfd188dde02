//! HttpServiceClient - 結果サービスと状態サービスの HTTP クライアント
//!
//! - `POST {base}/results/{job}` with the full document
//! - `POST {base}/status/{job}[/{task}]` with `{"status", "logs"?}`

use async_trait::async_trait;
use serde::Serialize;

use crate::app::document::ResultDocument;
use crate::domain::{JobId, SinkError, StatusUpdate, TaskKind};
use crate::ports::{ResultsSink, StatusSink};

#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServiceClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn results_url(&self, job: &JobId) -> String {
        format!("{}/results/{job}", self.base_url)
    }

    fn status_url(&self, job: &JobId, task: Option<TaskKind>) -> String {
        match task {
            Some(task) => format!("{}/status/{job}/{task}", self.base_url),
            None => format!("{}/status/{job}", self.base_url),
        }
    }

    async fn post_json<B: Serialize + ?Sized + Sync>(
        &self,
        url: String,
        body: &B,
    ) -> Result<(), SinkError> {
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResultsSink for HttpServiceClient {
    async fn push(&self, job: &JobId, document: &ResultDocument) -> Result<(), SinkError> {
        self.post_json(self.results_url(job), document).await
    }
}

#[async_trait]
impl StatusSink for HttpServiceClient {
    async fn update(
        &self,
        job: &JobId,
        task: Option<TaskKind>,
        update: &StatusUpdate,
    ) -> Result<(), SinkError> {
        self.post_json(self.status_url(job, task), update).await
    }
}
