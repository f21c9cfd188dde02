//! HttpBackend - 兄弟サービスとして動くアルゴリズムの呼び出し
//!
//! POSTs the call's parameters as a JSON object and waits for the service
//! to answer; the service writes its outputs into the shared volume.

use async_trait::async_trait;

use crate::domain::AlgorithmError;
use crate::ports::{AlgorithmBackend, AlgorithmCall};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlgorithmBackend for HttpBackend {
    async fn invoke(&self, call: &AlgorithmCall) -> Result<(), AlgorithmError> {
        tracing::info!(algorithm = %call.algorithm, url = %self.url, "invoking algorithm service");
        let response = self.client.post(&self.url).json(&call.params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlgorithmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn posts_params_as_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/execute")
            .match_body(Matcher::Json(json!({
                "apk_path": "/data/app.apk",
                "emulator": "emulator-5554",
                "output_dir": "/data/job-1/xbot"
            })))
            .with_status(200)
            .create_async()
            .await;

        let backend = HttpBackend::new(reqwest::Client::new(), format!("{}/execute", server.url()));
        let call = AlgorithmCall::new(TaskKind::Accessibility)
            .param("apk_path", "/data/app.apk")
            .param("output_dir", "/data/job-1/xbot")
            .param("emulator", "emulator-5554");
        backend.invoke(&call).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/execute")
            .with_status(500)
            .with_body("emulator offline")
            .create_async()
            .await;

        let backend = HttpBackend::new(reqwest::Client::new(), format!("{}/execute", server.url()));
        let err = backend
            .invoke(&AlgorithmCall::new(TaskKind::Accessibility))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AlgorithmError::Status { status: 500, ref body } if body == "emulator offline"
        ));
    }
}
