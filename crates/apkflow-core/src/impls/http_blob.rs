//! HttpBlobStore - S3 互換ストレージへの PUT
//!
//! Uploads with a plain `PUT {endpoint}/{bucket}/{key}` (path-style, no
//! request signing; suitable for LocalStack/MinIO in a private network) and
//! hands out `{public_url}/{bucket}/{key}`.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::StorageError;
use crate::ports::{BlobRef, BlobStore};

#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    public_url: String,
}

impl HttpBlobStore {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, key: &str, local_path: &Path) -> Result<BlobRef, StorageError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| StorageError::Io {
                path: local_path.display().to_string(),
                source,
            })?;

        let url = format!("{}/{}/{key}", self.endpoint, self.bucket);
        let response = self.client.put(&url).body(bytes).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::Status {
                key: key.to_string(),
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(key, "uploaded");
        Ok(BlobRef::new(format!("{}/{}/{key}", self.public_url, self.bucket)))
    }
}
