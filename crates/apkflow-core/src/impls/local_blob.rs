//! LocalBlobStore - ローカルディレクトリへのコピー
//!
//! For single-machine deployments where a web server exposes `root`
//! under `public_url`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::StorageError;
use crate::ports::{BlobRef, BlobStore};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, local_path: &Path) -> Result<BlobRef, StorageError> {
        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|source| io_error(local_path, source))?;

        Ok(BlobRef::new(format!("{}/{key}", self.public_url)))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_under_root_and_returns_url() {
        let src_dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let file = src_dir.path().join("shot.png");
        std::fs::write(&file, b"img").unwrap();

        let store = LocalBlobStore::new(root.path(), "http://files.local/");
        let blob = store.upload("job-1/xbot/shot.png", &file).await.unwrap();

        assert_eq!(blob.as_str(), "http://files.local/job-1/xbot/shot.png");
        let copied = std::fs::read(root.path().join("job-1/xbot/shot.png")).unwrap();
        assert_eq!(copied, b"img");
    }

    #[tokio::test]
    async fn uploading_twice_overwrites_the_same_key() {
        let src_dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let file = src_dir.path().join("shot.png");
        std::fs::write(&file, b"v1").unwrap();

        let store = LocalBlobStore::new(root.path(), "http://files.local");
        let first = store.upload("job-1/shot.png", &file).await.unwrap();
        std::fs::write(&file, b"v2").unwrap();
        let second = store.upload("job-1/shot.png", &file).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(root.path().join("job-1/shot.png")).unwrap(), b"v2");
    }
}
