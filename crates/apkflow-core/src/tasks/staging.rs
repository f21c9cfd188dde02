//! Staging - バッチ実行用の作業ディレクトリ
//!
//! Batched algorithms read a flat directory of inputs. Each batch gets a
//! fresh `images/` + `annotations/` pair, named by the unit's stage name.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Staging {
    root: PathBuf,
}

impl Staging {
    /// Create (or empty) the staging directory at `root`.
    pub async fn prepare(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(root.join("images")).await?;
        tokio::fs::create_dir_all(root.join("annotations")).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn annotations(&self) -> PathBuf {
        self.root.join("annotations")
    }

    pub async fn stage_image(&self, name: &str, source: &Path) -> io::Result<PathBuf> {
        stage(&self.images(), name, source).await
    }

    pub async fn stage_annotation(&self, name: &str, source: &Path) -> io::Result<PathBuf> {
        stage(&self.annotations(), name, source).await
    }
}

/// Copy `source` to `{dir}/{name}.{source extension}`.
async fn stage(dir: &Path, name: &str, source: &Path) -> io::Result<PathBuf> {
    let mut target = dir.join(name);
    if let Some(ext) = source.extension() {
        target.set_extension(ext);
    }
    tokio::fs::copy(source, &target).await?;
    Ok(target)
}
