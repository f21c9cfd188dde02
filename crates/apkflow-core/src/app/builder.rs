//! OrchestratorBuilder - オーケストレータの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 設定ファイルからの組み立て (`from_settings`)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::job::Orchestrator;
use super::settings::{BackendSettings, Settings, SettingsError, StorageSettings};
use crate::bus::Exclusive;
use crate::domain::{EmulatorDevice, TaskKind};
use crate::impls::{CommandBackend, HttpBackend, HttpBlobStore, HttpServiceClient, LocalBlobStore};
use crate::ports::{
    AlgorithmBackend, BlobStore, IdGenerator, ResultsSink, StatusSink, SystemClock, UlidGenerator,
};
use crate::tasks::TaskOptions;

/// OrchestratorBuilder は Orchestrator を構築
///
/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new("/home/data")
///     .blob_store(blob)
///     .results_sink(services.clone())
///     .status_sink(services)
///     .backend(TaskKind::DisplayIssue, owleye)
///     .expect_tasks(&[TaskKind::DisplayIssue])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で必要なタスクを登録
/// - build() 時に「期待集合 ⊆ バックエンド登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct OrchestratorBuilder {
    work_root: PathBuf,
    backends: HashMap<TaskKind, Arc<dyn AlgorithmBackend>>,
    options: HashMap<TaskKind, TaskOptions>,
    blob: Option<Arc<dyn BlobStore>>,
    results: Option<Arc<dyn ResultsSink>>,
    status: Option<Arc<dyn StatusSink>>,
    emulators: Vec<EmulatorDevice>,
    ids: Option<Arc<dyn IdGenerator>>,
    expected_tasks: Option<Vec<TaskKind>>,
}

/// BuildError はオーケストレータ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing algorithm backends: {0:?}. These tasks were expected but have no backend.")]
    MissingBackends(Vec<TaskKind>),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl OrchestratorBuilder {
    /// 新しい OrchestratorBuilder を作成
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            backends: HashMap::new(),
            options: HashMap::new(),
            blob: None,
            results: None,
            status: None,
            emulators: Vec::new(),
            ids: None,
            expected_tasks: None,
        }
    }

    /// Wire every collaborator described by `settings`. HTTP collaborators
    /// share `client`.
    pub fn from_settings(settings: &Settings, client: reqwest::Client) -> Result<Self, BuildError> {
        let services = Arc::new(HttpServiceClient::new(
            client.clone(),
            settings.services.base_url.as_str(),
        ));
        let blob: Arc<dyn BlobStore> = match &settings.storage {
            StorageSettings::Http {
                endpoint,
                bucket,
                public_url,
            } => Arc::new(HttpBlobStore::new(
                client.clone(),
                endpoint.as_str(),
                bucket.as_str(),
                public_url.as_str(),
            )),
            StorageSettings::Local { root, public_url } => {
                Arc::new(LocalBlobStore::new(root.clone(), public_url.as_str()))
            }
        };

        let mut builder = Self::new(settings.work_root.clone())
            .blob_store(blob)
            .results_sink(services.clone())
            .status_sink(services);

        for (kind, algorithm) in settings.algorithms()? {
            let backend: Arc<dyn AlgorithmBackend> = match &algorithm.backend {
                BackendSettings::Http { url } => {
                    Arc::new(HttpBackend::new(client.clone(), url.as_str()))
                }
                BackendSettings::Command {
                    program,
                    args,
                    working_dir,
                } => {
                    let command = CommandBackend::new(program.as_str(), args.clone());
                    match working_dir {
                        Some(dir) => Arc::new(command.with_working_dir(dir.clone())),
                        None => Arc::new(command),
                    }
                }
            };
            builder = builder.backend(kind, backend).options(kind, algorithm.options());
        }

        for serial in &settings.emulators {
            builder = builder.emulator(EmulatorDevice {
                serial: serial.clone(),
            });
        }
        Ok(builder)
    }

    pub fn backend(mut self, kind: TaskKind, backend: Arc<dyn AlgorithmBackend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn options(mut self, kind: TaskKind, options: TaskOptions) -> Self {
        self.options.insert(kind, options);
        self
    }

    pub fn blob_store(mut self, blob: Arc<dyn BlobStore>) -> Self {
        self.blob = Some(blob);
        self
    }

    pub fn results_sink(mut self, results: Arc<dyn ResultsSink>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn status_sink(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = Some(status);
        self
    }

    /// Add an emulator shared by every job of the orchestrator.
    pub fn emulator(mut self, device: EmulatorDevice) -> Self {
        self.emulators.push(device);
        self
    }

    /// Defaults to ULIDs stamped with the system clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 期待されるタスクのリストを設定
    pub fn expect_tasks(mut self, kinds: &[TaskKind]) -> Self {
        self.expected_tasks = Some(kinds.to_vec());
        self
    }

    /// OrchestratorBuilder を構築して Orchestrator を生成
    ///
    /// # 検証
    /// - blob store / results sink / status sink が設定されているか
    /// - expect_tasks() のタスクすべてにバックエンドがあるか
    pub fn build(self) -> Result<Orchestrator, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let missing: Vec<TaskKind> = expected_tasks
                .iter()
                .filter(|kind| !self.backends.contains_key(kind))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingBackends(missing));
            }
        }
        let blob = self.blob.ok_or(BuildError::MissingComponent("blob store"))?;
        let results = self
            .results
            .ok_or(BuildError::MissingComponent("results sink"))?;
        let status = self
            .status
            .ok_or(BuildError::MissingComponent("status sink"))?;
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        Ok(Orchestrator {
            backends: self.backends,
            options: self.options,
            blob,
            results,
            status,
            emulators: self.emulators.into_iter().map(Exclusive::new).collect(),
            work_root: self.work_root,
            ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{MemoryBlobStore, RecordingResultsSink, RecordingStatusSink};

    fn wired() -> OrchestratorBuilder {
        OrchestratorBuilder::new("/tmp/apkflow")
            .blob_store(Arc::new(MemoryBlobStore::new("apk-bucket")))
            .results_sink(Arc::new(RecordingResultsSink::new()))
            .status_sink(Arc::new(RecordingStatusSink::new()))
    }

    fn http(url: &str) -> Arc<dyn AlgorithmBackend> {
        Arc::new(HttpBackend::new(reqwest::Client::new(), url))
    }

    #[test]
    fn test_build_success() {
        let orchestrator = wired()
            .backend(TaskKind::DisplayIssue, http("http://owleye"))
            .expect_tasks(&[TaskKind::DisplayIssue])
            .build()
            .unwrap();
        assert_eq!(orchestrator.work_root(), std::path::Path::new("/tmp/apkflow"));
    }

    #[test]
    fn test_build_missing_backends() {
        let result = wired()
            .backend(TaskKind::DisplayIssue, http("http://owleye"))
            .expect_tasks(&[TaskKind::DisplayIssue, TaskKind::Tappability])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingBackends(missing)) if missing == vec![TaskKind::Tappability]
        ));
    }

    #[test]
    fn test_build_missing_component() {
        let result = OrchestratorBuilder::new("/tmp/apkflow")
            .blob_store(Arc::new(MemoryBlobStore::new("apk-bucket")))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponent("results sink"))
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::from_toml(
            r#"
            work_root = "/srv/jobs"
            emulators = ["emulator-5554"]
            [services]
            base_url = "http://results:5005"
            [algorithms.owleye]
            backend = { kind = "http", url = "http://owleye:3004/execute" }
            [algorithms.tappable]
            batch_size = 4
            [algorithms.tappable.backend]
            kind = "command"
            program = "python3"
            args = ["main.py"]
            working_dir = "/opt/tappable"
            "#,
        )
        .unwrap();

        let orchestrator = OrchestratorBuilder::from_settings(&settings, reqwest::Client::new())
            .unwrap()
            .expect_tasks(&[TaskKind::DisplayIssue, TaskKind::Tappability])
            .build()
            .unwrap();
        assert_eq!(orchestrator.work_root(), std::path::Path::new("/srv/jobs"));
        assert_eq!(orchestrator.emulators.len(), 1);
        assert_eq!(orchestrator.options[&TaskKind::Tappability].batch_size, 4);
    }
}
