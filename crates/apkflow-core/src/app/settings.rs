//! Settings - 設定の読み込み
//!
//! A TOML file plus `APKFLOW__*` environment overrides
//! (`APKFLOW__SERVICES__BASE_URL=http://results:5005`).
//!
//! # 使用例
//! ```toml
//! work_root = "/home/data"
//! emulators = ["emulator-5554"]
//!
//! [services]
//! base_url = "http://host.docker.internal:5005"
//!
//! [storage]
//! kind = "http"
//! endpoint = "http://host.docker.internal:4566"
//! public_url = "http://localhost:4566"
//!
//! [algorithms.xbot]
//! backend = { kind = "http", url = "http://host.docker.internal:3003/execute" }
//!
//! [algorithms.tappable]
//! backend = { kind = "command", program = "python3", args = ["main.py", "-i", "{images}"] }
//! batch_size = 16
//! threshold = 50
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::{TaskKind, UnknownTask};
use crate::tasks::TaskOptions;

pub const ENV_PREFIX: &str = "APKFLOW";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("settings name an unknown algorithm: {0}")]
    UnknownAlgorithm(#[from] UnknownTask),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Shared volume; each job writes below `{work_root}/{job_id}`.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    pub services: ServiceSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// adb serials of the emulators jobs may drive.
    #[serde(default)]
    pub emulators: Vec<String>,

    /// Keyed by algorithm name (`xbot`, `owleye`, `tappable`, `gifdroid`).
    #[serde(default)]
    pub algorithms: BTreeMap<String, AlgorithmSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceSettings {
    /// Base URL of the results and status endpoints.
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSettings {
    /// S3-compatible object storage.
    Http {
        endpoint: String,
        #[serde(default = "default_bucket")]
        bucket: String,
        public_url: String,
    },
    /// Copy into a directory served elsewhere.
    Local { root: PathBuf, public_url: String },
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::Http {
            endpoint: "http://localhost:4566".to_string(),
            bucket: default_bucket(),
            public_url: "http://localhost:4566".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlgorithmSettings {
    pub backend: BackendSettings,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

impl AlgorithmSettings {
    pub fn options(&self) -> TaskOptions {
        TaskOptions {
            batch_size: self.batch_size,
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    Http {
        url: String,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
}

fn default_work_root() -> PathBuf {
    PathBuf::from("/home/data")
}

fn default_bucket() -> String {
    "apk-bucket".to_string()
}

fn default_batch_size() -> usize {
    TaskOptions::default().batch_size
}

fn default_threshold() -> u32 {
    TaskOptions::default().threshold
}

impl Settings {
    /// Load `path`, then apply `APKFLOW__*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Algorithm settings keyed by task, rejecting unknown names.
    pub fn algorithms(&self) -> Result<BTreeMap<TaskKind, AlgorithmSettings>, SettingsError> {
        self.algorithms
            .iter()
            .map(|(name, algorithm)| Ok((name.parse::<TaskKind>()?, algorithm.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        emulators = ["emulator-5554", "emulator-5556"]

        [services]
        base_url = "http://results:5005"

        [algorithms.xbot]
        backend = { kind = "http", url = "http://xbot:3003/execute" }

        [algorithms.Tappable]
        backend = { kind = "command", program = "python3", args = ["main.py", "-t", "{threshold}"] }
        batch_size = 16
        threshold = 40
    "#;

    #[test]
    fn defaults_match_the_shared_volume_layout() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        assert_eq!(settings.work_root, PathBuf::from("/home/data"));
        assert_eq!(
            settings.storage,
            StorageSettings::Http {
                endpoint: "http://localhost:4566".to_string(),
                bucket: "apk-bucket".to_string(),
                public_url: "http://localhost:4566".to_string(),
            }
        );
        assert_eq!(settings.emulators.len(), 2);
    }

    #[test]
    fn algorithms_are_keyed_by_task() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        let algorithms = settings.algorithms().unwrap();
        assert_eq!(
            algorithms[&TaskKind::Accessibility].backend,
            BackendSettings::Http {
                url: "http://xbot:3003/execute".to_string()
            }
        );
        let tappable = &algorithms[&TaskKind::Tappability];
        assert_eq!(tappable.options(), TaskOptions { batch_size: 16, threshold: 40 });
        assert_eq!(algorithms[&TaskKind::Accessibility].options(), TaskOptions::default());
    }

    #[test]
    fn unknown_algorithm_name_is_rejected() {
        let settings = Settings::from_toml(
            r#"
            [services]
            base_url = "http://results:5005"
            [algorithms.uichecker]
            backend = { kind = "http", url = "http://x" }
            "#,
        )
        .unwrap();
        assert!(matches!(
            settings.algorithms(),
            Err(SettingsError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn local_storage_and_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apkflow.toml");
        std::fs::write(
            &path,
            r#"
            work_root = "/srv/jobs"
            [services]
            base_url = "http://results:5005"
            [storage]
            kind = "local"
            root = "/srv/blobs"
            public_url = "http://files.local"
            "#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.work_root, PathBuf::from("/srv/jobs"));
        assert!(matches!(settings.storage, StorageSettings::Local { .. }));
    }

    #[test]
    fn missing_services_section_is_an_error() {
        assert!(matches!(Settings::from_toml("emulators = []"), Err(SettingsError::Load(_))));
    }
}
