//! AlgorithmBackend port - 解析アルゴリズムの呼び出し
//!
//! Algorithms are opaque: a task names its inputs and output directory in
//! an `AlgorithmCall`, the backend runs it (HTTP service or subprocess) and
//! the task reads results back from the output directory.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{AlgorithmError, TaskKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmCall {
    pub algorithm: TaskKind,
    /// Named parameters, typically paths. Sent as a JSON object over HTTP,
    /// substituted into the argument template for subprocesses.
    pub params: BTreeMap<String, String>,
}

impl AlgorithmCall {
    pub fn new(algorithm: TaskKind) -> Self {
        Self {
            algorithm,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn path_param(self, key: &str, path: &Path) -> Self {
        let value = path.to_string_lossy().into_owned();
        self.param(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// AlgorithmBackend は一回の呼び出しを完了まで実行する
///
/// # 実装
/// - HttpBackend: 兄弟サービスへ POST
/// - CommandBackend: ローカルのサブプロセス
#[async_trait]
pub trait AlgorithmBackend: Send + Sync {
    async fn invoke(&self, call: &AlgorithmCall) -> Result<(), AlgorithmError>;
}
