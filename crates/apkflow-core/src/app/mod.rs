//! App - アプリケーション層
//!
//! ports とタスクを組み合わせてジョブを構築・実行します。
//!
//! # 主要コンポーネント
//! - **OrchestratorBuilder**: 設定からのワイヤリングと起動時検証
//! - **Orchestrator / Job**: ジョブごとのグループ表・タスク・集約器の構築と起動
//! - **Aggregator**: 結果ドキュメントの集約と状態通知
//! - **Settings**: 設定ファイル + 環境変数

pub mod aggregator;
pub mod builder;
pub mod document;
pub mod job;
pub mod settings;

// 主要な型を再エクスポート
pub use self::aggregator::Aggregator;
pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::document::{ResultDocument, SubResult, UiState};
pub use self::job::{Job, Orchestrator};
pub use self::settings::{
    AlgorithmSettings, BackendSettings, ServiceSettings, Settings, SettingsError, StorageSettings,
};
