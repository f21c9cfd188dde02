//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpServiceClient**: results / status サービス
//! - **HttpBlobStore** / **LocalBlobStore**: 成果物のアップロード先
//! - **HttpBackend** / **CommandBackend**: 解析アルゴリズムの呼び出し
//! - **memory**: テスト用・dry-run 用の記録実装

pub mod command_backend;
pub mod http_backend;
pub mod http_blob;
pub mod http_services;
pub mod local_blob;
pub mod memory;

pub use self::command_backend::CommandBackend;
pub use self::http_backend::HttpBackend;
pub use self::http_blob::HttpBlobStore;
pub use self::http_services::HttpServiceClient;
pub use self::local_blob::LocalBlobStore;
pub use self::memory::{
    MemoryBlobStore, RecordedStatus, RecordingResultsSink, RecordingStatusSink, Upload,
};
