//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（Blob storage, 結果サービス, 状態サービス,
//! 解析アルゴリズム）へのインターフェースを提供し、実装の詳細を隠蔽します。
//! 実装は `impls` にあります。

pub mod algorithm;
pub mod blob_store;
pub mod clock;
pub mod id_generator;
pub mod results_sink;
pub mod status_sink;

// 主要な trait を再エクスポート
pub use self::algorithm::{AlgorithmBackend, AlgorithmCall};
pub use self::blob_store::{BlobRef, BlobStore, blob_key};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::results_sink::ResultsSink;
pub use self::status_sink::StatusSink;
