//! apkflow-core
//!
//! Artifact-flow coordination for APK analysis jobs.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, resource kinds, artifacts, outcome, status, errors）
//! - **bus**: ジョブごとの型付き pub/sub（ResourceGroup, ResourceTable, Exclusive）
//! - **ports**: 抽象化レイヤー
//!   （BlobStore, ResultsSink, StatusSink, AlgorithmBackend, Clock, IdGenerator）
//! - **impls**: 実装（HTTP / subprocess / local / in-memory）
//! - **tasks**: 解析タスク（xbot, owleye, tappable, gifdroid）
//! - **app**: オーケストレータ、集約器、設定
//! - **observability**: ジョブの状態ビュー

pub mod domain;
pub mod bus;
pub mod ports;
pub mod impls;
pub mod tasks;
pub mod app;
pub mod observability;
