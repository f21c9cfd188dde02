//! ResultsSink port - 部分結果ドキュメントの送信先
//!
//! Full-document replace semantics: every push carries the whole document.
//! Pushes are not deduplicated; the receiving service is assumed to
//! tolerate repeated identical documents.

use async_trait::async_trait;

use crate::app::document::ResultDocument;
use crate::domain::{JobId, SinkError};

#[async_trait]
pub trait ResultsSink: Send + Sync {
    async fn push(&self, job: &JobId, document: &ResultDocument) -> Result<(), SinkError>;
}
