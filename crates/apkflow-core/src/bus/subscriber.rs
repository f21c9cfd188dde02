//! Subscriber trait - グループの購読者
//!
//! # 使用例
//! ```ignore
//! #[async_trait]
//! impl Subscriber<Screenshot> for MyTask {
//!     fn subscriber_name(&self) -> &str { "my-task" }
//!
//!     async fn on_resource(
//!         &self,
//!         item: Arc<ResourceWrapper<Screenshot>>,
//!     ) -> Result<(), DeliveryError> {
//!         // ...
//!         Ok(())
//!     }
//! }
//! ```
//!
//! A type may subscribe to several kinds by implementing `Subscriber<T>` once
//! per payload type.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{DeliveryError, Resource, ResourceType, ResourceWrapper};

#[async_trait]
pub trait Subscriber<T: Resource>: Send + Sync {
    /// Unique per group; a second subscription under the same name is rejected.
    fn subscriber_name(&self) -> &str;

    /// Called once per published item, in publish order.
    async fn on_resource(&self, item: Arc<ResourceWrapper<T>>) -> Result<(), DeliveryError>;

    /// Called once when the group is exhausted (no item will ever follow).
    async fn on_exhausted(&self, _kind: ResourceType) -> Result<(), DeliveryError> {
        Ok(())
    }
}
