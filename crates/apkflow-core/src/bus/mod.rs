//! Bus - 型付き publish/subscribe
//!
//! - **ResourceGroup**: kind ごとの配信チャネル（履歴の再生、枯渇フラグ）
//! - **ResourceTable**: ジョブごとのグループ表
//! - **Subscriber**: 購読者 trait
//! - **Exclusive / Lease**: 排他リソースの capability token
//! - **DeliveryLog**: 購読者エラーの集約

pub mod delivery;
pub mod exclusive;
pub mod group;
pub mod subscriber;
pub mod table;

pub use self::delivery::{DeliveryFailure, DeliveryLog};
pub use self::exclusive::{Exclusive, Lease};
pub use self::group::ResourceGroup;
pub use self::subscriber::Subscriber;
pub use self::table::{GroupSnapshot, GroupStatus, ResourceTable};
