//! ResourceTable - ジョブごとのグループ表
//!
//! Each job owns exactly one table; tasks and the aggregator receive it at
//! construction. There is no process-wide registry.
//!
//! # 学習ポイント
//! - `Arc<dyn Any>` による型消去と `Arc::downcast` による型付き取得
//! - 型消去された状態問い合わせ用の object-safe trait (`GroupStatus`)

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::delivery::DeliveryLog;
use super::group::ResourceGroup;
use crate::domain::{BusError, Resource, ResourceType};

/// Kind-agnostic view of a group.
pub trait GroupStatus: Send + Sync {
    fn kind(&self) -> ResourceType;
    fn is_active(&self) -> bool;
    fn published(&self) -> usize;
    fn subscribers(&self) -> usize;
}

impl<T: Resource> GroupStatus for ResourceGroup<T> {
    fn kind(&self) -> ResourceType {
        T::KIND
    }

    fn is_active(&self) -> bool {
        ResourceGroup::is_active(self)
    }

    fn published(&self) -> usize {
        self.len()
    }

    fn subscribers(&self) -> usize {
        self.subscriber_count()
    }
}

/// Serializable group state for status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub kind: ResourceType,
    pub active: bool,
    pub published: usize,
    pub subscribers: usize,
}

struct Entry {
    typed: Arc<dyn Any + Send + Sync>,
    status: Arc<dyn GroupStatus>,
}

#[derive(Default)]
pub struct ResourceTable {
    groups: BTreeMap<ResourceType, Entry>,
    failures: DeliveryLog,
}

impl ResourceTable {
    pub fn new(failures: DeliveryLog) -> Self {
        Self {
            groups: BTreeMap::new(),
            failures,
        }
    }

    /// Create the group for `T::KIND` with the given producer count.
    /// Replaces nothing: a second call for the same kind keeps the first.
    pub fn create<T: Resource>(&mut self, producers: usize) -> Arc<ResourceGroup<T>> {
        if let Some(existing) = self.group::<T>() {
            return existing;
        }
        let group = Arc::new(ResourceGroup::<T>::new(producers, self.failures.clone()));
        self.groups.insert(
            T::KIND,
            Entry {
                typed: Arc::clone(&group) as Arc<dyn Any + Send + Sync>,
                status: Arc::clone(&group) as Arc<dyn GroupStatus>,
            },
        );
        group
    }

    /// Typed lookup. `None` when the job has no group of this kind.
    pub fn group<T: Resource>(&self) -> Option<Arc<ResourceGroup<T>>> {
        let entry = self.groups.get(&T::KIND)?;
        Arc::clone(&entry.typed).downcast::<ResourceGroup<T>>().ok()
    }

    pub fn require<T: Resource>(&self) -> Result<Arc<ResourceGroup<T>>, BusError> {
        self.group::<T>()
            .ok_or(BusError::MissingGroup { kind: T::KIND })
    }

    pub fn contains(&self, kind: ResourceType) -> bool {
        self.groups.contains_key(&kind)
    }

    /// `None` when the job has no group of this kind.
    pub fn is_active(&self, kind: ResourceType) -> Option<bool> {
        self.groups.get(&kind).map(|entry| entry.status.is_active())
    }

    /// True when no listed group can receive another item. Kinds absent
    /// from the table count as exhausted.
    pub fn all_exhausted(&self, kinds: &[ResourceType]) -> bool {
        kinds
            .iter()
            .all(|kind| !self.is_active(*kind).unwrap_or(false))
    }

    pub fn kinds(&self) -> Vec<ResourceType> {
        self.groups.keys().copied().collect()
    }

    pub fn failures(&self) -> &DeliveryLog {
        &self.failures
    }

    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        self.groups
            .values()
            .map(|entry| GroupSnapshot {
                kind: entry.status.kind(),
                active: entry.status.is_active(),
                published: entry.status.published(),
                subscribers: entry.status.subscribers(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTable")
            .field("groups", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApkFile, Origin, Screenshot};
    use std::path::PathBuf;

    #[test]
    fn typed_lookup_returns_the_created_group() {
        let mut table = ResourceTable::new(DeliveryLog::new());
        let created = table.create::<ApkFile>(1);
        let found = table.group::<ApkFile>().expect("group exists");
        assert!(Arc::ptr_eq(&created, &found));
        assert!(table.group::<Screenshot>().is_none());
        assert!(matches!(
            table.require::<Screenshot>(),
            Err(BusError::MissingGroup { kind: ResourceType::Screenshot })
        ));
    }

    #[test]
    fn creating_twice_keeps_the_first_group() {
        let mut table = ResourceTable::new(DeliveryLog::new());
        let first = table.create::<ApkFile>(1);
        let second = table.create::<ApkFile>(3);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.kinds(), vec![ResourceType::ApkFile]);
    }

    #[tokio::test]
    async fn exhaustion_is_visible_through_the_table() {
        let mut table = ResourceTable::new(DeliveryLog::new());
        let apk = table.create::<ApkFile>(1);
        table.create::<Screenshot>(0);

        let kinds = [ResourceType::ApkFile, ResourceType::Screenshot, ResourceType::Emulator];
        assert!(!table.all_exhausted(&kinds));
        assert_eq!(table.is_active(ResourceType::Screenshot), Some(false));
        assert_eq!(table.is_active(ResourceType::Emulator), None);

        apk.publish(
            Origin::Seed,
            ApkFile {
                path: PathBuf::from("/tmp/app.apk"),
            },
            true,
        )
        .await
        .unwrap();
        assert!(table.all_exhausted(&kinds));

        let snapshot = table.snapshot();
        assert_eq!(snapshot[0].kind, ResourceType::ApkFile);
        assert_eq!(snapshot[0].published, 1);
        assert!(!snapshot[0].active);
    }
}
