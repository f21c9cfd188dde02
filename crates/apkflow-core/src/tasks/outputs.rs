//! Outputs - タスク出力の発行と終端処理
//!
//! A task emits through one `EmitGuard` at a time. Holding the guard while
//! deciding completion and publishing keeps "last item is final" exact even
//! when two batches finish concurrently.
//!
//! The most recent item of each kind is held back until the next emit of
//! that kind. A task usually learns it is done only after its inputs are
//! exhausted, which happens after it already emitted its last item; the
//! held item is what gets published final then.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::bus::ResourceTable;
use crate::domain::{BusError, Origin, Resource, ResourceType, TaskKind};

#[derive(Default)]
struct EmitState {
    finished: HashSet<ResourceType>,
    /// Last emitted item per kind, not yet published.
    held: HashMap<ResourceType, Box<dyn Any + Send>>,
}

pub struct Outputs {
    origin: Origin,
    resources: Arc<ResourceTable>,
    state: Mutex<EmitState>,
}

impl Outputs {
    pub fn new(task: TaskKind, resources: Arc<ResourceTable>) -> Self {
        Self {
            origin: Origin::Task(task),
            resources,
            state: Mutex::new(EmitState::default()),
        }
    }

    pub async fn lock(&self) -> EmitGuard<'_> {
        EmitGuard {
            origin: self.origin,
            resources: &self.resources,
            state: self.state.lock().await,
        }
    }
}

impl std::fmt::Debug for Outputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outputs").field("origin", &self.origin).finish()
    }
}

pub struct EmitGuard<'a> {
    origin: Origin,
    resources: &'a ResourceTable,
    state: MutexGuard<'a, EmitState>,
}

impl EmitGuard<'_> {
    /// Publish `items` in order after any item held back from the previous
    /// emit, and return how many were published.
    ///
    /// Without `finish` the last item is held back. With `finish` everything
    /// is published and the last item is marked final, or the group is
    /// closed when there is nothing to publish. Finishing an already
    /// finished group with no items is a no-op.
    pub async fn emit<T: Resource>(
        &mut self,
        items: Vec<T>,
        finish: bool,
    ) -> Result<usize, BusError> {
        if self.state.finished.contains(&T::KIND) {
            if items.is_empty() {
                return Ok(0);
            }
            return Err(BusError::ProducerFinished {
                kind: T::KIND,
                origin: self.origin,
            });
        }

        let group = self.resources.require::<T>()?;
        let mut pending: Vec<T> = Vec::with_capacity(items.len() + 1);
        if let Some(Ok(held)) = self.state.held.remove(&T::KIND).map(|h| h.downcast::<T>()) {
            pending.push(*held);
        }
        pending.extend(items);
        if !finish {
            if let Some(last) = pending.pop() {
                self.state.held.insert(T::KIND, Box::new(last));
            }
        }

        let count = pending.len();
        for (i, item) in pending.into_iter().enumerate() {
            let is_final = finish && i + 1 == count;
            group.publish(self.origin, item, is_final).await?;
        }
        if finish {
            if count == 0 {
                group.close(self.origin).await?;
            }
            self.state.finished.insert(T::KIND);
        }
        Ok(count)
    }

    pub fn is_finished(&self, kind: ResourceType) -> bool {
        self.state.finished.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DeliveryLog;
    use crate::domain::{DisplayIssue, Screenshot};
    use std::path::PathBuf;

    fn shot(n: u32) -> Screenshot {
        Screenshot {
            screen: format!("Screen{n}"),
            structure_id: "s".to_string(),
            image_path: PathBuf::from(format!("/tmp/{n}.png")),
            layout_path: PathBuf::from(format!("/tmp/{n}.xml")),
        }
    }

    fn table() -> Arc<ResourceTable> {
        let mut table = ResourceTable::new(DeliveryLog::new());
        table.create::<Screenshot>(1);
        table.create::<DisplayIssue>(1);
        Arc::new(table)
    }

    #[tokio::test]
    async fn last_item_of_a_finishing_emit_is_final() {
        let resources = table();
        let outputs = Outputs::new(TaskKind::Accessibility, resources.clone());
        let screenshots = resources.group::<Screenshot>().unwrap();

        let mut guard = outputs.lock().await;
        guard.emit(vec![shot(0)], false).await.unwrap();
        assert!(screenshots.is_active());
        assert_eq!(guard.emit(vec![shot(1), shot(2)], true).await.unwrap(), 3);
        assert!(!screenshots.is_active());
        assert_eq!(screenshots.len(), 3);
        assert!(guard.is_finished(ResourceType::Screenshot));
    }

    #[tokio::test]
    async fn last_item_waits_for_the_next_emit() {
        let resources = table();
        let outputs = Outputs::new(TaskKind::Accessibility, resources.clone());
        let screenshots = resources.group::<Screenshot>().unwrap();

        let mut guard = outputs.lock().await;
        assert_eq!(guard.emit(vec![shot(0), shot(1)], false).await.unwrap(), 1);
        assert_eq!(screenshots.len(), 1);
        assert_eq!(guard.emit(vec![shot(2)], false).await.unwrap(), 1);
        assert_eq!(screenshots.len(), 2);

        // finishing with nothing new publishes the held item as the final one
        assert_eq!(guard.emit::<Screenshot>(Vec::new(), true).await.unwrap(), 1);
        assert!(!screenshots.is_active());
        let screens: Vec<String> = screenshots
            .items()
            .iter()
            .map(|item| item.payload().screen.clone())
            .collect();
        assert_eq!(screens, vec!["Screen0", "Screen1", "Screen2"]);
    }

    #[tokio::test]
    async fn finishing_with_nothing_closes_the_group() {
        let resources = table();
        let outputs = Outputs::new(TaskKind::DisplayIssue, resources.clone());
        let mut guard = outputs.lock().await;
        assert_eq!(guard.emit::<DisplayIssue>(Vec::new(), true).await.unwrap(), 0);
        let issues = resources.group::<DisplayIssue>().unwrap();
        assert!(!issues.is_active());
        assert!(issues.is_empty());

        // second finalization is harmless
        assert_eq!(guard.emit::<DisplayIssue>(Vec::new(), true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn emitting_after_finish_is_an_error() {
        let resources = table();
        let outputs = Outputs::new(TaskKind::Accessibility, resources);
        let mut guard = outputs.lock().await;
        guard.emit(vec![shot(0)], true).await.unwrap();
        let err = guard.emit(vec![shot(1)], false).await.unwrap_err();
        assert!(matches!(
            err,
            BusError::ProducerFinished {
                kind: ResourceType::Screenshot,
                ..
            }
        ));
    }
}
