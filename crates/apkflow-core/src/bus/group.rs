//! ResourceGroup - 種類ごとの配信チャネル
//!
//! One group per resource kind per job. Items are appended to a log,
//! delivered synchronously to every subscriber in registration order, and
//! replayed to late subscribers. A group is active until every declared
//! producer has sent its final item; the transition is one-way.
//!
//! # 実装詳細
//! - `gate`: async mutex serializing publish/close/subscribe, so every
//!   subscriber sees the same total order
//! - `state`: short critical sections only, never held across an await
//!
//! Delivery is re-entrant across groups (a subscriber may publish into
//! another group) but not into the group currently delivering to it; the
//! task graph is acyclic.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::delivery::DeliveryLog;
use super::subscriber::Subscriber;
use crate::domain::{BusError, Origin, Resource, ResourceType, ResourceWrapper};

struct GroupState<T: Resource> {
    log: Vec<Arc<ResourceWrapper<T>>>,
    subscribers: Vec<Arc<dyn Subscriber<T>>>,
    next_sequence: u64,
    /// Producers that have not yet sent their final item.
    open_producers: usize,
    finished: HashSet<Origin>,
    active: bool,
}

pub struct ResourceGroup<T: Resource> {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<GroupState<T>>,
    failures: DeliveryLog,
}

impl<T: Resource> ResourceGroup<T> {
    /// Create a group expecting `producers` distinct producers.
    ///
    /// A group nobody produces into starts exhausted, so its consumers can
    /// still complete.
    pub fn new(producers: usize, failures: DeliveryLog) -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(GroupState {
                log: Vec::new(),
                subscribers: Vec::new(),
                next_sequence: 0,
                open_producers: producers,
                finished: HashSet::new(),
                active: producers > 0,
            }),
            failures,
        }
    }

    pub fn kind(&self) -> ResourceType {
        T::KIND
    }

    /// True while more items may still be published.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Number of items published so far.
    pub fn len(&self) -> usize {
        self.state.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Append `payload`, deliver it to every subscriber, and return its
    /// sequence number.
    ///
    /// With `is_final`, `origin` declares it will publish nothing more. The
    /// group stays active while the item is delivered and turns inactive
    /// once every subscriber has seen it; `on_exhausted` follows. The gate
    /// is held throughout, so no other publish can interleave.
    pub async fn publish(
        &self,
        origin: Origin,
        payload: T,
        is_final: bool,
    ) -> Result<u64, BusError> {
        let _gate = self.gate.lock().await;

        let (item, subscribers) = {
            let mut state = self.state.lock();
            Self::check_can_produce(&state, origin)?;
            let item = Arc::new(ResourceWrapper::new(origin, payload, state.next_sequence));
            state.next_sequence += 1;
            state.log.push(Arc::clone(&item));
            (item, state.subscribers.clone())
        };

        tracing::debug!(
            group = %T::KIND,
            %origin,
            sequence = item.sequence(),
            is_final,
            subscribers = subscribers.len(),
            "publish"
        );

        for subscriber in &subscribers {
            self.deliver(subscriber.as_ref(), &item).await;
        }

        let exhausted = is_final && Self::finish_producer(&mut self.state.lock(), origin);
        if exhausted {
            self.notify_all_exhausted(&subscribers).await;
        }
        Ok(item.sequence())
    }

    /// Final signal from `origin` without an item.
    pub async fn close(&self, origin: Origin) -> Result<(), BusError> {
        let _gate = self.gate.lock().await;
        let (subscribers, exhausted) = {
            let mut state = self.state.lock();
            Self::check_can_produce(&state, origin)?;
            let exhausted = Self::finish_producer(&mut state, origin);
            (state.subscribers.clone(), exhausted)
        };
        tracing::debug!(group = %T::KIND, %origin, exhausted, "close");
        if exhausted {
            self.notify_all_exhausted(&subscribers).await;
        }
        Ok(())
    }

    /// Register `subscriber` and replay every already-published item to it
    /// before returning. If the group is already exhausted the subscriber
    /// also receives `on_exhausted`.
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Result<(), BusError> {
        let _gate = self.gate.lock().await;

        let (history, active) = {
            let mut state = self.state.lock();
            let name = subscriber.subscriber_name();
            if state
                .subscribers
                .iter()
                .any(|existing| existing.subscriber_name() == name)
            {
                return Err(BusError::AlreadySubscribed {
                    kind: T::KIND,
                    subscriber: name.to_string(),
                });
            }
            state.subscribers.push(Arc::clone(&subscriber));
            (state.log.clone(), state.active)
        };

        tracing::debug!(
            group = %T::KIND,
            subscriber = subscriber.subscriber_name(),
            replay = history.len(),
            "subscribe"
        );

        for item in &history {
            self.deliver(subscriber.as_ref(), item).await;
        }
        if !active {
            self.notify_exhausted(subscriber.as_ref()).await;
        }
        Ok(())
    }

    /// Copy of the published items, in order.
    pub fn items(&self) -> Vec<Arc<ResourceWrapper<T>>> {
        self.state.lock().log.clone()
    }

    fn check_can_produce(state: &GroupState<T>, origin: Origin) -> Result<(), BusError> {
        if !state.active {
            return Err(BusError::Inactive { kind: T::KIND });
        }
        if state.finished.contains(&origin) {
            return Err(BusError::ProducerFinished {
                kind: T::KIND,
                origin,
            });
        }
        Ok(())
    }

    /// Record that `origin` finished. Returns true when this turned the
    /// group inactive. Must be called with the gate held.
    fn finish_producer(state: &mut GroupState<T>, origin: Origin) -> bool {
        state.finished.insert(origin);
        state.open_producers = state.open_producers.saturating_sub(1);
        if state.open_producers == 0 && state.active {
            state.active = false;
            return true;
        }
        false
    }

    async fn notify_all_exhausted(&self, subscribers: &[Arc<dyn Subscriber<T>>]) {
        tracing::debug!(group = %T::KIND, "exhausted");
        for subscriber in subscribers {
            self.notify_exhausted(subscriber.as_ref()).await;
        }
    }

    async fn deliver(&self, subscriber: &dyn Subscriber<T>, item: &Arc<ResourceWrapper<T>>) {
        if let Err(err) = subscriber.on_resource(Arc::clone(item)).await {
            self.failures.record(
                T::KIND,
                subscriber.subscriber_name(),
                Some(item.sequence()),
                &err,
            );
        }
    }

    async fn notify_exhausted(&self, subscriber: &dyn Subscriber<T>) {
        if let Err(err) = subscriber.on_exhausted(T::KIND).await {
            self.failures
                .record(T::KIND, subscriber.subscriber_name(), None, &err);
        }
    }
}

impl<T: Resource> std::fmt::Debug for ResourceGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceGroup")
            .field("kind", &T::KIND)
            .field("items", &state.log.len())
            .field("subscribers", &state.subscribers.len())
            .field("active", &state.active)
            .finish()
    }
}
