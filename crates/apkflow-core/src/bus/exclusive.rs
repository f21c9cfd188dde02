//! Exclusive - 排他リソース（エミュレータなど）の capability token
//!
//! A device that only one consumer may drive at a time is published once as
//! an `Exclusive<T>`. Acquiring moves the value into a `Lease<T>`; the value
//! goes back when the lease is released or dropped, so a consumer cannot
//! keep the device past the end of its batch by forgetting a release call.

use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::Notify;

struct Slot<T> {
    value: Mutex<Option<T>>,
    released: Notify,
}

/// Shared handle to one exclusive device. Cloning shares the same slot.
pub struct Exclusive<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Exclusive<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(Some(value)),
                released: Notify::new(),
            }),
        }
    }

    /// Take the device if nobody holds it.
    pub fn try_acquire(&self) -> Option<Lease<T>> {
        let value = self.slot.value.lock().take()?;
        Some(Lease {
            value: Some(value),
            slot: Arc::clone(&self.slot),
        })
    }

    /// Wait until the device is released, then take it.
    pub async fn acquire(&self) -> Lease<T> {
        loop {
            let notified = self.slot.released.notified();
            if let Some(lease) = self.try_acquire() {
                return lease;
            }
            notified.await;
        }
    }

    /// Resolves on the next release, or at once when a release happened
    /// while nobody was waiting. The device may be taken again by the time
    /// this returns.
    pub async fn released(&self) {
        self.slot.released.notified().await;
    }

    pub fn is_available(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// Do both handles refer to the same device?
    pub fn same_slot(&self, other: &Exclusive<T>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> Clone for Exclusive<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Exclusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exclusive")
            .field("available", &self.is_available())
            .finish()
    }
}

/// Move-only proof of holding the device.
pub struct Lease<T> {
    value: Option<T>,
    slot: Arc<Slot<T>>,
}

impl<T> Lease<T> {
    /// Give the device back. Same as dropping the lease.
    pub fn release(self) {}
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the value out.
        match &self.value {
            Some(value) => value,
            None => unreachable!("lease value taken before drop"),
        }
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            *self.slot.value.lock() = Some(value);
            self.slot.released.notify_one();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.value).finish()
    }
}
