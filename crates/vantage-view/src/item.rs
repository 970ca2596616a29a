#![forbid(unsafe_code)]

//! Item-level change tracking.
//!
//! A view can optionally track the elements of its source individually, so
//! that a field mutation inside an element re-evaluates the view (an item
//! that starts failing the filter, or whose sort key moved). Elements opt
//! in by implementing [`TrackedItem`]: a stable identity key plus a
//! field-change subscription.
//!
//! [`ItemCell<T>`] is the ready-made implementation: a cloneable shared
//! record cell whose `set`/`update` notify observers only when the value
//! actually changed. Its equality is identity-based (two handles are equal
//! iff they refer to the same cell), which is what a view's diff should see
//! for mutable records: mutating a field must not make the diff treat the
//! item as removed-and-re-added.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::subscription::{SubscriberSet, Subscription};

/// Process-unique identity of a tracked item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(u64);

impl ItemKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A field change reported by a tracked item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChanged {
    /// Name of the field that changed.
    pub field: &'static str,
}

/// An element whose internal changes a view can observe.
///
/// Implementors must guarantee that `item_key` is stable for the lifetime
/// of the value (clones included: a clone that shares state shares the
/// key), and that the subscription delivers a [`FieldChanged`] for every
/// observable mutation.
pub trait TrackedItem {
    /// Stable identity of this item.
    fn item_key(&self) -> ItemKey;

    /// Subscribes to field changes. Dropping the guard unsubscribes.
    fn subscribe_item(
        &self,
        callback: Box<dyn Fn(&FieldChanged) + Send + Sync>,
    ) -> Subscription;
}

struct ItemCellInner<T> {
    value: T,
    observers: SubscriberSet<FieldChanged>,
}

/// A shared observable record cell.
///
/// Cloning shares the cell (same value, same key, same observers). Equality
/// is identity: two handles compare equal iff they are the same cell.
pub struct ItemCell<T> {
    key: ItemKey,
    inner: Arc<Mutex<ItemCellInner<T>>>,
}

impl<T> Clone for ItemCell<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for ItemCell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for ItemCell<T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for ItemCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ItemCell")
            .field("key", &self.key)
            .field("value", &inner.value)
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + 'static> ItemCell<T> {
    /// Creates a cell holding `value` with a fresh identity.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            key: ItemKey::next(),
            inner: Arc::new(Mutex::new(ItemCellInner {
                value,
                observers: SubscriberSet::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Runs `f` over the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().value)
    }

    /// Sets a new value. Observers are notified only if the value changed
    /// (by `PartialEq`), after the cell lock is released.
    pub fn set(&self, value: T) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.observers.snapshot()
        };
        let change = FieldChanged { field: "value" };
        for cb in &callbacks {
            cb(&change);
        }
    }

    /// Mutates the value in place. Observers are notified only if the
    /// result differs from the previous value.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let callbacks = {
            let mut inner = self.inner.lock();
            let before = inner.value.clone();
            f(&mut inner.value);
            if inner.value == before {
                return;
            }
            inner.observers.snapshot()
        };
        let change = FieldChanged { field: "value" };
        for cb in &callbacks {
            cb(&change);
        }
    }

    /// This cell's identity.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        self.key
    }
}

impl<T: Clone + PartialEq + Send + 'static> TrackedItem for ItemCell<T> {
    fn item_key(&self) -> ItemKey {
        self.key
    }

    fn subscribe_item(
        &self,
        callback: Box<dyn Fn(&FieldChanged) + Send + Sync>,
    ) -> Subscription {
        self.inner.lock().observers.subscribe(callback)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn count_changes<T: Clone + PartialEq + Send + 'static>(
        cell: &ItemCell<T>,
    ) -> (Arc<AtomicU32>, Subscription) {
        let hits = Arc::new(AtomicU32::new(0));
        let hits_cb = Arc::clone(&hits);
        let sub = cell.subscribe_item(Box::new(move |_| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        }));
        (hits, sub)
    }

    #[test]
    fn set_notifies_on_change_only() {
        let cell = ItemCell::new(1);
        let (hits, _sub) = count_changes(&cell);

        cell.set(2);
        cell.set(2); // equal value: silent
        cell.set(3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn update_notifies_on_change_only() {
        let cell = ItemCell::new(10);
        let (hits, _sub) = count_changes(&cell);

        cell.update(|v| *v += 1);
        cell.update(|_| {}); // unchanged: silent
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cell.get(), 11);
    }

    #[test]
    fn clones_share_value_and_identity() {
        let a = ItemCell::new(5);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.item_key(), b.item_key());

        b.set(7);
        assert_eq!(a.get(), 7);
    }

    #[test]
    fn distinct_cells_are_unequal_even_with_equal_values() {
        let a = ItemCell::new(5);
        let b = ItemCell::new(5);
        assert_ne!(a, b);
        assert_ne!(a.item_key(), b.item_key());
    }

    #[test]
    fn mutation_does_not_change_identity() {
        let cell = ItemCell::new(String::from("x"));
        let key = cell.item_key();
        cell.set(String::from("y"));
        assert_eq!(cell.item_key(), key);
    }

    #[test]
    fn dropped_observer_not_notified() {
        let cell = ItemCell::new(0);
        let (hits, sub) = count_changes(&cell);
        cell.set(1);
        drop(sub);
        cell.set(2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn field_payload_names_the_field() {
        let cell = ItemCell::new(0);
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_cb = Arc::clone(&seen);
        let _sub = cell.subscribe_item(Box::new(move |change| {
            *seen_cb.lock() = change.field.to_string();
        }));
        cell.set(1);
        assert_eq!(*seen.lock(), "value");
    }
}
