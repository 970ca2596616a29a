#![forbid(unsafe_code)]

//! The observable source sequence a view derives from.
//!
//! [`ObservableVec<T>`] is an ordered sequence behind a shared handle:
//! cloning the handle shares the same storage and the same subscriber list.
//! Every mutation raises exactly one [`SourceEvent`] describing what
//! happened and where. Range operations raise a single event for the whole
//! range, never one event per element.
//!
//! # Invariants
//!
//! 1. One event per mutating call that changed anything; zero events for
//!    no-op calls (empty ranges, removing an absent element).
//! 2. Event payloads carry the affected elements and their position, so
//!    subscribers can maintain derived state without re-reading the source.
//! 3. Subscribers are invoked after the source lock is released, from a
//!    snapshot taken under it; a subscriber may freely read the source.

use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;
use tracing::trace;

use vantage_collections::DiffableVec;

use crate::subscription::{SubscriberSet, Subscription};

/// A change to an [`ObservableVec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent<T> {
    /// The content was wholesale replaced or cleared; re-read everything.
    Reset,
    /// `items` were inserted contiguously starting at `index`.
    Inserted {
        /// Position of the first inserted element.
        index: usize,
        /// The inserted elements, in order.
        items: Vec<T>,
    },
    /// `items` were removed contiguously starting at `index`.
    Removed {
        /// Former position of the first removed element.
        index: usize,
        /// The removed elements, in order.
        items: Vec<T>,
    },
}

struct SourceInner<T> {
    items: DiffableVec<T>,
    subscribers: SubscriberSet<SourceEvent<T>>,
}

/// A shared, observable, ordered sequence.
///
/// Cloning an `ObservableVec` creates a new handle to the **same** content
/// and subscriber list. Views hold one such handle and drop it on disposal;
/// the source itself is owned by whoever created it.
pub struct ObservableVec<T> {
    inner: Arc<Mutex<SourceInner<T>>>,
}

impl<T> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ObservableVec")
            .field("items", &inner.items)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableVec<T> {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Creates a source holding `items`.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceInner {
                items: items.into(),
                subscribers: SubscriberSet::new(),
            })),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// `true` if the source holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Clone of the element at `index`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.lock().items.get(index).cloned()
    }

    /// Clone of the full content, in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().items.as_slice().to_vec()
    }

    /// Runs `f` over the content without cloning, under the source lock.
    ///
    /// `f` must not call back into this source.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(self.inner.lock().items.as_slice())
    }

    /// Subscribes to change events. Dropping the returned guard
    /// unsubscribes.
    pub fn subscribe(
        &self,
        callback: impl Fn(&SourceEvent<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.lock().subscribers.subscribe(callback)
    }

    /// Number of registered subscribers, including dead entries not yet
    /// pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Appends one element.
    pub fn push(&self, item: T) {
        let index = {
            let mut inner = self.inner.lock();
            inner.items.push(item.clone());
            inner.items.len() - 1
        };
        self.notify(SourceEvent::Inserted {
            index,
            items: vec![item],
        });
    }

    /// Inserts `item` at `index`, shifting later elements right.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, item: T) {
        self.inner.lock().items.insert(index, item.clone());
        self.notify(SourceEvent::Inserted {
            index,
            items: vec![item],
        });
    }

    /// Removes and returns the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove_at(&self, index: usize) -> T {
        let item = self.inner.lock().items.remove(index);
        self.notify(SourceEvent::Removed {
            index,
            items: vec![item.clone()],
        });
        item
    }

    /// Appends every element of `items`. A single event covers the whole
    /// range; an empty range raises nothing.
    pub fn push_range(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let index = {
            let mut inner = self.inner.lock();
            let index = inner.items.len();
            inner.items.push_range(items.iter().cloned());
            index
        };
        self.notify(SourceEvent::Inserted { index, items });
    }

    /// Inserts `items` contiguously at `index`. A single event covers the
    /// whole range; an empty range raises nothing.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert_range(&self, index: usize, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        self.inner
            .lock()
            .items
            .insert_range(index, items.iter().cloned());
        self.notify(SourceEvent::Inserted { index, items });
    }

    /// Removes the elements in `range` and returns them. A single event
    /// covers the whole range; an empty range raises nothing.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds or inverted.
    pub fn remove_range(&self, range: Range<usize>) -> Vec<T> {
        let index = range.start;
        let removed = self.inner.lock().items.remove_range(range);
        if !removed.is_empty() {
            self.notify(SourceEvent::Removed {
                index,
                items: removed.clone(),
            });
        }
        removed
    }

    /// Replaces the entire content, raising a single [`SourceEvent::Reset`].
    pub fn replace_all(&self, items: Vec<T>) {
        self.inner.lock().items.replace_all(items);
        self.notify(SourceEvent::Reset);
    }

    /// Removes every element, raising [`SourceEvent::Reset`]. No event if
    /// the source was already empty.
    pub fn clear(&self) {
        let was_empty = {
            let mut inner = self.inner.lock();
            let was_empty = inner.items.is_empty();
            inner.items.clear();
            was_empty
        };
        if !was_empty {
            self.notify(SourceEvent::Reset);
        }
    }

    /// Snapshot the live subscribers under the lock, invoke them after
    /// releasing it. A notified subscriber may re-enter the source.
    fn notify(&self, event: SourceEvent<T>) {
        let callbacks = self.inner.lock().subscribers.snapshot();
        trace!(
            subscribers = callbacks.len(),
            event = event_name(&event),
            "source notify"
        );
        for cb in &callbacks {
            cb(&event);
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ObservableVec<T> {
    /// `true` if some element equals `item`.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.inner.lock().items.contains(item)
    }

    /// Removes the first element equal to `item`. Returns `true` if one was
    /// removed; raises nothing otherwise.
    pub fn remove_item(&self, item: &T) -> bool {
        let removed_at = self.inner.lock().items.remove_item(item);
        match removed_at {
            Some(index) => {
                self.notify(SourceEvent::Removed {
                    index,
                    items: vec![item.clone()],
                });
                true
            }
            None => false,
        }
    }
}

fn event_name<T>(event: &SourceEvent<T>) -> &'static str {
    match event {
        SourceEvent::Reset => "reset",
        SourceEvent::Inserted { .. } => "inserted",
        SourceEvent::Removed { .. } => "removed",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn record_events<T: Clone + Send + Sync + 'static>(
        source: &ObservableVec<T>,
    ) -> (Arc<PlMutex<Vec<SourceEvent<T>>>>, Subscription) {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let log_cb = Arc::clone(&log);
        let sub = source.subscribe(move |e| log_cb.lock().push(e.clone()));
        (log, sub)
    }

    #[test]
    fn push_raises_inserted_with_position() {
        let source = ObservableVec::from_vec(vec![1, 2]);
        let (log, _sub) = record_events(&source);

        source.push(3);
        assert_eq!(
            *log.lock(),
            vec![SourceEvent::Inserted {
                index: 2,
                items: vec![3]
            }]
        );
        assert_eq!(source.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_at_raises_removed_with_position() {
        let source = ObservableVec::from_vec(vec![10, 20, 30]);
        let (log, _sub) = record_events(&source);

        let removed = source.remove_at(1);
        assert_eq!(removed, 20);
        assert_eq!(
            *log.lock(),
            vec![SourceEvent::Removed {
                index: 1,
                items: vec![20]
            }]
        );
    }

    #[test]
    fn range_operations_raise_one_event() {
        let source = ObservableVec::from_vec(vec![1, 5]);
        let (log, _sub) = record_events(&source);

        source.insert_range(1, vec![2, 3, 4]);
        source.remove_range(0..2);
        let events = log.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            SourceEvent::Inserted {
                index: 1,
                items: vec![2, 3, 4]
            }
        );
        assert_eq!(
            events[1],
            SourceEvent::Removed {
                index: 0,
                items: vec![1, 2]
            }
        );
    }

    #[test]
    fn empty_range_raises_nothing() {
        let source = ObservableVec::from_vec(vec![1]);
        let (log, _sub) = record_events(&source);

        source.push_range(Vec::new());
        source.insert_range(0, Vec::new());
        source.remove_range(1..1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn clear_and_replace_raise_reset() {
        let source = ObservableVec::from_vec(vec![1, 2]);
        let (log, _sub) = record_events(&source);

        source.replace_all(vec![9]);
        source.clear();
        source.clear(); // already empty: no event
        assert_eq!(*log.lock(), vec![SourceEvent::Reset, SourceEvent::Reset]);
    }

    #[test]
    fn remove_item_absent_is_silent() {
        let source = ObservableVec::from_vec(vec![1, 2]);
        let (log, _sub) = record_events(&source);

        assert!(!source.remove_item(&9));
        assert!(log.lock().is_empty());
        assert!(source.remove_item(&1));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn dropped_subscription_stops_events() {
        let source = ObservableVec::from_vec(vec![1]);
        let (log, sub) = record_events(&source);

        source.push(2);
        drop(sub);
        source.push(3);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn subscriber_may_read_source_reentrantly() {
        let source = ObservableVec::from_vec(vec![1]);
        let seen_len = Arc::new(PlMutex::new(0usize));
        let seen_cb = Arc::clone(&seen_len);
        let reentrant = source.clone();
        let _sub = source.subscribe(move |_| {
            *seen_cb.lock() = reentrant.len();
        });

        source.push(2);
        assert_eq!(*seen_len.lock(), 2);
    }

    #[test]
    fn clone_shares_content_and_subscribers() {
        let a = ObservableVec::from_vec(vec![1]);
        let b = a.clone();
        let (log, _sub) = record_events(&a);

        b.push(2);
        assert_eq!(a.len(), 2);
        assert_eq!(log.lock().len(), 1);
    }
}
