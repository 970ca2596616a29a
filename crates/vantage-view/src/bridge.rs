#![forbid(unsafe_code)]

//! Attach/detach bookkeeping for collection and item subscriptions.
//!
//! [`SubscriptionBridge`] owns the subscription guards a view holds against
//! its source: at most one collection-level guard, plus one guard per
//! tracked item keyed by [`ItemKey`]. Dropping a guard *is* the detach, so
//! every detach path here is a map/option removal and nothing else.
//!
//! # Invariants
//!
//! 1. At most one collection-level subscription at a time; re-attaching
//!    replaces (detaches) the previous one.
//! 2. At most one item subscription per key; attaching an already-attached
//!    key is a no-op that does not create a second subscription.
//! 3. Detaching an unattached key, or detaching the collection twice, is a
//!    no-op.
//! 4. [`reconcile_items`](SubscriptionBridge::reconcile_items) leaves the
//!    table keyed exactly by the given live set: stale keys detached,
//!    missing keys attached, surviving keys untouched.

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::item::ItemKey;
use crate::subscription::Subscription;

pub(crate) struct SubscriptionBridge {
    collection: Option<Subscription>,
    items: AHashMap<ItemKey, Subscription>,
}

impl SubscriptionBridge {
    pub(crate) fn new() -> Self {
        Self {
            collection: None,
            items: AHashMap::new(),
        }
    }

    /// Installs the collection-level subscription, replacing any previous
    /// one.
    pub(crate) fn attach_collection(&mut self, subscription: Subscription) {
        self.collection = Some(subscription);
    }

    /// Drops the collection-level subscription. Idempotent.
    pub(crate) fn detach_collection(&mut self) {
        self.collection = None;
    }

    pub(crate) fn has_collection(&self) -> bool {
        self.collection.is_some()
    }

    /// Attaches an item subscription for `key` unless one is already live.
    /// `attach` is only invoked when a new subscription is actually needed.
    /// Returns `true` if a subscription was created.
    pub(crate) fn attach_item_with(
        &mut self,
        key: ItemKey,
        attach: impl FnOnce() -> Subscription,
    ) -> bool {
        if self.items.contains_key(&key) {
            return false;
        }
        self.items.insert(key, attach());
        true
    }

    /// Drops the item subscription for `key`, if any. Idempotent.
    pub(crate) fn detach_item(&mut self, key: ItemKey) -> bool {
        self.items.remove(&key).is_some()
    }

    /// Reconciles the item table against the current live set: detaches
    /// every key not in `items`, attaches every item whose key is missing.
    /// Items already attached keep their existing subscription.
    pub(crate) fn reconcile_items<T>(
        &mut self,
        items: &[T],
        key_of: fn(&T) -> ItemKey,
        mut attach: impl FnMut(&T) -> Subscription,
    ) {
        let live: AHashSet<ItemKey> = items.iter().map(key_of).collect();
        let before = self.items.len();
        self.items.retain(|key, _| live.contains(key));
        let detached = before - self.items.len();

        let mut attached = 0usize;
        for item in items {
            let key = key_of(item);
            if !self.items.contains_key(&key) {
                self.items.insert(key, attach(item));
                attached += 1;
            }
        }
        if attached > 0 || detached > 0 {
            debug!(attached, detached, live = self.items.len(), "item subscriptions reconciled");
        }
    }

    /// Drops every item subscription.
    pub(crate) fn detach_all_items(&mut self) {
        if !self.items.is_empty() {
            debug!(detached = self.items.len(), "all item subscriptions detached");
        }
        self.items.clear();
    }

    pub(crate) fn is_item_attached(&self, key: ItemKey) -> bool {
        self.items.contains_key(&key)
    }

    pub(crate) fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl std::fmt::Debug for SubscriptionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBridge")
            .field("collection", &self.collection.is_some())
            .field("items", &self.items.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemCell, TrackedItem};

    fn subscription_for(cell: &ItemCell<i32>) -> Subscription {
        cell.subscribe_item(Box::new(|_| {}))
    }

    #[test]
    fn collection_attach_is_single_slot() {
        let cell = ItemCell::new(0);
        let mut bridge = SubscriptionBridge::new();
        assert!(!bridge.has_collection());

        bridge.attach_collection(subscription_for(&cell));
        assert!(bridge.has_collection());
        bridge.attach_collection(subscription_for(&cell));
        assert!(bridge.has_collection());

        bridge.detach_collection();
        bridge.detach_collection(); // idempotent
        assert!(!bridge.has_collection());
    }

    #[test]
    fn duplicate_item_attach_is_noop() {
        let cell = ItemCell::new(0);
        let mut bridge = SubscriptionBridge::new();

        let mut calls = 0;
        assert!(bridge.attach_item_with(cell.item_key(), || {
            calls += 1;
            subscription_for(&cell)
        }));
        assert!(!bridge.attach_item_with(cell.item_key(), || {
            calls += 1;
            subscription_for(&cell)
        }));
        assert_eq!(calls, 1);
        assert_eq!(bridge.item_count(), 1);
    }

    #[test]
    fn detach_item_idempotent() {
        let cell = ItemCell::new(0);
        let mut bridge = SubscriptionBridge::new();
        bridge.attach_item_with(cell.item_key(), || subscription_for(&cell));

        assert!(bridge.detach_item(cell.item_key()));
        assert!(!bridge.detach_item(cell.item_key()));
        assert_eq!(bridge.item_count(), 0);
    }

    #[test]
    fn reconcile_attaches_new_and_detaches_stale() {
        let a = ItemCell::new(1);
        let b = ItemCell::new(2);
        let c = ItemCell::new(3);
        let mut bridge = SubscriptionBridge::new();

        bridge.reconcile_items(
            &[a.clone(), b.clone()],
            TrackedItem::item_key,
            subscription_for,
        );
        assert!(bridge.is_item_attached(a.item_key()));
        assert!(bridge.is_item_attached(b.item_key()));
        assert_eq!(bridge.item_count(), 2);

        // b leaves, c arrives, a survives.
        bridge.reconcile_items(
            &[a.clone(), c.clone()],
            TrackedItem::item_key,
            subscription_for,
        );
        assert!(bridge.is_item_attached(a.item_key()));
        assert!(!bridge.is_item_attached(b.item_key()));
        assert!(bridge.is_item_attached(c.item_key()));
        assert_eq!(bridge.item_count(), 2);
    }

    #[test]
    fn reconcile_does_not_resubscribe_survivors() {
        let a = ItemCell::new(1);
        let mut bridge = SubscriptionBridge::new();

        let mut attaches = 0;
        bridge.reconcile_items(std::slice::from_ref(&a), TrackedItem::item_key, |item| {
            attaches += 1;
            subscription_for(item)
        });
        bridge.reconcile_items(std::slice::from_ref(&a), TrackedItem::item_key, |item| {
            attaches += 1;
            subscription_for(item)
        });
        assert_eq!(attaches, 1);
    }

    #[test]
    fn reconcile_against_empty_detaches_everything() {
        let a = ItemCell::new(1);
        let b = ItemCell::new(2);
        let mut bridge = SubscriptionBridge::new();
        bridge.reconcile_items(&[a, b], TrackedItem::item_key, subscription_for);
        assert_eq!(bridge.item_count(), 2);

        bridge.reconcile_items(&[], TrackedItem::item_key, subscription_for);
        assert_eq!(bridge.item_count(), 0);
    }

    #[test]
    fn detach_all_items_clears_table() {
        let a = ItemCell::new(1);
        let mut bridge = SubscriptionBridge::new();
        bridge.attach_item_with(a.item_key(), || subscription_for(&a));
        bridge.detach_all_items();
        bridge.detach_all_items(); // idempotent
        assert_eq!(bridge.item_count(), 0);
    }

    #[test]
    fn dropping_table_entry_kills_live_callback() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let cell = ItemCell::new(0);
        let hits = Arc::new(AtomicU32::new(0));
        let hits_cb = Arc::clone(&hits);
        let mut bridge = SubscriptionBridge::new();
        bridge.attach_item_with(cell.item_key(), || {
            cell.subscribe_item(Box::new(move |_| {
                hits_cb.fetch_add(1, Ordering::SeqCst);
            }))
        });

        cell.set(1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bridge.detach_item(cell.item_key());
        cell.set(2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
