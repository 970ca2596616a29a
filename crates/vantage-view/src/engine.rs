#![forbid(unsafe_code)]

//! The live view engine.
//!
//! [`ViewEngine<T, S>`] binds an [`ObservableVec`] source to a
//! [`ViewStrategy`] and keeps the published content continuously equal to
//! `strategy.compute(source)` while tracking is enabled. Two aliases cover
//! the built-in strategies: [`FilteredView`] (filter/order/page) and
//! [`QueryView`] (caller-supplied transform).
//!
//! # Refresh
//!
//! Every refresh runs the same pipeline under the view lock: snapshot the
//! source, compute new content via the strategy, bail out silently if the
//! result is a positional copy of what is already published, otherwise
//! reconcile the multiset diff, wholesale-replace the content, and notify
//! subscribers **after** the lock is released from a snapshot taken under
//! it. One refresh raises at most one [`ViewChanged`] and at most one
//! count notification (the latter only when the count actually changed).
//!
//! # Invariants
//!
//! 1. While tracking, after any refresh completes the published content
//!    equals `strategy.compute(source)` as of that refresh.
//! 2. While not tracking, the published content is frozen.
//! 3. Notifications fire only for genuine content differences.
//! 4. Each live source item holds at most one item-level subscription.
//! 5. Disposal is idempotent and terminal: subscriptions dropped, source
//!    handle cleared, content cleared, all later calls no-ops.
//!
//! # Failure modes
//!
//! - A panicking filter/order/query propagates out of the call that
//!   triggered the refresh; the lock is released on unwind and the
//!   published content is untouched (all-or-nothing refresh).
//! - A strategy closure that calls back into its own view deadlocks: it
//!   runs under the view lock. Notification handlers are safe to re-enter
//!   from; they run outside the lock.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

use vantage_collections::{DiffableVec, reconcile};

use crate::bridge::SubscriptionBridge;
use crate::item::{ItemKey, TrackedItem};
use crate::source::{ObservableVec, SourceEvent};
use crate::strategy::{FilterOrder, Query, ViewStrategy};
use crate::subscription::{SubscriberSet, Subscription};

/// The change notification a view raises after publishing new content.
///
/// One coarse replace event per refresh: the elements the view gained and
/// the elements it lost, by equality. Both lists empty means the content
/// was reordered without membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChanged<T> {
    /// Elements the view gained.
    pub added: Vec<T>,
    /// Elements the view lost.
    pub removed: Vec<T>,
}

/// Item-tracking machinery, installed when item tracking is enabled.
///
/// Stored type-erased so the engine's collection handler can reconcile the
/// subscription table without carrying a [`TrackedItem`] bound on `T`.
struct ItemHook<T> {
    key_of: fn(&T) -> ItemKey,
    attach: Box<dyn Fn(&T) -> Subscription + Send + Sync>,
}

struct EngineState<T, S> {
    source: Option<ObservableVec<T>>,
    strategy: S,
    content: DiffableVec<T>,
    tracking: bool,
    track_collection: bool,
    track_item: bool,
    disposed: bool,
    bridge: SubscriptionBridge,
    item_hook: Option<ItemHook<T>>,
    changed: SubscriberSet<ViewChanged<T>>,
    count_changed: SubscriberSet<usize>,
}

struct Inner<T, S> {
    state: Mutex<EngineState<T, S>>,
}

/// A live, continuously reconciled view over an [`ObservableVec`].
///
/// Cloning the engine clones the handle: both handles observe and control
/// the same view. All operations are synchronous; reads and mutations
/// serialize on the view's lock, and notification handlers run outside it,
/// so a handler may re-enter the view freely.
pub struct ViewEngine<T, S: ViewStrategy<T>> {
    inner: Arc<Inner<T, S>>,
}

/// Filter → stable order → offset/limit view.
pub type FilteredView<T> = ViewEngine<T, FilterOrder<T>>;

/// Arbitrary-transform view.
pub type QueryView<T> = ViewEngine<T, Query<T>>;

impl<T, S: ViewStrategy<T>> Clone for ViewEngine<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug, S: ViewStrategy<T>> std::fmt::Debug for ViewEngine<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ViewEngine")
            .field("content", &state.content)
            .field("tracking", &state.tracking)
            .field("track_collection", &state.track_collection)
            .field("track_item", &state.track_item)
            .field("disposed", &state.disposed)
            .finish()
    }
}

fn key_of_tracked<T: TrackedItem>(item: &T) -> ItemKey {
    item.item_key()
}

impl<T, S> ViewEngine<T, S>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: ViewStrategy<T>,
{
    /// Binds a view with the given strategy to `source`, begins
    /// collection-level tracking, and publishes the initial content
    /// synchronously.
    #[must_use]
    pub fn with_strategy(source: &ObservableVec<T>, strategy: S) -> Self {
        let engine = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(EngineState {
                    source: Some(source.clone()),
                    strategy,
                    content: DiffableVec::new(),
                    tracking: true,
                    track_collection: false,
                    track_item: false,
                    disposed: false,
                    bridge: SubscriptionBridge::new(),
                    item_hook: None,
                    changed: SubscriberSet::new(),
                    count_changed: SubscriberSet::new(),
                }),
            }),
        };
        engine.attach_collection_handler();
        Self::refresh_inner(&engine.inner);
        engine
    }

    /// Like [`with_strategy`](Self::with_strategy), but additionally begins
    /// item-level tracking so element field changes re-evaluate the view.
    #[must_use]
    pub fn with_strategy_tracking_items(source: &ObservableVec<T>, strategy: S) -> Self
    where
        T: TrackedItem,
    {
        let engine = Self::with_strategy(source, strategy);
        engine.set_track_item_changes(true);
        engine
    }

    // -- Reads -------------------------------------------------------------

    /// Number of elements currently published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().content.len()
    }

    /// `true` if the view currently publishes no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().content.is_empty()
    }

    /// Clone of the published element at `index`, or `None` if out of
    /// bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.state.lock().content.get(index).cloned()
    }

    /// `true` if some published element equals `item`.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.inner.state.lock().content.contains(item)
    }

    /// Clone of the full published content, in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.state.lock().content.as_slice().to_vec()
    }

    /// Runs `f` over the published content without cloning, under the view
    /// lock. `f` must not call back into this view.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(self.inner.state.lock().content.as_slice())
    }

    /// Calls `f` for each published element in order, under the view lock.
    /// Same reentrancy caveat as [`with`](Self::with).
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for item in self.inner.state.lock().content.iter() {
            f(item);
        }
    }

    // -- Subscriptions -----------------------------------------------------

    /// Subscribes to content changes. Dropping the guard unsubscribes.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ViewChanged<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.lock().changed.subscribe(callback)
    }

    /// Subscribes to count changes, raised only when the published count
    /// actually changed. Dropping the guard unsubscribes.
    pub fn subscribe_count(
        &self,
        callback: impl Fn(&usize) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.lock().count_changed.subscribe(callback)
    }

    // -- Tracking flags ----------------------------------------------------

    /// `true` while the view recomputes in response to changes.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.inner.state.lock().tracking
    }

    /// Enables or disables recomputation. Enabling refreshes immediately,
    /// reconciling any changes that accumulated while disabled; disabling
    /// freezes the published content without detaching subscriptions.
    pub fn set_tracking(&self, tracking: bool) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed || state.tracking == tracking {
                return;
            }
            state.tracking = tracking;
            debug!(tracking, "view tracking toggled");
        }
        if tracking {
            Self::refresh_inner(&self.inner);
        }
    }

    /// `true` while the view listens for source collection changes.
    #[must_use]
    pub fn track_collection_changes(&self) -> bool {
        self.inner.state.lock().track_collection
    }

    /// Attaches or detaches the collection-level source subscription, then
    /// refreshes.
    pub fn set_track_collection_changes(&self, enabled: bool) {
        {
            let state = self.inner.state.lock();
            if state.disposed || state.track_collection == enabled {
                return;
            }
        }
        if enabled {
            self.attach_collection_handler();
        } else {
            let mut state = self.inner.state.lock();
            state.track_collection = false;
            state.bridge.detach_collection();
        }
        Self::refresh_inner(&self.inner);
    }

    /// `true` while element field changes re-evaluate the view.
    #[must_use]
    pub fn track_item_changes(&self) -> bool {
        self.inner.state.lock().track_item
    }

    /// Enables or disables item-level tracking. Enabling subscribes to
    /// every element currently in the source; disabling drops every item
    /// subscription. Both directions refresh afterwards.
    pub fn set_track_item_changes(&self, enabled: bool)
    where
        T: TrackedItem,
    {
        {
            let mut state = self.inner.state.lock();
            if state.disposed || state.track_item == enabled {
                return;
            }
            state.track_item = enabled;
            if enabled {
                let weak = Arc::downgrade(&self.inner);
                state.item_hook = Some(ItemHook {
                    key_of: key_of_tracked::<T>,
                    attach: Box::new(move |item: &T| {
                        let weak = weak.clone();
                        item.subscribe_item(Box::new(move |_change| {
                            if let Some(inner) = weak.upgrade() {
                                Self::refresh_inner(&inner);
                            }
                        }))
                    }),
                });
                Self::reconcile_item_subscriptions(&mut state);
            } else {
                state.bridge.detach_all_items();
                state.item_hook = None;
            }
            debug!(enabled, "item tracking toggled");
        }
        Self::refresh_inner(&self.inner);
    }

    // -- Refresh / lifecycle -----------------------------------------------

    /// Recomputes and publishes the view content now. No-op while tracking
    /// is disabled or after disposal.
    pub fn refresh(&self) {
        Self::refresh_inner(&self.inner);
    }

    /// Mutates the strategy, then refreshes. This is the single entry point
    /// every configuration setter goes through.
    ///
    /// The closure runs under the view lock and must not call back into the
    /// view.
    pub fn update_strategy(&self, f: impl FnOnce(&mut S)) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            f(&mut state.strategy);
        }
        Self::refresh_inner(&self.inner);
    }

    /// Reads the strategy under the view lock.
    pub fn read_strategy<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.state.lock().strategy)
    }

    /// Detaches every subscription, clears the source handle and the
    /// published content. Idempotent; the view stays inert afterwards.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.tracking = false;
        state.track_collection = false;
        state.track_item = false;
        state.bridge.detach_collection();
        state.bridge.detach_all_items();
        state.item_hook = None;
        state.source = None;
        state.content.clear();
        debug!("view disposed");
    }

    /// `true` once [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    // -- Internals ---------------------------------------------------------

    /// Subscribes the collection handler to the source and records it in
    /// the bridge (replacing any previous collection subscription).
    fn attach_collection_handler(&self) {
        let source = {
            let state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            match &state.source {
                Some(source) => source.clone(),
                None => return,
            }
        };
        let weak = Arc::downgrade(&self.inner);
        let subscription = source.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                Self::on_source_event(&inner, event);
            }
        });
        let mut state = self.inner.state.lock();
        state.track_collection = true;
        state.bridge.attach_collection(subscription);
    }

    /// Collection-change handler: keep the item-subscription table in step
    /// with the source, then refresh.
    fn on_source_event(inner: &Arc<Inner<T, S>>, event: &SourceEvent<T>) {
        {
            let mut state = inner.state.lock();
            if state.disposed {
                return;
            }
            trace!(event = source_event_name(event), "source changed");
            if state.track_item {
                Self::reconcile_item_subscriptions(&mut state);
            }
        }
        Self::refresh_inner(inner);
    }

    /// Attaches to every source item not yet subscribed and detaches from
    /// every subscribed item no longer in the source. Runs under the view
    /// lock; requires an installed item hook.
    fn reconcile_item_subscriptions(state: &mut EngineState<T, S>) {
        let EngineState {
            source,
            item_hook,
            bridge,
            ..
        } = state;
        let (Some(source), Some(hook)) = (source.as_ref(), item_hook.as_ref()) else {
            return;
        };
        let items = source.snapshot();
        bridge.reconcile_items(&items, hook.key_of, |item| (hook.attach)(item));
    }

    /// The refresh pipeline. See the module docs for the contract.
    fn refresh_inner(inner: &Arc<Inner<T, S>>) {
        let (event, new_count, changed_cbs, count_cbs) = {
            let mut state = inner.state.lock();
            if state.disposed || !state.tracking {
                return;
            }
            let Some(source) = state.source.clone() else {
                return;
            };
            let span = debug_span!("refresh");
            let _span = span.enter();

            let snapshot = source.snapshot();
            let new_content = state.strategy.compute(&snapshot);
            if state.content.is_copy_of(&new_content) {
                trace!(count = new_content.len(), "refresh: no content change");
                return;
            }

            let diff = reconcile(state.content.as_slice(), &new_content);
            let old_count = state.content.len();
            let new_count = new_content.len();
            state.content.replace_all(new_content);
            trace!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                count = new_count,
                "refresh: published"
            );

            let changed_cbs = state.changed.snapshot();
            let count_cbs = if new_count == old_count {
                Vec::new()
            } else {
                state.count_changed.snapshot()
            };
            (
                ViewChanged {
                    added: diff.added,
                    removed: diff.removed,
                },
                new_count,
                changed_cbs,
                count_cbs,
            )
        };
        // Lock released: handlers may re-enter the view.
        for cb in &changed_cbs {
            cb(&event);
        }
        for cb in &count_cbs {
            cb(&new_count);
        }
    }
}

fn source_event_name<T>(event: &SourceEvent<T>) -> &'static str {
    match event {
        SourceEvent::Reset => "reset",
        SourceEvent::Inserted { .. } => "inserted",
        SourceEvent::Removed { .. } => "removed",
    }
}

// -- FilteredView configuration surface -------------------------------------

impl<T: Clone + PartialEq + Send + Sync + 'static> FilteredView<T> {
    /// Binds a filter/order/page view to `source` with no filter, no
    /// order, and no paging: the initial content is a copy of the source.
    #[must_use]
    pub fn new(source: &ObservableVec<T>) -> Self {
        Self::with_strategy(source, FilterOrder::new())
    }

    /// Like [`new`](Self::new), with item-level tracking enabled from the
    /// start.
    #[must_use]
    pub fn with_item_tracking(source: &ObservableVec<T>) -> Self
    where
        T: TrackedItem,
    {
        Self::with_strategy_tracking_items(source, FilterOrder::new())
    }

    /// Sets the filter predicate and refreshes.
    ///
    /// The predicate runs under the view lock and must not call back into
    /// this view. A panicking predicate propagates out of this call and
    /// leaves the published content untouched.
    pub fn set_filter(&self, filter: impl Fn(&T) -> bool + Send + Sync + 'static) {
        self.update_strategy(|s| s.set_filter(filter));
    }

    /// Removes the filter and refreshes.
    pub fn clear_filter(&self) {
        self.update_strategy(FilterOrder::clear_filter);
    }

    /// Orders by the given key and refreshes. Ties keep source relative
    /// order. Same locking caveat as [`set_filter`](Self::set_filter).
    pub fn set_order_by<K: Ord>(&self, key: impl Fn(&T) -> K + Send + Sync + 'static) {
        self.update_strategy(|s| s.set_order_by(key));
    }

    /// Orders by an explicit comparator and refreshes.
    pub fn set_order(&self, compare: impl Fn(&T, &T) -> std::cmp::Ordering + Send + Sync + 'static) {
        self.update_strategy(|s| s.set_order(compare));
    }

    /// Removes the ordering and refreshes.
    pub fn clear_order(&self) {
        self.update_strategy(FilterOrder::clear_order);
    }

    /// Sets the sort direction and refreshes.
    pub fn set_ascending(&self, ascending: bool) {
        self.update_strategy(|s| s.set_ascending(ascending));
    }

    /// Current sort direction.
    #[must_use]
    pub fn ascending(&self) -> bool {
        self.read_strategy(FilterOrder::ascending)
    }

    /// Sets the paging offset and refreshes.
    pub fn set_offset(&self, offset: usize) {
        self.update_strategy(|s| s.set_offset(offset));
    }

    /// Current paging offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.read_strategy(FilterOrder::offset)
    }

    /// Sets the paging limit (`None` = unbounded) and refreshes.
    pub fn set_limit(&self, limit: Option<usize>) {
        self.update_strategy(|s| s.set_limit(limit));
    }

    /// Current paging limit.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.read_strategy(FilterOrder::limit)
    }
}

// -- QueryView configuration surface ----------------------------------------

impl<T: Clone + PartialEq + Send + Sync + 'static> QueryView<T> {
    /// Binds a query view to `source` with no query set: the initial
    /// content is a copy of the source.
    #[must_use]
    pub fn new(source: &ObservableVec<T>) -> Self {
        Self::with_strategy(source, Query::new())
    }

    /// Like [`new`](Self::new), with item-level tracking enabled from the
    /// start.
    #[must_use]
    pub fn with_item_tracking(source: &ObservableVec<T>) -> Self
    where
        T: TrackedItem,
    {
        Self::with_strategy_tracking_items(source, Query::new())
    }

    /// Sets the transform and refreshes.
    ///
    /// The transform runs under the view lock and must not call back into
    /// this view. A panicking transform propagates out of this call and
    /// leaves the published content untouched.
    pub fn set_query(&self, query: impl Fn(&[T]) -> Vec<T> + Send + Sync + 'static) {
        self.update_strategy(|s| s.set_query(query));
    }

    /// Removes the transform (restoring passthrough) and refreshes.
    pub fn clear_query(&self) {
        self.update_strategy(Query::clear_query);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
