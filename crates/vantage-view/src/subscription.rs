#![forbid(unsafe_code)]

//! Subscriber plumbing: RAII subscriptions over weak callbacks.
//!
//! # Design
//!
//! A subscriber hands its callback to the notifying object, which keeps
//! only a `Weak` reference to it. The strong reference lives inside the
//! returned [`Subscription`] guard. Dropping the guard is the unsubscribe:
//! the weak entry fails to upgrade on the next notification cycle and is
//! pruned there. The notifying object therefore can never extend a
//! subscriber's lifetime, and a forgotten explicit detach degrades to a
//! lazily-pruned dead entry rather than a leak.
//!
//! # Invariants
//!
//! 1. Callbacks are invoked in registration order.
//! 2. A dropped [`Subscription`] is never invoked again.
//! 3. Dead entries are pruned during [`SubscriberSet::snapshot`].
//! 4. Notification never runs under the owner's lock: the owner snapshots
//!    the live callbacks while locked and invokes them after release.

use std::any::Any;
use std::sync::{Arc, Weak};

/// A live callback, shared between the notifying object (weakly) and its
/// [`Subscription`] guard (strongly).
pub(crate) type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

type CallbackWeak<E> = Weak<dyn Fn(&E) + Send + Sync>;

/// RAII guard for a registered callback.
///
/// Dropping the guard drops the only strong reference to the callback, so
/// the notifying object's weak entry dies and is pruned on the next
/// notification cycle. The guard is type-erased so one subscription type
/// serves every event payload.
pub struct Subscription {
    // Type-erased strong Arc keeping the callback alive.
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    pub(crate) fn hold<E: 'static>(callback: Callback<E>) -> Self {
        Self {
            _guard: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// An ordered list of weak subscriber callbacks for events of type `E`.
///
/// The set itself is not synchronized; owners embed it in their own locked
/// state and call [`snapshot`](Self::snapshot) under that lock.
pub(crate) struct SubscriberSet<E> {
    entries: Vec<CallbackWeak<E>>,
}

impl<E: 'static> SubscriberSet<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `callback` and returns the guard that keeps it alive.
    pub(crate) fn subscribe(
        &mut self,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription {
        let strong: Callback<E> = Arc::new(callback);
        self.entries.push(Arc::downgrade(&strong));
        Subscription::hold(strong)
    }

    /// Prunes dead entries and returns the live callbacks in registration
    /// order. Callers invoke the snapshot after releasing their lock.
    pub(crate) fn snapshot(&mut self) -> Vec<Callback<E>> {
        self.entries.retain(|weak| weak.strong_count() > 0);
        self.entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Number of registered entries, including dead ones not yet pruned.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<E> std::fmt::Debug for SubscriberSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("entries", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
