#![forbid(unsafe_code)]

//! Live collection views over observable sequences.
//!
//! A view derives its content from a mutable [`ObservableVec`] source
//! through a pluggable strategy (filter/order/page with [`FilteredView`],
//! or an arbitrary transform with [`QueryView`]) and keeps the derivation
//! continuously consistent as the source (and optionally its elements)
//! mutate. Consumers see an ordered, indexable sequence plus one coarse
//! [`ViewChanged`] notification per genuine content change.
//!
//! # Example
//!
//! ```
//! use vantage_view::{FilteredView, ObservableVec};
//!
//! let scores = ObservableVec::from_vec(vec![1, 2, 3, 4, 5]);
//! let evens = FilteredView::new(&scores);
//! evens.set_filter(|x: &i32| x % 2 == 0);
//! assert_eq!(evens.snapshot(), vec![2, 4]);
//!
//! // The view follows the source; only genuine changes notify.
//! scores.push(6);
//! assert_eq!(evens.snapshot(), vec![2, 4, 6]);
//! scores.push(7); // filtered out: no notification, no change
//! assert_eq!(evens.snapshot(), vec![2, 4, 6]);
//!
//! evens.dispose(); // detaches everything, deterministically
//! ```
//!
//! # Architecture
//!
//! - [`ObservableVec<T>`]: the externally owned source sequence; raises one
//!   [`SourceEvent`] per mutation to weak subscribers.
//! - [`ViewEngine<T, S>`]: owns the view lock, tracking flags, materialized
//!   content, and the refresh pipeline (compute → copy gate → multiset
//!   diff → replace → notify outside the lock).
//! - [`ViewStrategy`]: the content computation seam; [`FilterOrder`] and
//!   [`Query`] are the built-ins.
//! - [`TrackedItem`] / [`ItemCell`]: optional item-level tracking so
//!   element field changes re-evaluate the view.
//! - [`Subscription`]: RAII unsubscribe for every callback registration in
//!   the crate.
//!
//! # Threading
//!
//! Every public operation is synchronous and runs to completion on the
//! calling thread. Each view owns one lock serializing reads, refreshes,
//! and reconfiguration; notification handlers always run after that lock
//! is released, so handlers may re-enter the view. Concurrent refreshes
//! coalesce: the last to acquire the lock determines the published
//! content.

pub mod engine;
pub mod item;
pub mod source;
pub mod strategy;
pub mod subscription;

mod bridge;

pub use engine::{FilteredView, QueryView, ViewChanged, ViewEngine};
pub use item::{FieldChanged, ItemCell, ItemKey, TrackedItem};
pub use source::{ObservableVec, SourceEvent};
pub use strategy::{Comparator, FilterOrder, Predicate, Query, QueryFn, ViewStrategy};
pub use subscription::Subscription;
