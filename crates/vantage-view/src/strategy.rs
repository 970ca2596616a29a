#![forbid(unsafe_code)]

//! Content strategies: how a view computes its content from the source.
//!
//! A strategy is a pure function from the source snapshot to the view
//! content. Two are provided:
//!
//! - [`FilterOrder<T>`]: filter, then stable order, then offset/limit
//!   paging, always in that order.
//! - [`Query<T>`]: a caller-supplied transform that owns the entire
//!   computation, for shapes paging cannot express (grouping, joins,
//!   top-N-per-group).
//!
//! Custom strategies implement [`ViewStrategy`] and plug into
//! `ViewEngine::with_strategy`.

use std::cmp::Ordering;
use std::sync::Arc;

/// Caller-supplied filter predicate.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Caller-supplied order comparator.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Caller-supplied whole-sequence transform.
pub type QueryFn<T> = Arc<dyn Fn(&[T]) -> Vec<T> + Send + Sync>;

/// Computes view content from a source snapshot.
///
/// Implementations must be pure with respect to the snapshot: same input,
/// same output, no interaction with the view that runs them (the engine
/// invokes `compute` under its lock).
pub trait ViewStrategy<T>: Send + 'static {
    /// Computes the content the view should publish for `items`.
    fn compute(&self, items: &[T]) -> Vec<T>;
}

/// Filter → stable order → offset/limit, in that fixed order.
///
/// With no filter and no order the source passes through unchanged (still
/// copied, so the view content is decoupled from later source mutation).
/// Ordering is stable: elements that compare equal keep their source
/// relative order, ascending or descending: descending reverses the
/// comparator result, under which ties still compare equal.
pub struct FilterOrder<T> {
    filter: Option<Predicate<T>>,
    order: Option<Comparator<T>>,
    ascending: bool,
    offset: usize,
    limit: Option<usize>,
}

impl<T> FilterOrder<T> {
    /// No filter, no order, no paging: source passthrough.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filter: None,
            order: None,
            ascending: true,
            offset: 0,
            limit: None,
        }
    }

    /// Sets the filter predicate.
    pub fn set_filter(&mut self, filter: impl Fn(&T) -> bool + Send + Sync + 'static) {
        self.filter = Some(Arc::new(filter));
    }

    /// Removes the filter.
    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// `true` if a filter is set.
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Orders by the given key. The key type is erased here: only the
    /// comparator it induces is stored, so views stay monomorphic in `T`.
    pub fn set_order_by<K: Ord>(&mut self, key: impl Fn(&T) -> K + Send + Sync + 'static) {
        self.order = Some(Arc::new(move |a, b| key(a).cmp(&key(b))));
    }

    /// Orders by an explicit comparator.
    pub fn set_order(&mut self, compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) {
        self.order = Some(Arc::new(compare));
    }

    /// Removes the ordering.
    pub fn clear_order(&mut self) {
        self.order = None;
    }

    /// `true` if an ordering is set.
    #[must_use]
    pub fn has_order(&self) -> bool {
        self.order.is_some()
    }

    /// Sets the sort direction. Ignored while no order is set.
    pub fn set_ascending(&mut self, ascending: bool) {
        self.ascending = ascending;
    }

    /// Current sort direction.
    #[must_use]
    pub fn ascending(&self) -> bool {
        self.ascending
    }

    /// Number of leading elements to skip after ordering.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Current offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Maximum number of elements to keep after the offset; `None` is
    /// unbounded.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Current limit.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl<T> Default for FilterOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FilterOrder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterOrder")
            .field("filter", &self.filter.is_some())
            .field("order", &self.order.is_some())
            .field("ascending", &self.ascending)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ViewStrategy<T> for FilterOrder<T> {
    fn compute(&self, items: &[T]) -> Vec<T> {
        let mut content: Vec<T> = match &self.filter {
            Some(filter) => items.iter().filter(|item| filter(item)).cloned().collect(),
            None => items.to_vec(),
        };

        if let Some(compare) = &self.order {
            if self.ascending {
                content.sort_by(|a, b| compare(a, b));
            } else {
                content.sort_by(|a, b| compare(a, b).reverse());
            }
        }

        if self.offset > 0 {
            let skip = self.offset.min(content.len());
            content.drain(..skip);
        }
        if let Some(limit) = self.limit {
            content.truncate(limit);
        }
        content
    }
}

/// A caller-supplied transform owning the entire computation.
///
/// With no query set, the source passes through unchanged (copied).
pub struct Query<T> {
    query: Option<QueryFn<T>>,
}

impl<T> Query<T> {
    /// Passthrough until a query is set.
    #[must_use]
    pub fn new() -> Self {
        Self { query: None }
    }

    /// Sets the transform.
    pub fn set_query(&mut self, query: impl Fn(&[T]) -> Vec<T> + Send + Sync + 'static) {
        self.query = Some(Arc::new(query));
    }

    /// Removes the transform, restoring passthrough.
    pub fn clear_query(&mut self) {
        self.query = None;
    }

    /// `true` if a transform is set.
    #[must_use]
    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("query", &self.query.is_some())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ViewStrategy<T> for Query<T> {
    fn compute(&self, items: &[T]) -> Vec<T> {
        match &self.query {
            Some(query) => query(items),
            None => items.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
