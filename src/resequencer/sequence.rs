/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Ordered buffer of not-yet-delivered elements.
//!
//! Elements live in a skip list ordered by the engine's
//! [`OrderingStrategy`]. Every entry carries the strategy so the skip list can
//! compare entries without the strategy implementing `Ord` itself.

use super::element::Element;
use super::strategy::OrderingStrategy;
use crossbeam_skiplist::SkipSet;
use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

/// Skip list key: an element ordered through the shared strategy.
struct Ranked<E, S> {
    /// The buffered element.
    element: Arc<Element<E>>,

    /// Strategy ranking the element.
    strategy: Arc<S>,
}

impl<E, S: OrderingStrategy<E>> PartialEq for Ranked<E, S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E, S: OrderingStrategy<E>> Eq for Ranked<E, S> {}

impl<E, S: OrderingStrategy<E>> PartialOrd for Ranked<E, S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E, S: OrderingStrategy<E>> Ord for Ranked<E, S> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.strategy
            .compare(self.element.item(), other.element.item())
    }
}

/// Sorted set of buffered elements.
///
/// Equal elements (under the strategy) are not stored twice;
/// [`Sequence::insert`] reports the clash instead of replacing the entry.
pub struct Sequence<E, S> {
    /// Elements in strategy order.
    entries: SkipSet<Ranked<E, S>>,

    /// Strategy shared by every entry and lookup probe.
    strategy: Arc<S>,
}

impl<E, S> Sequence<E, S>
where
    E: Send + Sync + 'static,
    S: OrderingStrategy<E>,
{
    /// Creates an empty sequence ordered by `strategy`.
    #[must_use]
    pub fn new(strategy: Arc<S>) -> Self {
        Self {
            entries: SkipSet::new(),
            strategy,
        }
    }

    /// Number of buffered elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if an element equal to `element` is buffered.
    #[must_use]
    pub fn contains(&self, element: &Arc<Element<E>>) -> bool {
        self.entries.contains(&self.probe(element))
    }

    /// Adds `element`. Returns `false`, leaving the sequence unchanged, if an
    /// equal element is already present.
    pub fn insert(&self, element: Arc<Element<E>>) -> bool {
        let ranked = self.probe(&element);
        if self.entries.contains(&ranked) {
            return false;
        }
        self.entries.insert(ranked);
        true
    }

    /// Removes the element equal to `element`. Returns `true` if one was found.
    pub fn remove(&self, element: &Arc<Element<E>>) -> bool {
        self.entries.remove(&self.probe(element)).is_some()
    }

    /// The smallest buffered element.
    #[must_use]
    pub fn first(&self) -> Option<Arc<Element<E>>> {
        self.entries
            .front()
            .map(|entry| Arc::clone(&entry.value().element))
    }

    /// The buffered element immediately preceding `element`, if the nearest
    /// lower entry is adjacent to it under the strategy.
    #[must_use]
    pub fn predecessor(&self, element: &Arc<Element<E>>) -> Option<Arc<Element<E>>> {
        let probe = self.probe(element);
        let lower = self.entries.upper_bound(Bound::Excluded(&probe))?;
        let candidate = &lower.value().element;
        self.strategy
            .is_predecessor(candidate.item(), element.item())
            .then(|| Arc::clone(candidate))
    }

    /// The buffered element immediately following `element`, if the nearest
    /// higher entry is adjacent to it under the strategy.
    #[must_use]
    pub fn successor(&self, element: &Arc<Element<E>>) -> Option<Arc<Element<E>>> {
        let probe = self.probe(element);
        let higher = self.entries.lower_bound(Bound::Excluded(&probe))?;
        let candidate = &higher.value().element;
        self.strategy
            .is_successor(candidate.item(), element.item())
            .then(|| Arc::clone(candidate))
    }

    /// Snapshot of buffered elements in ascending order.
    #[must_use]
    pub fn elements(&self) -> Vec<Arc<Element<E>>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.value().element))
            .collect()
    }

    fn probe(&self, element: &Arc<Element<E>>) -> Ranked<E, S> {
        Ranked {
            element: Arc::clone(element),
            strategy: Arc::clone(&self.strategy),
        }
    }
}
