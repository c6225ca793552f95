/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Ordering strategies.
//!
//! The engine never inspects item content directly. Everything it needs to
//! know about an item (its position in the total order, whether another item
//! is its immediate neighbour, whether it is acceptable at all) is asked of an
//! [`OrderingStrategy`] supplied by the caller.

use std::cmp::Ordering;
use std::marker::PhantomData;

/// Pluggable total order plus adjacency predicates over items of type `E`.
///
/// Implementations must be pure. For any sane implementation
/// `is_predecessor(a, b) == is_successor(b, a)`; the engine relies on it but
/// does not check it.
///
/// # Examples
///
/// ```
/// use resequencer::resequencer::OrderingStrategy;
/// use std::cmp::Ordering;
///
/// struct Letters;
///
/// impl OrderingStrategy<char> for Letters {
///     fn compare(&self, a: &char, b: &char) -> Ordering {
///         a.cmp(b)
///     }
///
///     fn is_predecessor(&self, a: &char, b: &char) -> bool {
///         (*a as u32) + 1 == *b as u32
///     }
///
///     fn is_valid(&self, item: &char) -> bool {
///         item.is_ascii_lowercase()
///     }
/// }
///
/// assert!(Letters.is_successor(&'b', &'a'));
/// assert!(!Letters.is_valid(&'A'));
/// ```
pub trait OrderingStrategy<E>: Send + Sync + 'static {
    /// Total order over items.
    fn compare(&self, a: &E, b: &E) -> Ordering;

    /// Returns `true` if `a` immediately precedes `b`.
    fn is_predecessor(&self, a: &E, b: &E) -> bool;

    /// Returns `true` if `a` immediately follows `b`.
    fn is_successor(&self, a: &E, b: &E) -> bool {
        self.is_predecessor(b, a)
    }

    /// Returns `true` if `item` can be ordered by this strategy.
    fn is_valid(&self, _item: &E) -> bool {
        true
    }
}

/// Orders items by a `u64` sequence number extracted from each item.
///
/// An item whose key cannot be extracted (the extractor returns `None`) is
/// invalid. Two items are adjacent when their keys are `n` and `n + 1`.
///
/// # Examples
///
/// ```
/// use resequencer::resequencer::{OrderingStrategy, SequenceNumberStrategy};
///
/// #[derive(Clone)]
/// struct Message {
///     seq: Option<u64>,
/// }
///
/// let strategy = SequenceNumberStrategy::new(|m: &Message| m.seq);
/// let a = Message { seq: Some(7) };
/// let b = Message { seq: Some(8) };
///
/// assert!(strategy.is_predecessor(&a, &b));
/// assert!(!strategy.is_valid(&Message { seq: None }));
/// ```
pub struct SequenceNumberStrategy<E, F> {
    /// Extracts the sequence number; `None` marks an invalid item.
    key: F,

    _item: PhantomData<fn(&E)>,
}

impl<E, F> SequenceNumberStrategy<E, F>
where
    F: Fn(&E) -> Option<u64>,
{
    /// Creates a strategy using `key` to extract each item's sequence number.
    #[must_use]
    pub fn new(key: F) -> Self {
        Self {
            key,
            _item: PhantomData,
        }
    }

    /// Returns the sequence number of `item`, if it has one.
    #[inline]
    pub fn key_of(&self, item: &E) -> Option<u64> {
        (self.key)(item)
    }
}

/// [`SequenceNumberStrategy`] over bare `u64` values.
pub type NaturalOrder = SequenceNumberStrategy<u64, fn(&u64) -> Option<u64>>;

impl NaturalOrder {
    /// Strategy over bare `u64` sequence numbers.
    #[must_use]
    pub fn natural() -> Self {
        Self::new(|n: &u64| Some(*n))
    }
}

impl<E, F> OrderingStrategy<E> for SequenceNumberStrategy<E, F>
where
    E: 'static,
    F: Fn(&E) -> Option<u64> + Send + Sync + 'static,
{
    fn compare(&self, a: &E, b: &E) -> Ordering {
        self.key_of(a).cmp(&self.key_of(b))
    }

    fn is_predecessor(&self, a: &E, b: &E) -> bool {
        match (self.key_of(a), self.key_of(b)) {
            (Some(a), Some(b)) => a.checked_add(1) == Some(b),
            _ => false,
        }
    }

    fn is_valid(&self, item: &E) -> bool {
        self.key_of(item).is_some()
    }
}

impl<E, F> std::fmt::Debug for SequenceNumberStrategy<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceNumberStrategy").finish_non_exhaustive()
    }
}
