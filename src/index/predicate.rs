//! Key predicates for pruned iteration.
//!
//! A predicate answers two questions: could any key in a branch's key range
//! match (so the subtree is worth loading), and does this particular key
//! match. Ranges passed to
//! [`is_interested_in_keys_between`](Predicate::is_interested_in_keys_between)
//! are `[first, second)`, with `None` meaning unbounded.

use std::cell::Cell;
use std::cmp::Ordering;

use crate::index::Comparator;

pub trait Predicate<K> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool;

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool;

    /// Once true, no further keys are wanted.
    fn is_satiated(&self) -> bool {
        false
    }
}

/// Keys strictly less than a value.
#[derive(Debug, Clone)]
pub struct Lt<K>(pub K);

/// Keys less than or equal to a value.
#[derive(Debug, Clone)]
pub struct Lte<K>(pub K);

/// Keys strictly greater than a value.
#[derive(Debug, Clone)]
pub struct Gt<K>(pub K);

/// Keys greater than or equal to a value.
#[derive(Debug, Clone)]
pub struct Gte<K>(pub K);

impl<K> Predicate<K> for Lt<K> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        _second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        first.is_none_or(|first| comparator.compare(first, &self.0) == Ordering::Less)
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        comparator.compare(key, &self.0) == Ordering::Less
    }
}

impl<K> Predicate<K> for Lte<K> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        _second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        first.is_none_or(|first| comparator.compare(first, &self.0) != Ordering::Greater)
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        comparator.compare(key, &self.0) != Ordering::Greater
    }
}

impl<K> Predicate<K> for Gt<K> {
    fn is_interested_in_keys_between(
        &self,
        _first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        second.is_none_or(|second| comparator.compare(second, &self.0) == Ordering::Greater)
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        comparator.compare(key, &self.0) == Ordering::Greater
    }
}

impl<K> Predicate<K> for Gte<K> {
    fn is_interested_in_keys_between(
        &self,
        _first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        // The range excludes `second`, so it must lie strictly above.
        second.is_none_or(|second| comparator.compare(second, &self.0) == Ordering::Greater)
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        comparator.compare(key, &self.0) != Ordering::Less
    }
}

/// Matches when every inner predicate matches.
pub struct And<K>(pub Vec<Box<dyn Predicate<K>>>);

impl<K> Predicate<K> for And<K> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        self.0
            .iter()
            .all(|p| p.is_interested_in_keys_between(first, second, comparator))
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        self.0.iter().all(|p| p.is_interested_in_key(key, comparator))
    }

    fn is_satiated(&self) -> bool {
        self.0.iter().any(|p| p.is_satiated())
    }
}

/// Matches when any inner predicate matches.
pub struct Or<K>(pub Vec<Box<dyn Predicate<K>>>);

impl<K> Predicate<K> for Or<K> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        self.0
            .iter()
            .any(|p| p.is_interested_in_keys_between(first, second, comparator))
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        self.0.iter().any(|p| p.is_interested_in_key(key, comparator))
    }

    fn is_satiated(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|p| p.is_satiated())
    }
}

/// Passes through at most `limit` matches of an inner predicate.
pub struct Limit<K> {
    inner: Box<dyn Predicate<K>>,
    limit: usize,
    matched: Cell<usize>,
}

impl<K> Predicate<K> for Limit<K> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        !self.is_satiated() && self.inner.is_interested_in_keys_between(first, second, comparator)
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        if self.is_satiated() || !self.inner.is_interested_in_key(key, comparator) {
            return false;
        }
        self.matched.set(self.matched.get() + 1);
        true
    }

    fn is_satiated(&self) -> bool {
        self.matched.get() >= self.limit || self.inner.is_satiated()
    }
}

pub fn lt<K: 'static>(value: K) -> Box<dyn Predicate<K>> {
    Box::new(Lt(value))
}

pub fn lte<K: 'static>(value: K) -> Box<dyn Predicate<K>> {
    Box::new(Lte(value))
}

pub fn gt<K: 'static>(value: K) -> Box<dyn Predicate<K>> {
    Box::new(Gt(value))
}

pub fn gte<K: 'static>(value: K) -> Box<dyn Predicate<K>> {
    Box::new(Gte(value))
}

pub fn and<K: 'static>(predicates: Vec<Box<dyn Predicate<K>>>) -> Box<dyn Predicate<K>> {
    Box::new(And(predicates))
}

pub fn or<K: 'static>(predicates: Vec<Box<dyn Predicate<K>>>) -> Box<dyn Predicate<K>> {
    Box::new(Or(predicates))
}

/// Keys in `[low, high)`.
pub fn range<K: 'static>(low: K, high: K) -> Box<dyn Predicate<K>> {
    and(vec![gte(low), lt(high)])
}

/// Stop after `limit` keys matched `predicate`.
pub fn limit<K: 'static>(predicate: Box<dyn Predicate<K>>, limit: usize) -> Box<dyn Predicate<K>> {
    Box::new(Limit {
        inner: predicate,
        limit,
        matched: Cell::new(0),
    })
}

impl<K> Predicate<K> for Box<dyn Predicate<K>> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        (**self).is_interested_in_keys_between(first, second, comparator)
    }

    fn is_interested_in_key(&self, key: &K, comparator: &dyn Comparator<K>) -> bool {
        (**self).is_interested_in_key(key, comparator)
    }

    fn is_satiated(&self) -> bool {
        (**self).is_satiated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NaturalOrder;

    const CMP: &NaturalOrder = &NaturalOrder;

    #[test]
    fn test_comparison_predicates() {
        assert!(lt(5).is_interested_in_key(&4, CMP));
        assert!(!lt(5).is_interested_in_key(&5, CMP));
        assert!(lte(5).is_interested_in_key(&5, CMP));
        assert!(gt(5).is_interested_in_key(&6, CMP));
        assert!(!gt(5).is_interested_in_key(&5, CMP));
        assert!(gte(5).is_interested_in_key(&5, CMP));
    }

    #[test]
    fn test_ranges_prune_subtrees() {
        // Child covering [10, 20).
        let (first, second) = (Some(&10), Some(&20));
        assert!(!lt(10).is_interested_in_keys_between(first, second, CMP));
        assert!(lte(10).is_interested_in_keys_between(first, second, CMP));
        assert!(!gt(20).is_interested_in_keys_between(first, second, CMP));
        assert!(!gte(20).is_interested_in_keys_between(first, second, CMP));
        assert!(gte(19).is_interested_in_keys_between(first, second, CMP));
        assert!(gt(5).is_interested_in_keys_between(None, second, CMP));
        assert!(lt(5).is_interested_in_keys_between(None, second, CMP));
    }

    #[test]
    fn test_and_or() {
        let r = range(3, 6);
        assert!(r.is_interested_in_key(&3, CMP));
        assert!(!r.is_interested_in_key(&6, CMP));
        assert!(!r.is_interested_in_keys_between(Some(&6), None, CMP));

        let o = or(vec![lt(2), gt(8)]);
        assert!(o.is_interested_in_key(&1, CMP));
        assert!(o.is_interested_in_key(&9, CMP));
        assert!(!o.is_interested_in_key(&5, CMP));
    }

    #[test]
    fn test_limit_satiates() {
        let p = limit(gte(0), 2);
        assert!(!p.is_satiated());
        assert!(p.is_interested_in_key(&1, CMP));
        assert!(p.is_interested_in_key(&2, CMP));
        assert!(p.is_satiated());
        assert!(!p.is_interested_in_key(&3, CMP));
        assert!(!p.is_interested_in_keys_between(None, None, CMP));
    }
}
