use crate::index::{Comparator, Predicate};

/// Receives whole leaves from [`BTreeIndex::visit`](crate::index::BTreeIndex::visit).
pub trait IndexVisitor<K, V> {
    /// Whether the subtree holding keys in `[first, second)` should be
    /// visited. `None` means unbounded.
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool;

    /// Called with every key and value of one leaf, in order.
    fn visit(&mut self, keys: &[K], values: &[V], comparator: &dyn Comparator<K>);

    /// Once true, the walk stops.
    fn is_satiated(&self) -> bool {
        false
    }
}

/// Collects the entries whose keys match a predicate.
pub struct PredicateVisitor<K, V, P> {
    predicate: P,
    entries: Vec<(K, V)>,
}

impl<K, V, P: Predicate<K>> PredicateVisitor<K, V, P> {
    pub fn new(predicate: P) -> Self {
        Self {
            predicate,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[(K, V)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(K, V)> {
        self.entries
    }
}

impl<K: Clone, V: Clone, P: Predicate<K>> IndexVisitor<K, V> for PredicateVisitor<K, V, P> {
    fn is_interested_in_keys_between(
        &self,
        first: Option<&K>,
        second: Option<&K>,
        comparator: &dyn Comparator<K>,
    ) -> bool {
        self.predicate
            .is_interested_in_keys_between(first, second, comparator)
    }

    fn visit(&mut self, keys: &[K], values: &[V], comparator: &dyn Comparator<K>) {
        for (key, value) in keys.iter().zip(values) {
            if self.predicate.is_satiated() {
                return;
            }
            if self.predicate.is_interested_in_key(key, comparator) {
                self.entries.push((key.clone(), value.clone()));
            }
        }
    }

    fn is_satiated(&self) -> bool {
        self.predicate.is_satiated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::predicate::{gt, limit};
    use crate::index::NaturalOrder;

    #[test]
    fn test_collects_matches_until_satiated() {
        let mut visitor = PredicateVisitor::new(limit(gt(1), 2));
        visitor.visit(&[1, 2, 3, 4], &["a", "b", "c", "d"], &NaturalOrder);
        assert_eq!(visitor.entries(), &[(2, "b"), (3, "c")]);
        assert!(IndexVisitor::<i32, &str>::is_satiated(&visitor));
    }
}
