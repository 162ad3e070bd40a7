use std::cmp::Ordering;

/// Total order over index keys.
pub trait Comparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// The key type's own [`Ord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<K: Ord> Comparator<K> for NaturalOrder {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Reverses another comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reverse<C>(pub C);

impl<K, C: Comparator<K>> Comparator<K> for Reverse<C> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self.0.compare(b, a)
    }
}
