//! Immutable node contents.
//!
//! Every edit consumes a [`Data`] and returns the edited copy; the node
//! that owns it swaps the new value in.

use crate::common::PageId;

/// What follows the keys of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<V> {
    /// `children.len() == keys.len() + 1`.
    Branch { children: Vec<PageId> },
    /// `values.len() == keys.len()`; `next` is the right sibling leaf.
    Leaf { values: Vec<V>, next: PageId },
}

/// Keys plus either child pointers or values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data<K, V> {
    pub keys: Vec<K>,
    pub payload: Payload<V>,
}

impl<K, V> Default for Data<K, V> {
    /// The empty, unlinked leaf.
    fn default() -> Self {
        Self::leaf(Vec::new(), Vec::new(), PageId::INVALID)
    }
}

impl<K, V> Data<K, V> {
    pub fn leaf(keys: Vec<K>, values: Vec<V>, next: PageId) -> Self {
        Self {
            keys,
            payload: Payload::Leaf { values, next },
        }
    }

    pub fn branch(keys: Vec<K>, children: Vec<PageId>) -> Self {
        Self {
            keys,
            payload: Payload::Branch { children },
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.payload, Payload::Branch { .. })
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_branch()
    }

    /// Child pointers of a branch; empty for a leaf.
    pub fn children(&self) -> &[PageId] {
        match &self.payload {
            Payload::Branch { children } => children,
            Payload::Leaf { .. } => &[],
        }
    }

    /// Values of a leaf; empty for a branch.
    pub fn values(&self) -> &[V] {
        match &self.payload {
            Payload::Leaf { values, .. } => values,
            Payload::Branch { .. } => &[],
        }
    }

    /// Right sibling of a leaf; `INVALID` for a branch.
    pub fn next(&self) -> PageId {
        match &self.payload {
            Payload::Leaf { next, .. } => *next,
            Payload::Branch { .. } => PageId::INVALID,
        }
    }

    pub fn child(&self, idx: usize) -> Option<PageId> {
        self.children().get(idx).copied()
    }

    pub fn with_next(self, next: PageId) -> Self {
        match self.payload {
            Payload::Leaf { values, .. } => Self::leaf(self.keys, values, next),
            branch => Self {
                keys: self.keys,
                payload: branch,
            },
        }
    }

    /// Insert or replace `key` at `idx` in a leaf.
    pub fn with_entry(mut self, idx: usize, key: K, value: V, replace: bool) -> Self {
        if let Payload::Leaf { values, .. } = &mut self.payload {
            if replace {
                values[idx] = value;
            } else {
                self.keys.insert(idx, key);
                values.insert(idx, value);
            }
        }
        self
    }

    /// Remove the entry at `idx` from a leaf, returning its value.
    pub fn without_entry(mut self, idx: usize) -> (Self, Option<V>) {
        let removed = match &mut self.payload {
            Payload::Leaf { values, .. } => {
                self.keys.remove(idx);
                Some(values.remove(idx))
            }
            Payload::Branch { .. } => None,
        };
        (self, removed)
    }

    /// Point a branch's child slot at another page.
    pub fn with_child(mut self, idx: usize, page: PageId) -> Self {
        if let Payload::Branch { children } = &mut self.payload {
            children[idx] = page;
        }
        self
    }

    /// Drop child `idx` from a branch together with one neighbouring key:
    /// the key to its right, or for the last child the key to its left.
    pub fn without_child(mut self, idx: usize) -> Self {
        if let Payload::Branch { children } = &mut self.payload {
            let key_idx = if idx < children.len() - 1 { idx } else { idx - 1 };
            children.remove(idx);
            self.keys.remove(key_idx);
        }
        self
    }

    /// Adopt split results from child `idx`: each `(separator, page)` goes
    /// in right after the child, in order.
    pub fn with_promotions(mut self, idx: usize, promotions: Vec<(K, PageId)>) -> Self {
        if let Payload::Branch { children } = &mut self.payload {
            for (j, (key, page)) in promotions.into_iter().enumerate() {
                self.keys.insert(idx + j, key);
                children.insert(idx + 1 + j, page);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(ids: &[u32]) -> Vec<PageId> {
        ids.iter().copied().map(PageId::new).collect()
    }

    #[test]
    fn test_default_is_empty_leaf() {
        let data: Data<u32, u32> = Data::default();
        assert!(data.is_leaf());
        assert!(data.keys.is_empty());
        assert_eq!(data.next(), PageId::INVALID);
    }

    #[test]
    fn test_leaf_edits() {
        let data = Data::leaf(vec![1, 3], vec!["a", "c"], PageId::new(9));
        let data = data.with_entry(1, 2, "b", false);
        assert_eq!(data.keys, vec![1, 2, 3]);
        assert_eq!(data.values(), &["a", "b", "c"]);

        let data = data.with_entry(0, 1, "A", true);
        assert_eq!(data.values(), &["A", "b", "c"]);

        let (data, removed) = data.without_entry(2);
        assert_eq!(removed, Some("c"));
        assert_eq!(data.keys, vec![1, 2]);
        assert_eq!(data.next(), PageId::new(9));
        assert_eq!(data.with_next(PageId::INVALID).next(), PageId::INVALID);
    }

    #[test]
    fn test_without_child_drops_neighbouring_key() {
        let data: Data<u32, ()> = Data::branch(vec![10, 20], pages(&[1, 2, 3]));

        let middle = data.clone().without_child(1);
        assert_eq!(middle.keys, vec![10]);
        assert_eq!(middle.children(), &pages(&[1, 3])[..]);

        let last = data.without_child(2);
        assert_eq!(last.keys, vec![10]);
        assert_eq!(last.children(), &pages(&[1, 2])[..]);
    }

    #[test]
    fn test_with_promotions() {
        let data: Data<u32, ()> = Data::branch(vec![10, 40], pages(&[1, 2, 3]));
        let data = data.with_promotions(1, vec![(20, PageId::new(7)), (30, PageId::new(8))]);
        assert_eq!(data.keys, vec![10, 20, 30, 40]);
        assert_eq!(data.children(), &pages(&[1, 2, 7, 8, 3])[..]);
    }
}
