//! Iterators over a [`BTreeIndex`].
//!
//! Both yield `Result<(K, V)>`: pages are loaded lazily, so a load failure
//! or a cycle surfaces mid-iteration. After yielding an error an iterator
//! returns `None`.

use std::collections::HashSet;

use crate::common::{Error, PageId, Result};
use crate::index::btree::data::Payload;
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::node::Node;
use crate::index::Predicate;
use crate::storage::Paged;

/// Walks the leaf chain from a starting position.
pub struct BTreeIter<'i, 'a, K, V, P: Paged + ?Sized> {
    index: &'i BTreeIndex<'a, K, V, P>,
    leaf: Option<Node<K, V>>,
    pos: usize,
    seen: HashSet<PageId>,
}

impl<'i, 'a, K, V, P: Paged + ?Sized> BTreeIter<'i, 'a, K, V, P> {
    pub(crate) fn new(index: &'i BTreeIndex<'a, K, V, P>, leaf: Node<K, V>, pos: usize) -> Self {
        Self {
            index,
            seen: HashSet::from([leaf.page]),
            leaf: Some(leaf),
            pos,
        }
    }
}

impl<K: Clone, V: Clone, P: Paged + ?Sized> Iterator for BTreeIter<'_, '_, K, V, P> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;
            if let (Some(key), Some(value)) =
                (leaf.data.keys.get(self.pos), leaf.data.values().get(self.pos))
            {
                self.pos += 1;
                return Some(Ok((key.clone(), value.clone())));
            }

            let next = leaf.data.next();
            if !next.is_valid() {
                self.leaf = None;
                return None;
            }
            if !self.seen.insert(next) {
                self.leaf = None;
                return Some(Err(Error::CycleDetected(next)));
            }
            match self.index.store.load(next) {
                Ok(node) => {
                    self.leaf = Some(node);
                    self.pos = 0;
                }
                Err(e) => {
                    self.leaf = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Depth-first walk that only descends into subtrees the predicate is
/// interested in, stopping once it is satiated.
pub struct PredicateIter<'i, 'a, K, V, P: Paged + ?Sized, Pr> {
    index: &'i BTreeIndex<'a, K, V, P>,
    predicate: Pr,
    /// Pages still to visit; the next one is last.
    pending: Vec<PageId>,
    matches: std::vec::IntoIter<(K, V)>,
    seen: HashSet<PageId>,
}

impl<'i, 'a, K, V, P, Pr> PredicateIter<'i, 'a, K, V, P, Pr>
where
    K: Clone,
    V: Clone,
    P: Paged + ?Sized,
{
    pub(crate) fn new(index: &'i BTreeIndex<'a, K, V, P>, predicate: Pr) -> Self {
        let root = index.page();
        Self {
            index,
            predicate,
            pending: vec![root],
            matches: Vec::new().into_iter(),
            seen: HashSet::from([root]),
        }
    }

    /// The predicate, with whatever state it accumulated.
    pub fn predicate(&self) -> &Pr {
        &self.predicate
    }

    fn fail(&mut self, error: Error) -> Option<Result<(K, V)>> {
        self.pending.clear();
        Some(Err(error))
    }
}

impl<K, V, P, Pr> Iterator for PredicateIter<'_, '_, K, V, P, Pr>
where
    K: Clone,
    V: Clone,
    P: Paged + ?Sized,
    Pr: Predicate<K>,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.matches.next() {
                return Some(Ok(entry));
            }
            if self.predicate.is_satiated() {
                self.pending.clear();
                return None;
            }
            let page = self.pending.pop()?;
            let node = match self.index.store.load(page) {
                Ok(node) => node,
                Err(e) => return self.fail(e),
            };

            let index = self.index;
            let comparator = &*index.comparator;
            let keys = &node.data.keys;
            match &node.data.payload {
                Payload::Branch { children } => {
                    // Reversed so the leftmost child is popped first.
                    for idx in (0..children.len()).rev() {
                        let first = idx.checked_sub(1).map(|i| &keys[i]);
                        let second = keys.get(idx);
                        if !self
                            .predicate
                            .is_interested_in_keys_between(first, second, comparator)
                        {
                            continue;
                        }
                        if !self.seen.insert(children[idx]) {
                            return self.fail(Error::CycleDetected(children[idx]));
                        }
                        self.pending.push(children[idx]);
                    }
                }
                Payload::Leaf { values, .. } => {
                    let mut matches = Vec::new();
                    for (key, value) in keys.iter().zip(values) {
                        if self.predicate.is_satiated() {
                            break;
                        }
                        if self.predicate.is_interested_in_key(key, comparator) {
                            matches.push((key.clone(), value.clone()));
                        }
                    }
                    self.matches = matches.into_iter();
                }
            }
        }
    }
}
