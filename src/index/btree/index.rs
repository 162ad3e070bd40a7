//! The B+tree index.
//!
//! # Structure
//! ```text
//!                  ┌───────────────────┐
//!                  │ root @ page (fixed)│   branch: keys + children
//!                  └─────────┬─────────┘
//!            ┌───────────────┼───────────────┐
//!            ▼               ▼               ▼
//!       ┌─────────┐     ┌─────────┐     ┌─────────┐
//!       │  leaf   │────▶│  leaf   │────▶│  leaf   │────▶ INVALID
//!       └─────────┘next └─────────┘next └─────────┘
//! ```
//!
//! The root never moves: when it splits, both halves move to freshly
//! allocated pages and the root page is rewritten as their parent. When a
//! root branch is left with a single child, that child's contents are
//! pulled back up into the root page.
//!
//! A separator `k` at position `i` of a branch routes keys `< k` to child
//! `i` and keys `>= k` to child `i + 1`.
//!
//! # Thread Safety
//! An index does no locking of its own. Callers must serialise every
//! mutation of one index against all other access to it.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use crate::common::{Error, PageId, Result};
use crate::index::btree::data::{Data, Payload};
use crate::index::btree::iter::{BTreeIter, PredicateIter};
use crate::index::btree::node::{DataAccessor, Encoding, Node, NodeStore};
use crate::index::{Comparator, IndexVisitor, Predicate, Prefixer};
use crate::storage::Paged;

/// Separator keys and new right-hand pages produced by a split, in order.
type Promotions<K> = Vec<(K, PageId)>;

/// A persistent ordered map of `K` to `V` rooted at a fixed page.
///
/// Built by [`BTreeIndexFactory`](crate::index::BTreeIndexFactory).
pub struct BTreeIndex<'a, K, V, P: Paged + ?Sized> {
    pub(crate) store: NodeStore<'a, K, V, P>,
    page: PageId,
    pub(crate) comparator: Arc<dyn Comparator<K>>,
    prefixer: Option<Arc<dyn Prefixer<K>>>,
}

impl<'a, K, V, P> BTreeIndex<'a, K, V, P>
where
    K: Clone,
    V: Clone,
    P: Paged + ?Sized,
{
    pub(crate) fn new(
        paged: &'a P,
        page: PageId,
        accessor: DataAccessor<K, V>,
        encoding: Encoding,
        overflow_key_limit: usize,
        comparator: Arc<dyn Comparator<K>>,
        prefixer: Option<Arc<dyn Prefixer<K>>>,
    ) -> Self {
        Self {
            store: NodeStore::new(paged, accessor, encoding, overflow_key_limit),
            page,
            comparator,
            prefixer,
        }
    }

    /// Page holding the root; pass it to
    /// [`BTreeIndexFactory::open`](crate::index::BTreeIndexFactory::open)
    /// to reach this index again.
    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn encoding(&self) -> Encoding {
        self.store.encoding()
    }

    /// Write an empty leaf as the root.
    pub(crate) fn create(&self) -> Result<()> {
        let mut root = Node::new(self.page, Data::default());
        self.persist(&mut root, true)?;
        tracing::debug!(page = self.page.0, "created index");
        Ok(())
    }

    pub(crate) fn root(&self) -> Result<Node<K, V>> {
        self.store.load(self.page)
    }

    fn search(&self, keys: &[K], key: &K) -> std::result::Result<usize, usize> {
        keys.binary_search_by(|probe| self.comparator.compare(probe, key))
    }

    /// Index of the child of a branch with `keys` that may hold `key`.
    pub(crate) fn child_index(&self, keys: &[K], key: &K) -> usize {
        match self.search(keys, key) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Load child `idx` of `node`, refusing pages already on `path`.
    fn load_child(&self, node: &Node<K, V>, idx: usize, path: &[PageId]) -> Result<Node<K, V>> {
        let page = node.data.child(idx).ok_or_else(|| {
            Error::corruption(format!("branch at {} has no child {}", node.page, idx))
        })?;
        if path.contains(&page) {
            return Err(Error::CycleDetected(page));
        }
        self.store.load(page)
    }

    /// The leaf whose key range holds `key`.
    pub(crate) fn find_leaf(&self, key: &K) -> Result<Node<K, V>> {
        let mut node = self.root()?;
        let mut path = vec![self.page];
        while node.is_branch() {
            let idx = self.child_index(&node.data.keys, key);
            node = self.load_child(&node, idx, &path)?;
            path.push(node.page);
        }
        Ok(node)
    }

    /// Leftmost (`rightmost == false`) or rightmost leaf below `page`.
    fn edge_leaf(&self, page: PageId, path: &[PageId], rightmost: bool) -> Result<Node<K, V>> {
        let mut seen = Vec::new();
        let mut page = page;
        loop {
            if path.contains(&page) || seen.contains(&page) {
                return Err(Error::CycleDetected(page));
            }
            seen.push(page);
            let node = self.store.load(page)?;
            let children = node.data.children();
            let next = if rightmost {
                children.last()
            } else {
                children.first()
            };
            match next {
                Some(&child) => page = child,
                None => return Ok(node),
            }
        }
    }

    pub(crate) fn first_leaf(&self) -> Result<Node<K, V>> {
        self.edge_leaf(self.page, &[], false)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let leaf = self.find_leaf(key)?;
        Ok(match self.search(&leaf.data.keys, key) {
            Ok(idx) => leaf.data.values().get(idx).cloned(),
            Err(_) => None,
        })
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let leaf = self.find_leaf(key)?;
        Ok(self.search(&leaf.data.keys, key).is_ok())
    }

    /// Whether the root holds no keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root()?.data.keys.is_empty())
    }

    /// Number of entries, counted along the leaf chain.
    pub fn size(&self) -> Result<usize> {
        let mut leaf = self.first_leaf()?;
        let mut seen = HashSet::from([leaf.page]);
        let mut count = leaf.data.keys.len();
        loop {
            let next = leaf.data.next();
            if !next.is_valid() {
                return Ok(count);
            }
            if !seen.insert(next) {
                return Err(Error::CycleDetected(next));
            }
            leaf = self.store.load(next)?;
            count += leaf.data.keys.len();
        }
    }

    /// Smallest entry.
    pub fn first(&self) -> Result<Option<(K, V)>> {
        self.iter()?.next().transpose()
    }

    /// Largest entry.
    pub fn last(&self) -> Result<Option<(K, V)>> {
        let leaf = self.edge_leaf(self.page, &[], true)?;
        Ok(leaf
            .data
            .keys
            .last()
            .cloned()
            .zip(leaf.data.values().last().cloned()))
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// All entries in key order.
    ///
    /// # Errors
    /// The first leaf is loaded eagerly; later load failures are yielded by
    /// the iterator, which then stops.
    pub fn iter(&self) -> Result<BTreeIter<'_, 'a, K, V, P>> {
        let leaf = self.first_leaf()?;
        Ok(BTreeIter::new(self, leaf, 0))
    }

    /// Entries with keys `>= key`, in key order.
    pub fn iter_from(&self, key: &K) -> Result<BTreeIter<'_, 'a, K, V, P>> {
        let leaf = self.find_leaf(key)?;
        let pos = match self.search(&leaf.data.keys, key) {
            Ok(idx) | Err(idx) => idx,
        };
        Ok(BTreeIter::new(self, leaf, pos))
    }

    /// Entries whose keys match `predicate`, in key order. Subtrees the
    /// predicate is not interested in are never loaded.
    pub fn iter_predicate<Pr: Predicate<K>>(
        &self,
        predicate: Pr,
    ) -> PredicateIter<'_, 'a, K, V, P, Pr> {
        PredicateIter::new(self, predicate)
    }

    /// Hand whole leaves to `visitor`, skipping subtrees it is not
    /// interested in, until it is satiated.
    pub fn visit<Vi>(&self, visitor: &mut Vi) -> Result<()>
    where
        Vi: IndexVisitor<K, V> + ?Sized,
    {
        let root = self.root()?;
        let mut path = vec![self.page];
        self.visit_node(&root, visitor, &mut path)
    }

    fn visit_node<Vi>(
        &self,
        node: &Node<K, V>,
        visitor: &mut Vi,
        path: &mut Vec<PageId>,
    ) -> Result<()>
    where
        Vi: IndexVisitor<K, V> + ?Sized,
    {
        let keys = &node.data.keys;
        match &node.data.payload {
            Payload::Leaf { values, .. } => {
                visitor.visit(keys, values, &*self.comparator);
            }
            Payload::Branch { children } => {
                for idx in 0..children.len() {
                    if visitor.is_satiated() {
                        break;
                    }
                    let first = idx.checked_sub(1).map(|i| &keys[i]);
                    let second = keys.get(idx);
                    if !visitor.is_interested_in_keys_between(first, second, &*self.comparator) {
                        continue;
                    }
                    let child = self.load_child(node, idx, path)?;
                    path.push(child.page);
                    self.visit_node(&child, visitor, path)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert or overwrite, returning the previous value.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the key can never fit in a node of
    /// this index's page size, or if a codec refuses the key or value. The
    /// tree is left untouched.
    ///
    /// # Example
    /// ```
    /// use pagetree::index::{BTreeIndexFactory, StringCodec, U32Codec};
    /// use pagetree::storage::MemoryPaged;
    ///
    /// let paged = MemoryPaged::new(512, 64).unwrap();
    /// let factory = BTreeIndexFactory::new(U32Codec, StringCodec);
    /// let index = factory.create(&paged).unwrap();
    ///
    /// assert_eq!(index.put(7, "seven".to_string()).unwrap(), None);
    /// assert_eq!(index.put(7, "SEVEN".to_string()).unwrap(), Some("seven".to_string()));
    /// assert_eq!(index.get(&7).unwrap(), Some("SEVEN".to_string()));
    /// ```
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.insert(key, value, true)
    }

    /// Insert only if `key` is absent. Returns the existing value otherwise,
    /// leaving it in place.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        self.insert(key, value, false)
    }

    fn insert(&self, key: K, value: V, overwrite: bool) -> Result<Option<V>> {
        self.store.check_entry(&key, &value)?;
        let mut root = self.root()?;
        let mut path = vec![self.page];
        let (previous, promotions) =
            self.insert_into(&mut root, key, value, overwrite, &mut path, true)?;
        debug_assert!(promotions.is_empty(), "root split must absorb promotions");
        Ok(previous)
    }

    fn insert_into(
        &self,
        node: &mut Node<K, V>,
        key: K,
        value: V,
        overwrite: bool,
        path: &mut Vec<PageId>,
        is_root: bool,
    ) -> Result<(Option<V>, Promotions<K>)> {
        if node.is_branch() {
            let idx = self.child_index(&node.data.keys, &key);
            let mut child = self.load_child(node, idx, path)?;
            path.push(child.page);
            let (previous, promotions) =
                self.insert_into(&mut child, key, value, overwrite, path, false)?;
            path.pop();

            if promotions.is_empty() {
                return Ok((previous, Vec::new()));
            }
            node.update(|data| data.with_promotions(idx, promotions));
            return Ok((previous, self.persist(node, is_root)?));
        }

        match self.search(&node.data.keys, &key) {
            Ok(idx) => {
                let previous = node.data.values().get(idx).cloned();
                if !overwrite {
                    return Ok((previous, Vec::new()));
                }
                node.update(|data| data.with_entry(idx, key, value, true));
                Ok((previous, self.persist(node, is_root)?))
            }
            Err(idx) => {
                node.update(|data| data.with_entry(idx, key, value, false));
                Ok((None, self.persist(node, is_root)?))
            }
        }
    }

    /// Store `node`, splitting it until every piece fits.
    ///
    /// A non-root node keeps the left half in place and returns the
    /// separators and pages of everything to its right for the parent to
    /// adopt. The root instead moves both halves out and becomes their
    /// parent, so it never returns promotions.
    fn persist(&self, node: &mut Node<K, V>, is_root: bool) -> Result<Promotions<K>> {
        if self.store.store(node)? {
            return Ok(Vec::new());
        }

        let keys = node.data.keys.len();
        let (mut left, separator, right) = self.split(std::mem::take(&mut node.data))?;

        if is_root {
            let left_page = self.store.alloc()?;
            let right_page = self.store.alloc()?;
            tracing::debug!(
                page = self.page.0,
                keys,
                left = left_page.0,
                right = right_page.0,
                "splitting root"
            );
            if left.is_leaf() {
                left = left.with_next(right_page);
            }
            let left_promotions = self.persist(&mut Node::new(left_page, left), false)?;
            let right_promotions = self.persist(&mut Node::new(right_page, right), false)?;

            let count = left_promotions.len() + right_promotions.len() + 1;
            let mut keys = Vec::with_capacity(count);
            let mut children = Vec::with_capacity(count + 1);
            children.push(left_page);
            for (key, page) in left_promotions {
                keys.push(key);
                children.push(page);
            }
            keys.push(separator);
            children.push(right_page);
            for (key, page) in right_promotions {
                keys.push(key);
                children.push(page);
            }
            node.data = Data::branch(keys, children);
            return self.persist(node, true);
        }

        let right_page = self.store.alloc()?;
        tracing::debug!(page = node.page.0, keys, right = right_page.0, "splitting node");
        if left.is_leaf() {
            left = left.with_next(right_page);
        }
        node.data = left;
        let mut promotions = self.persist(node, false)?;
        promotions.push((separator, right_page));
        promotions.extend(self.persist(&mut Node::new(right_page, right), false)?);
        Ok(promotions)
    }

    /// Split `data` at its middle key into `(left, separator, right)`.
    ///
    /// A branch gives its middle key up as the separator. A leaf keeps all
    /// its keys; the separator is the first right key, shortened by the
    /// prefixer if one is set. The left leaf's `next` is left for the
    /// caller to point at the right half.
    fn split(&self, data: Data<K, V>) -> Result<(Data<K, V>, K, Data<K, V>)> {
        let Data { mut keys, payload } = data;
        let count = keys.len();
        let pivot = count / 2;

        match payload {
            Payload::Branch { mut children } => {
                if count < 3 {
                    return Err(Error::invalid_argument(format!(
                        "branch of {count} keys does not fit in a page"
                    )));
                }
                let right_keys = keys.split_off(pivot + 1);
                let right_children = children.split_off(pivot + 1);
                let separator = keys.pop().ok_or_else(|| Error::corruption("empty branch split"))?;
                Ok((
                    Data::branch(keys, children),
                    separator,
                    Data::branch(right_keys, right_children),
                ))
            }
            Payload::Leaf { mut values, next } => {
                if count < 2 {
                    return Err(Error::invalid_argument(format!(
                        "leaf of {count} keys does not fit in a page"
                    )));
                }
                let right_keys = keys.split_off(pivot);
                let right_values = values.split_off(pivot);
                let separator = match (&self.prefixer, keys.last()) {
                    (Some(prefixer), Some(last)) => prefixer.simple_prefix(last, &right_keys[0]),
                    _ => right_keys[0].clone(),
                };
                Ok((
                    Data::leaf(keys, values, PageId::INVALID),
                    separator,
                    Data::leaf(right_keys, right_values, next),
                ))
            }
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove `key`, returning its value.
    ///
    /// Emptied leaves are unlinked from the leaf chain and freed; a branch
    /// left with a single child is replaced by that child.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let mut root = self.root()?;
        let mut path = vec![self.page];
        let mut left_peers = Vec::new();
        let (removed, promotions) =
            self.remove_from(&mut root, key, &mut path, &mut left_peers, true)?;
        debug_assert!(promotions.is_empty(), "root split must absorb promotions");
        Ok(removed)
    }

    /// `left_peers` holds, for every ancestor edge on the way down, the
    /// sibling subtree immediately to its left, if any.
    fn remove_from(
        &self,
        node: &mut Node<K, V>,
        key: &K,
        path: &mut Vec<PageId>,
        left_peers: &mut Vec<Option<PageId>>,
        is_root: bool,
    ) -> Result<(Option<V>, Promotions<K>)> {
        if !node.is_branch() {
            let Ok(idx) = self.search(&node.data.keys, key) else {
                return Ok((None, Vec::new()));
            };
            let mut removed = None;
            node.update(|data| {
                let (data, value) = data.without_entry(idx);
                removed = value;
                data
            });
            if node.data.keys.is_empty() && !is_root {
                // The parent unlinks and frees it.
                return Ok((removed, Vec::new()));
            }
            return Ok((removed, self.persist(node, is_root)?));
        }

        let idx = self.child_index(&node.data.keys, key);
        let mut child = self.load_child(node, idx, path)?;
        path.push(child.page);
        left_peers.push(idx.checked_sub(1).and_then(|i| node.data.child(i)));
        let result = self.remove_from(&mut child, key, path, left_peers, false);
        left_peers.pop();
        path.pop();
        let (removed, promotions) = result?;

        if !promotions.is_empty() {
            node.update(|data| data.with_promotions(idx, promotions));
            return Ok((removed, self.persist(node, is_root)?));
        }
        if !child.data.keys.is_empty() {
            return Ok((removed, Vec::new()));
        }

        if child.is_branch() {
            // Down to one child: splice the grandchild in.
            let grandchild = child.data.child(0).ok_or_else(|| {
                Error::corruption(format!("branch at {} has no children", child.page))
            })?;
            tracing::debug!(
                page = child.page.0,
                grandchild = grandchild.0,
                "dropping degenerate branch"
            );
            node.update(|data| data.with_child(idx, grandchild));
            self.store.free(child)?;
        } else {
            let previous = match idx {
                0 => match left_peers.iter().rev().find_map(|peer| *peer) {
                    Some(peer) => Some(self.edge_leaf(peer, path, true)?),
                    None => None,
                },
                _ => {
                    let peer = node.data.child(idx - 1).ok_or_else(|| {
                        Error::corruption(format!("branch at {} lost child {}", node.page, idx - 1))
                    })?;
                    Some(self.edge_leaf(peer, path, true)?)
                }
            };
            if let Some(mut previous) = previous {
                let next = child.data.next();
                previous.update(|data| data.with_next(next));
                if !self.store.store(&mut previous)? {
                    return Err(Error::corruption(format!(
                        "leaf at {} no longer fits its page",
                        previous.page
                    )));
                }
            }
            tracing::debug!(page = child.page.0, "freeing empty leaf");
            self.store.free(child)?;
            node.update(|data| data.without_child(idx));

            if is_root && node.data.children().len() == 1 {
                let mut only = self.load_child(node, 0, path)?;
                tracing::debug!(page = self.page.0, child = only.page.0, "collapsing root");
                node.data = std::mem::take(&mut only.data);
                self.store.free(only)?;
            }
        }

        Ok((removed, self.persist(node, is_root)?))
    }

    // ========================================================================
    // Whole-tree operations
    // ========================================================================

    /// Free every node but the root and reset the root to an empty leaf.
    pub fn clear(&self) -> Result<()> {
        let mut root = self.root()?;
        let mut path = vec![self.page];
        self.free_children(&root, &mut path)?;
        root.data = Data::default();
        self.persist(&mut root, true)?;
        tracing::debug!(page = self.page.0, "cleared index");
        Ok(())
    }

    /// Free every page of the index, the root included.
    pub fn destroy(self) -> Result<()> {
        self.clear()?;
        let root = self.root()?;
        self.store.free(root)?;
        tracing::debug!(page = self.page.0, "destroyed index");
        Ok(())
    }

    fn free_children(&self, node: &Node<K, V>, path: &mut Vec<PageId>) -> Result<()> {
        for idx in 0..node.data.children().len() {
            let child = self.load_child(node, idx, path)?;
            path.push(child.page);
            self.free_children(&child, path)?;
            path.pop();
            self.store.free(child)?;
        }
        Ok(())
    }

    /// Depth of the shallowest leaf; a lone root leaf has depth 1.
    pub fn min_leaf_depth(&self) -> Result<usize> {
        self.leaf_depth(false)
    }

    /// Depth of the deepest leaf. Equal to
    /// [`min_leaf_depth`](Self::min_leaf_depth) in a well-formed tree.
    pub fn max_leaf_depth(&self) -> Result<usize> {
        self.leaf_depth(true)
    }

    fn leaf_depth(&self, deepest: bool) -> Result<usize> {
        let root = self.root()?;
        let mut path = vec![self.page];
        self.depth_below(&root, deepest, &mut path)
    }

    fn depth_below(
        &self,
        node: &Node<K, V>,
        deepest: bool,
        path: &mut Vec<PageId>,
    ) -> Result<usize> {
        let mut depth: Option<usize> = None;
        for idx in 0..node.data.children().len() {
            let child = self.load_child(node, idx, path)?;
            path.push(child.page);
            let below = self.depth_below(&child, deepest, path)?;
            path.pop();
            depth = Some(match depth {
                Some(d) if deepest => d.max(below),
                Some(d) => d.min(below),
                None => below,
            });
        }
        Ok(depth.unwrap_or(0) + 1)
    }

    /// Write an indented outline of every node and key.
    ///
    /// ```text
    /// branch @ 0 contains 1 keys
    /// |-+ leaf @ 1 contains 2 keys
    /// |   : 1
    /// |   : 2
    /// : 3
    /// \-+ leaf @ 2 contains 1 keys
    ///     : 3
    /// ```
    pub fn print_structure(&self, out: &mut dyn io::Write) -> Result<()>
    where
        K: Debug,
    {
        let root = self.root()?;
        let mut path = vec![self.page];
        self.print_node(&root, out, "", "", &mut path)
    }

    fn print_node(
        &self,
        node: &Node<K, V>,
        out: &mut dyn io::Write,
        first: &str,
        prefix: &str,
        path: &mut Vec<PageId>,
    ) -> Result<()>
    where
        K: Debug,
    {
        let kind = if node.is_branch() { "branch" } else { "leaf" };
        let keys = &node.data.keys;
        writeln!(out, "{first}{kind} @ {} contains {} keys", node.page.0, keys.len())?;

        if !node.is_branch() {
            for key in keys {
                writeln!(out, "{prefix}: {key:?}")?;
            }
            return Ok(());
        }

        for idx in 0..node.data.children().len() {
            let child = self.load_child(node, idx, path)?;
            path.push(child.page);
            if idx < keys.len() {
                self.print_node(
                    &child,
                    out,
                    &format!("{prefix}|-+ "),
                    &format!("{prefix}|   "),
                    path,
                )?;
                writeln!(out, "{prefix}: {:?}", keys[idx])?;
            } else {
                self.print_node(
                    &child,
                    out,
                    &format!("{prefix}\\-+ "),
                    &format!("{prefix}    "),
                    path,
                )?;
            }
            path.pop();
        }
        Ok(())
    }

    /// Check the structural invariants of the whole tree.
    ///
    /// # Errors
    /// [`Error::Corruption`] describing the first violation found: keys out
    /// of order or outside their separators' range, child counts that do
    /// not match key counts, empty non-root nodes, or a leaf chain that
    /// does not visit the leaves in key order.
    pub fn verify(&self) -> Result<()> {
        let root = self.root()?;
        let mut path = vec![self.page];
        let mut leaves = Vec::new();
        self.verify_node(&root, None, None, &mut path, &mut leaves)?;

        let mut chain = Vec::with_capacity(leaves.len());
        let mut page = leaves.first().copied().unwrap_or(PageId::INVALID);
        while page.is_valid() {
            if chain.contains(&page) || chain.len() > leaves.len() {
                return Err(Error::CycleDetected(page));
            }
            chain.push(page);
            page = self.store.load(page)?.data.next();
        }
        if chain != leaves {
            return Err(Error::corruption(format!(
                "leaf chain {chain:?} does not match leaf order {leaves:?}"
            )));
        }
        Ok(())
    }

    fn verify_node(
        &self,
        node: &Node<K, V>,
        low: Option<&K>,
        high: Option<&K>,
        path: &mut Vec<PageId>,
        leaves: &mut Vec<PageId>,
    ) -> Result<()> {
        let keys = &node.data.keys;
        let is_root = node.page == self.page;

        if keys.is_empty() && (node.is_branch() || !is_root) {
            return Err(Error::corruption(format!("node at {} holds no keys", node.page)));
        }
        if keys
            .windows(2)
            .any(|pair| self.comparator.compare(&pair[0], &pair[1]) != Ordering::Less)
        {
            return Err(Error::corruption(format!("keys at {} are out of order", node.page)));
        }
        let below_low =
            |key: &K| low.is_some_and(|low| self.comparator.compare(key, low) == Ordering::Less);
        let above_high =
            |key: &K| high.is_some_and(|high| self.comparator.compare(key, high) != Ordering::Less);
        if keys.iter().any(|key| below_low(key) || above_high(key)) {
            return Err(Error::corruption(format!(
                "keys at {} fall outside their parent's range",
                node.page
            )));
        }

        match &node.data.payload {
            Payload::Leaf { values, .. } => {
                if values.len() != keys.len() {
                    return Err(Error::corruption(format!(
                        "leaf at {} has {} keys but {} values",
                        node.page,
                        keys.len(),
                        values.len()
                    )));
                }
                leaves.push(node.page);
            }
            Payload::Branch { children } => {
                if children.len() != keys.len() + 1 {
                    return Err(Error::corruption(format!(
                        "branch at {} has {} keys but {} children",
                        node.page,
                        keys.len(),
                        children.len()
                    )));
                }
                for idx in 0..children.len() {
                    let child = self.load_child(node, idx, path)?;
                    let child_low = idx.checked_sub(1).map(|i| &keys[i]).or(low);
                    let child_high = keys.get(idx).or(high);
                    path.push(child.page);
                    self.verify_node(&child, child_low, child_high, path, leaves)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::index::{BTreeIndexFactory, StringCodec, U32Codec};
    use crate::storage::{MemoryPaged, Paged};

    fn factory() -> BTreeIndexFactory<u32, String> {
        BTreeIndexFactory::new(U32Codec, StringCodec)
    }

    #[test]
    fn test_empty_index() {
        let paged = MemoryPaged::new(128, 64).unwrap();
        let index = factory().create(&paged).unwrap();

        assert!(index.is_empty().unwrap());
        assert_eq!(index.size().unwrap(), 0);
        assert_eq!(index.get(&1).unwrap(), None);
        assert_eq!(index.first().unwrap(), None);
        assert_eq!(index.last().unwrap(), None);
        assert_eq!(index.remove(&1).unwrap(), None);
        assert_eq!(index.min_leaf_depth().unwrap(), 1);
        index.verify().unwrap();
    }

    #[test]
    fn test_root_split_keeps_root_page() {
        let paged = MemoryPaged::new(64, 256).unwrap();
        let index = factory().create(&paged).unwrap();
        let root = index.page();

        for key in 0..50u32 {
            index.put(key, format!("v{key}")).unwrap();
        }

        assert_eq!(index.page(), root);
        assert!(index.root().unwrap().is_branch());
        assert!(index.min_leaf_depth().unwrap() > 1);
        assert_eq!(index.min_leaf_depth().unwrap(), index.max_leaf_depth().unwrap());
        assert_eq!(index.size().unwrap(), 50);
        index.verify().unwrap();
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        let paged = MemoryPaged::new(128, 64).unwrap();
        let index = factory().create(&paged).unwrap();

        assert_eq!(index.put_if_absent(1, "a".into()).unwrap(), None);
        assert_eq!(index.put_if_absent(1, "b".into()).unwrap(), Some("a".into()));
        assert_eq!(index.get(&1).unwrap(), Some("a".into()));
    }

    #[test]
    fn test_remove_collapses_back_to_leaf() {
        let paged = MemoryPaged::new(64, 256).unwrap();
        let index = factory().create(&paged).unwrap();
        let free = paged.allocator().free_page_count();

        for key in 0..40u32 {
            index.put(key, key.to_string()).unwrap();
        }
        for key in 0..40u32 {
            assert_eq!(index.remove(&key).unwrap(), Some(key.to_string()));
            index.verify().unwrap();
        }

        assert!(index.is_empty().unwrap());
        assert!(!index.root().unwrap().is_branch());
        assert_eq!(paged.allocator().free_page_count(), free);
    }

    #[test]
    fn test_clear_and_destroy_release_pages() {
        let paged = MemoryPaged::new(64, 256).unwrap();
        let free = paged.allocator().free_page_count();
        let index = factory().create(&paged).unwrap();

        for key in 0..60u32 {
            index.put(key, key.to_string()).unwrap();
        }
        index.clear().unwrap();
        assert_eq!(index.size().unwrap(), 0);
        assert_eq!(paged.allocator().free_page_count(), free - 1);

        index.put(1, "one".into()).unwrap();
        index.destroy().unwrap();
        assert_eq!(paged.allocator().free_page_count(), free);
    }

    #[test]
    fn test_print_structure() {
        let paged = MemoryPaged::new(64, 64).unwrap();
        let index = factory().create(&paged).unwrap();
        index.put(1, "a".into()).unwrap();
        index.put(2, "b".into()).unwrap();

        let mut out = Vec::new();
        index.print_structure(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("leaf @ {} contains 2 keys\n: 1\n: 2\n", index.page().0));
    }
}
