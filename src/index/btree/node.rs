//! B+tree nodes and how they are persisted.
//!
//! # Node Layout
//! ```text
//! ┌──────────┬──────────────┬──────────┬───────────────────────────────┐
//! │ magic    │ key count    │ keys     │ branch: children i32 × (n+1)  │
//! │ "bb"/"bl"│ i16 (BE)     │ codec    │ leaf:   values × n, next i32  │
//! └──────────┴──────────────┴──────────┴───────────────────────────────┘
//! ```
//!
//! # Encodings
//! - **Deferred**: every node is written through an extent chain. Its
//!   encoded size is computed from the codecs first, so an oversized node is
//!   rejected without writing anything.
//! - **Immediate**: branches are written raw into exactly one page and never
//!   overflow. Leaves go through an extent chain and are rejected when
//!   they would spill past their page without being allowed to.
//!
//! A node is fully encoded before its page is touched, and the pages its
//! previous contents linked are only freed after the new contents are
//! written. A codec error or `OutOfSpace` leaves the old node readable.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::common::config::EXTENT_MAGIC;
use crate::common::{Error, PageId, Result};
use crate::index::btree::data::{Data, Payload};
use crate::index::Codec;
use crate::storage::extent::EXTENT_HEADER_SIZE;
use crate::storage::{store_bytes, Paged, PagedAccessor};

const BRANCH_MAGIC: &[u8; 2] = b"bb";
const LEAF_MAGIC: &[u8; 2] = b"bl";

/// A node loaded from `page`.
#[derive(Debug, Clone)]
pub struct Node<K, V> {
    pub page: PageId,
    pub data: Data<K, V>,
    /// The page currently holds an extent header, possibly with linked
    /// pages that must be freed before the page is rewritten.
    pub stored_in_extent: bool,
}

impl<K, V> Node<K, V> {
    /// A node that has never been written.
    pub fn new(page: PageId, data: Data<K, V>) -> Self {
        Self {
            page,
            data,
            stored_in_extent: false,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.data.is_branch()
    }

    /// Swap in edited contents.
    pub fn update(&mut self, f: impl FnOnce(Data<K, V>) -> Data<K, V>) {
        let data = std::mem::take(&mut self.data);
        self.data = f(data);
    }
}

/// How nodes of one index are written, chosen once when the index is
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Deferred,
    Immediate,
}

/// Encodes whole [`Data`] values, usable as a [`PagedAccessor`].
pub struct DataAccessor<K, V> {
    key_codec: Arc<dyn Codec<K>>,
    value_codec: Arc<dyn Codec<V>>,
}

impl<K, V> Clone for DataAccessor<K, V> {
    fn clone(&self) -> Self {
        Self {
            key_codec: Arc::clone(&self.key_codec),
            value_codec: Arc::clone(&self.value_codec),
        }
    }
}

impl<K, V> DataAccessor<K, V> {
    pub fn new(key_codec: Arc<dyn Codec<K>>, value_codec: Arc<dyn Codec<V>>) -> Self {
        Self {
            key_codec,
            value_codec,
        }
    }

    /// Whether both codecs can report sizes without encoding.
    pub fn sizes_known(&self) -> bool {
        (self.key_codec.fixed_size().is_some() || self.key_codec.is_estimated_size_supported())
            && (self.value_codec.fixed_size().is_some()
                || self.value_codec.is_estimated_size_supported())
    }

    /// Encoded size of `data`, not counting any extent header.
    pub fn estimated_size(&self, data: &Data<K, V>) -> usize {
        // magic + key count
        let mut size = 4;
        size += match self.key_codec.fixed_size() {
            Some(fixed) => fixed * data.keys.len(),
            None => data.keys.iter().map(|k| self.key_codec.estimated_size(k)).sum(),
        };
        match &data.payload {
            Payload::Branch { children } => size += 4 * children.len(),
            Payload::Leaf { values, .. } => {
                size += match self.value_codec.fixed_size() {
                    Some(fixed) => fixed * values.len(),
                    None => values.iter().map(|v| self.value_codec.estimated_size(v)).sum(),
                };
                size += 4;
            }
        }
        size
    }

    pub fn write_data(&self, out: &mut dyn Write, data: &Data<K, V>) -> Result<()> {
        let count = i16::try_from(data.keys.len()).map_err(|_| {
            Error::invalid_argument(format!("node of {} keys is too large", data.keys.len()))
        })?;
        out.write_all(if data.is_branch() {
            BRANCH_MAGIC
        } else {
            LEAF_MAGIC
        })?;
        out.write_all(&count.to_be_bytes())?;
        for key in &data.keys {
            self.key_codec.encode(key, out)?;
        }
        match &data.payload {
            Payload::Branch { children } => {
                for child in children {
                    out.write_all(&child.to_raw().to_be_bytes())?;
                }
            }
            Payload::Leaf { values, next } => {
                for value in values {
                    self.value_codec.encode(value, out)?;
                }
                out.write_all(&next.to_raw().to_be_bytes())?;
            }
        }
        Ok(())
    }

    /// Decode a node. Input that ends before the node does is reported as
    /// corruption.
    pub fn read_data(&self, input: &mut dyn Read) -> Result<Data<K, V>> {
        self.read_payload(input)
            .map_err(|e| e.eof_as_corruption("btree node"))
    }

    fn read_payload(&self, input: &mut dyn Read) -> Result<Data<K, V>> {
        let mut magic = [0u8; 2];
        input.read_exact(&mut magic)?;
        let branch = match &magic {
            BRANCH_MAGIC => true,
            LEAF_MAGIC => false,
            _ => {
                return Err(Error::corruption(
                    "page did not contain the expected btree headers",
                ))
            }
        };

        let count = read_i16(input)?;
        if count < 0 {
            return Err(Error::corruption(format!("negative key count {count}")));
        }
        let count = count as usize;

        let keys = (0..count)
            .map(|_| self.key_codec.decode(input))
            .collect::<Result<Vec<_>>>()?;

        if branch {
            let children = (0..=count)
                .map(|_| read_i32(input).map(PageId::from_raw))
                .collect::<Result<Vec<_>>>()?;
            Ok(Data::branch(keys, children))
        } else {
            let values = (0..count)
                .map(|_| self.value_codec.decode(input))
                .collect::<Result<Vec<_>>>()?;
            let next = PageId::from_raw(read_i32(input)?);
            Ok(Data::leaf(keys, values, next))
        }
    }
}

impl<K, V> PagedAccessor for DataAccessor<K, V> {
    type Value = Data<K, V>;

    fn encode(&self, out: &mut dyn Write, value: &Data<K, V>) -> Result<()> {
        self.write_data(out, value)
    }

    fn decode(&self, input: &mut dyn Read) -> Result<Data<K, V>> {
        self.read_data(input)
    }

}

fn read_i16(input: &mut dyn Read) -> Result<i16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

fn read_i32(input: &mut dyn Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

// ============================================================================
// Node persistence
// ============================================================================

/// Loads, stores and frees the nodes of one index.
pub struct NodeStore<'a, K, V, P: Paged + ?Sized> {
    paged: &'a P,
    accessor: DataAccessor<K, V>,
    encoding: Encoding,
    overflow_key_limit: usize,
}

impl<'a, K, V, P: Paged + ?Sized> NodeStore<'a, K, V, P> {
    pub fn new(
        paged: &'a P,
        accessor: DataAccessor<K, V>,
        encoding: Encoding,
        overflow_key_limit: usize,
    ) -> Self {
        Self {
            paged,
            accessor,
            encoding,
            overflow_key_limit,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Reject a key that could never fit in a three-key branch, before
    /// anything is written. Only checked where branches may not overflow.
    pub fn check_key(&self, key: &K) -> Result<()> {
        if !self.accessor.sizes_known() {
            return Ok(());
        }
        let header = match self.encoding {
            Encoding::Deferred if self.overflow_key_limit > 3 => return Ok(()),
            Encoding::Deferred => EXTENT_HEADER_SIZE,
            Encoding::Immediate => 0,
        };
        let key_size = self
            .accessor
            .key_codec
            .fixed_size()
            .unwrap_or_else(|| self.accessor.key_codec.estimated_size(key));
        // magic + count + 3 keys + 4 children
        let branch = header + 4 + 3 * key_size + 16;
        if branch > self.paged.page_size() {
            return Err(Error::invalid_argument(format!(
                "key of {} bytes is too large for a {} byte page",
                key_size,
                self.paged.page_size()
            )));
        }
        Ok(())
    }

    /// Reject an entry whose key or value the codecs refuse to encode,
    /// before any node is touched.
    pub fn check_entry(&self, key: &K, value: &V) -> Result<()> {
        self.check_key(key)?;
        self.accessor.key_codec.encode(key, &mut io::sink())?;
        self.accessor.value_codec.encode(value, &mut io::sink())
    }

    /// A node may spill past one page only while it holds few keys.
    fn allows_overflow(&self, node: &Node<K, V>) -> bool {
        node.data.keys.len() < self.overflow_key_limit
    }

    /// Allocate a page for a new node.
    pub fn alloc(&self) -> Result<PageId> {
        self.paged.allocator().alloc(1)
    }

    /// Write `node` to its page.
    ///
    /// Returns `Ok(false)` when the node does not fit and must be split. In
    /// that case nothing of the new contents is left on disk.
    pub fn store(&self, node: &mut Node<K, V>) -> Result<bool> {
        match self.encoding {
            Encoding::Deferred => self.store_deferred(node),
            Encoding::Immediate => self.store_immediate(node),
        }
    }

    fn store_deferred(&self, node: &mut Node<K, V>) -> Result<bool> {
        let size = self.accessor.estimated_size(&node.data) + EXTENT_HEADER_SIZE;
        if !self.allows_overflow(node) && size > self.paged.page_size() {
            tracing::trace!(page = node.page.0, size, "node too big for its page");
            return Ok(false);
        }
        let bytes = self.encode(node)?;
        self.write_extent(node, &bytes)?;
        tracing::trace!(page = node.page.0, size, "stored node");
        Ok(true)
    }

    fn store_immediate(&self, node: &mut Node<K, V>) -> Result<bool> {
        if node.is_branch() {
            let mut page = vec![0u8; self.paged.page_size()];
            let mut cursor: &mut [u8] = &mut page;
            match self.accessor.write_data(&mut cursor, &node.data) {
                Ok(()) => {}
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::WriteZero => {
                    tracing::trace!(page = node.page.0, "branch does not fit its page");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
            let stale = self.linked_pages(node)?;
            self.paged.write(node.page, &page)?;
            self.free_pages(node, &stale);
            node.stored_in_extent = false;
            tracing::trace!(page = node.page.0, "stored branch");
            return Ok(true);
        }

        let bytes = self.encode(node)?;
        if !self.allows_overflow(node) && bytes.len() + EXTENT_HEADER_SIZE > self.paged.page_size()
        {
            tracing::debug!(
                page = node.page.0,
                size = bytes.len(),
                "leaf would spill into linked pages"
            );
            return Ok(false);
        }
        let linked = self.write_extent(node, &bytes)?;
        tracing::trace!(page = node.page.0, linked, "stored leaf");
        Ok(true)
    }

    fn encode(&self, node: &Node<K, V>) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.accessor.write_data(&mut bytes, &node.data)?;
        Ok(bytes)
    }

    /// Write `bytes` as the extent chain at `node.page`. The pages the old
    /// chain linked are freed only once the new one is in place. Returns
    /// the number of linked pages now in use.
    fn write_extent(&self, node: &mut Node<K, V>, bytes: &[u8]) -> Result<usize> {
        let stale = self.linked_pages(node)?;
        let linked = store_bytes(self.paged, node.page, bytes)?;
        self.free_pages(node, &stale);
        node.stored_in_extent = true;
        Ok(linked.len())
    }

    /// Pages linked off `node`'s current extent, if it has one.
    fn linked_pages(&self, node: &Node<K, V>) -> Result<Vec<PageId>> {
        if node.stored_in_extent {
            self.accessor.pages_linked(self.paged, node.page)
        } else {
            Ok(Vec::new())
        }
    }

    fn free_pages(&self, node: &Node<K, V>, pages: &[PageId]) {
        for &page in pages {
            self.paged.free(page);
        }
        if !pages.is_empty() {
            tracing::trace!(page = node.page.0, freed = pages.len(), "freed linked pages");
        }
    }

    /// Free the pages linked off `node`'s extent, if it has one.
    fn release_linked(&self, node: &mut Node<K, V>) -> Result<()> {
        if node.stored_in_extent {
            let freed = self.paged.clear(&self.accessor, node.page)?;
            if !freed.is_empty() {
                tracing::trace!(page = node.page.0, freed = freed.len(), "freed linked pages");
            }
            node.stored_in_extent = false;
        }
        Ok(())
    }

    pub fn load(&self, page: PageId) -> Result<Node<K, V>> {
        match self.encoding {
            Encoding::Deferred => {
                let data = self.paged.get(&self.accessor, page)?;
                Ok(Node {
                    page,
                    data,
                    stored_in_extent: true,
                })
            }
            Encoding::Immediate => {
                let mut buf = vec![0u8; self.paged.page_size()];
                self.paged.read(page, &mut buf)?;
                if buf.starts_with(EXTENT_MAGIC) {
                    let data = self.paged.get(&self.accessor, page)?;
                    Ok(Node {
                        page,
                        data,
                        stored_in_extent: true,
                    })
                } else {
                    let data = self.accessor.read_data(&mut buf.as_slice())?;
                    Ok(Node::new(page, data))
                }
            }
        }
    }

    /// Release `node`'s page and everything linked off it.
    pub fn free(&self, mut node: Node<K, V>) -> Result<()> {
        self.release_linked(&mut node)?;
        tracing::trace!(page = node.page.0, "freeing node page");
        self.paged.free(node.page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{StringCodec, U32Codec};
    use crate::storage::MemoryPaged;

    fn accessor() -> DataAccessor<u32, String> {
        DataAccessor::new(Arc::new(U32Codec), Arc::new(StringCodec))
    }

    #[test]
    fn test_leaf_layout() {
        let data = Data::leaf(vec![1u32], vec!["ab".to_string()], PageId::INVALID);
        let mut out = Vec::new();
        accessor().write_data(&mut out, &data).unwrap();
        assert_eq!(
            out,
            vec![b'b', b'l', 0, 1, 0, 0, 0, 1, 0, 2, b'a', b'b', 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(accessor().estimated_size(&data), out.len());
        assert_eq!(accessor().read_data(&mut out.as_slice()).unwrap(), data);
    }

    #[test]
    fn test_branch_layout() {
        let data: Data<u32, String> = Data::branch(vec![5], vec![PageId::new(1), PageId::new(2)]);
        let mut out = Vec::new();
        accessor().write_data(&mut out, &data).unwrap();
        assert_eq!(out, vec![b'b', b'b', 0, 1, 0, 0, 0, 5, 0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(accessor().estimated_size(&data), out.len());
        assert_eq!(accessor().read_data(&mut out.as_slice()).unwrap(), data);
    }

    #[test]
    fn test_bad_node_magic() {
        let bytes = [b'z', b'z', 0, 0];
        let err = accessor().read_data(&mut &bytes[..]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_immediate_branch_overflow_reported() {
        let paged = MemoryPaged::new(32, 8).unwrap();
        let store = NodeStore::new(&paged, accessor(), Encoding::Immediate, 4);

        let keys: Vec<u32> = (0..4).collect();
        let children = (0..5).map(PageId::new).collect();
        let mut node = Node::new(PageId::new(0), Data::branch(keys, children));
        // 4 + 16 + 20 = 40 bytes > 32.
        assert!(!store.store(&mut node).unwrap());

        node.update(|d| Data::branch(d.keys[..1].to_vec(), d.children()[..2].to_vec()));
        assert!(store.store(&mut node).unwrap());
        assert!(!node.stored_in_extent);

        let loaded = store.load(PageId::new(0)).unwrap();
        assert_eq!(loaded.data, node.data);
        assert!(!loaded.stored_in_extent);
    }

    #[test]
    fn test_deferred_rejects_without_writing() {
        let paged = MemoryPaged::new(32, 8).unwrap();
        let store = NodeStore::new(&paged, accessor(), Encoding::Deferred, 4);

        let page = store.alloc().unwrap();

        let keys: Vec<u32> = (0..4).collect();
        let values = keys.iter().map(|k| k.to_string()).collect();
        let mut node = Node::new(page, Data::leaf(keys, values, PageId::INVALID));
        assert!(!store.store(&mut node).unwrap());
        assert_eq!(paged.snapshot(), vec![0u8; 32 * 8]);

        // Three keys may overflow into linked pages.
        node.update(|d| {
            let (d, _) = d.without_entry(3);
            d
        });
        assert!(store.store(&mut node).unwrap());
        assert_eq!(store.load(page).unwrap().data, node.data);
    }

    #[test]
    fn test_truncated_extent_is_corruption() {
        let paged = MemoryPaged::new(64, 8).unwrap();
        let store = NodeStore::new(&paged, accessor(), Encoding::Deferred, 4);
        let page = store.alloc().unwrap();

        let data = Data::leaf(vec![1u32, 2], vec!["ab".into(), "cd".into()], PageId::INVALID);
        let mut node = Node::new(page, data);
        assert!(store.store(&mut node).unwrap());

        // Cut the extent length to the header plus magic, count and one key.
        let mut buf = vec![0u8; 64];
        paged.read(page, &mut buf).unwrap();
        buf[1..5].copy_from_slice(&(EXTENT_HEADER_SIZE as i32 + 8).to_be_bytes());
        paged.write(page, &buf).unwrap();

        let err = store.load(page).unwrap_err();
        assert!(err.is_corruption(), "{err:?}");
    }

    #[test]
    fn test_failed_rewrite_keeps_old_node() {
        let paged = MemoryPaged::new(32, 4).unwrap();
        let store = NodeStore::new(&paged, accessor(), Encoding::Immediate, 4);
        let page = store.alloc().unwrap();

        let mut node = Node::new(page, Data::leaf(vec![1], vec!["x".repeat(40)], PageId::INVALID));
        assert!(store.store(&mut node).unwrap());
        let linked = paged.allocator().limit() as usize - 1 - paged.allocator().free_page_count();
        assert!(linked > 0);

        // Fill the rest so the continuation cannot be allocated.
        let rest = paged.allocator().free_page_count();
        paged.allocator().alloc(rest).unwrap();

        let old = node.data.clone();
        node.update(|_| Data::leaf(vec![1], vec!["y".repeat(80)], PageId::INVALID));
        assert!(matches!(store.store(&mut node), Err(Error::OutOfSpace { .. })));

        assert_eq!(store.load(page).unwrap().data, old);
        assert_eq!(paged.allocator().free_page_count(), 0);
        assert!(paged.allocator().is_allocated(PageId::new(1)));
    }

    #[test]
    fn test_free_releases_linked_pages() {
        let paged = MemoryPaged::new(32, 16).unwrap();
        let store = NodeStore::new(&paged, accessor(), Encoding::Immediate, 4);
        let page = store.alloc().unwrap();

        let big = "x".repeat(60);
        let mut node = Node::new(page, Data::leaf(vec![1], vec![big], PageId::INVALID));
        assert!(store.store(&mut node).unwrap());
        assert!(paged.allocator().free_page_count() < 15);

        store.free(node).unwrap();
        assert_eq!(paged.allocator().free_page_count(), 16);
    }
}
