//! Builds and reopens [`BTreeIndex`] instances.

use std::sync::Arc;

use crate::common::config::DEFAULT_OVERFLOW_KEY_LIMIT;
use crate::common::{PageId, Result};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::node::{DataAccessor, Encoding};
use crate::index::{Codec, Comparator, NaturalOrder, Prefixer};
use crate::storage::Paged;

/// Everything needed to interpret the pages of one kind of index.
///
/// The same factory settings must be used to reopen an index as were used
/// to create it; none of them are recorded on disk.
///
/// # Example
/// ```
/// use pagetree::index::{BTreeIndexFactory, StringCodec, StringPrefixer};
/// use pagetree::storage::MemoryPaged;
///
/// let paged = MemoryPaged::new(1024, 128).unwrap();
/// let factory = BTreeIndexFactory::new(StringCodec, StringCodec)
///     .prefixer(StringPrefixer)
///     .overflow_key_limit(8);
///
/// let page = {
///     let index = factory.create(&paged).unwrap();
///     index.put("k".to_string(), "v".to_string()).unwrap();
///     index.page()
/// };
///
/// let index = factory.open(&paged, page).unwrap();
/// assert_eq!(index.get(&"k".to_string()).unwrap(), Some("v".to_string()));
/// ```
pub struct BTreeIndexFactory<K, V> {
    key_codec: Arc<dyn Codec<K>>,
    value_codec: Arc<dyn Codec<V>>,
    comparator: Arc<dyn Comparator<K>>,
    prefixer: Option<Arc<dyn Prefixer<K>>>,
    deferred_encoding: bool,
    overflow_key_limit: usize,
}

impl<K, V> Clone for BTreeIndexFactory<K, V> {
    fn clone(&self) -> Self {
        Self {
            key_codec: Arc::clone(&self.key_codec),
            value_codec: Arc::clone(&self.value_codec),
            comparator: Arc::clone(&self.comparator),
            prefixer: self.prefixer.clone(),
            deferred_encoding: self.deferred_encoding,
            overflow_key_limit: self.overflow_key_limit,
        }
    }
}

impl<K: Ord, V> BTreeIndexFactory<K, V> {
    /// Keys ordered by `Ord`, deferred encoding, no prefixer.
    pub fn new(key_codec: impl Codec<K> + 'static, value_codec: impl Codec<V> + 'static) -> Self {
        Self::with_comparator(key_codec, value_codec, NaturalOrder)
    }
}

impl<K, V> BTreeIndexFactory<K, V> {
    pub fn with_comparator(
        key_codec: impl Codec<K> + 'static,
        value_codec: impl Codec<V> + 'static,
        comparator: impl Comparator<K> + 'static,
    ) -> Self {
        Self {
            key_codec: Arc::new(key_codec),
            value_codec: Arc::new(value_codec),
            comparator: Arc::new(comparator),
            prefixer: None,
            deferred_encoding: true,
            overflow_key_limit: DEFAULT_OVERFLOW_KEY_LIMIT,
        }
    }

    /// Shorten leaf split separators. The prefixer must agree with the
    /// comparator's ordering.
    pub fn prefixer(mut self, prefixer: impl Prefixer<K> + 'static) -> Self {
        self.prefixer = Some(Arc::new(prefixer));
        self
    }

    /// Prefer deferred encoding. Only honoured when both codecs can report
    /// sizes up front; otherwise indexes use immediate encoding.
    pub fn deferred_encoding(mut self, enabled: bool) -> Self {
        self.deferred_encoding = enabled;
        self
    }

    /// Nodes with fewer keys than `limit` may spill into linked pages.
    pub fn overflow_key_limit(mut self, limit: usize) -> Self {
        self.overflow_key_limit = limit;
        self
    }

    /// Encoding that indexes built by this factory use.
    pub fn encoding(&self) -> Encoding {
        if self.deferred_encoding && self.accessor().sizes_known() {
            Encoding::Deferred
        } else {
            Encoding::Immediate
        }
    }

    fn accessor(&self) -> DataAccessor<K, V> {
        DataAccessor::new(Arc::clone(&self.key_codec), Arc::clone(&self.value_codec))
    }

    fn build<'a, P>(&self, paged: &'a P, page: PageId) -> BTreeIndex<'a, K, V, P>
    where
        K: Clone,
        V: Clone,
        P: Paged + ?Sized,
    {
        BTreeIndex::new(
            paged,
            page,
            self.accessor(),
            self.encoding(),
            self.overflow_key_limit,
            Arc::clone(&self.comparator),
            self.prefixer.clone(),
        )
    }

    /// Allocate a root page and write an empty index to it.
    ///
    /// # Errors
    /// [`Error::OutOfSpace`](crate::Error::OutOfSpace) if no page is free.
    pub fn create<'a, P>(&self, paged: &'a P) -> Result<BTreeIndex<'a, K, V, P>>
    where
        K: Clone,
        V: Clone,
        P: Paged + ?Sized,
    {
        let page = paged.allocator().alloc(1)?;
        let index = self.build(paged, page);
        if let Err(e) = index.create() {
            paged.free(page);
            return Err(e);
        }
        Ok(index)
    }

    /// Open the index rooted at `page`.
    ///
    /// # Errors
    /// Fails if the root cannot be read as a node of this index.
    pub fn open<'a, P>(&self, paged: &'a P, page: PageId) -> Result<BTreeIndex<'a, K, V, P>>
    where
        K: Clone,
        V: Clone,
        P: Paged + ?Sized,
    {
        let index = self.build(paged, page);
        index.root()?;
        tracing::debug!(page = page.0, encoding = ?index.encoding(), "opened index");
        Ok(index)
    }
}
