//! Configuration constants for pagetree.

/// Default size of a page in bytes (4KB).
///
/// [`MemoryPaged`](crate::storage::MemoryPaged) and
/// [`FilePaged`](crate::storage::FilePaged) accept any page size large
/// enough to hold an extent header; this is the size used when the caller
/// has no reason to pick another.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Number of pages allocated for a continuation extent when the writer has
/// no size estimate (128 × 4KB = 512KB).
///
/// Surplus pages of the final extent are handed back to the allocator when
/// the stream is closed.
pub const DEFAULT_EXTENT_SIZE: usize = 128;

/// A B+tree node may spill past its page budget only while it holds fewer
/// keys than this.
///
/// Keeps near-empty nodes from being forced into single-key splits. Can be
/// overridden per index through
/// [`BTreeIndexFactory::overflow_key_limit`](crate::index::BTreeIndexFactory::overflow_key_limit).
pub const DEFAULT_OVERFLOW_KEY_LIMIT: usize = 4;

/// Magic tag written at the start of every extent chained by the B+tree.
pub const EXTENT_MAGIC: &[u8] = b"x";
