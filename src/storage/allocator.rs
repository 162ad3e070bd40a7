//! Page allocator - first-fit management of free page runs.

use parking_lot::Mutex;

use crate::common::{Error, PageId, Result};
use crate::storage::Ranges;

/// Tracks which pages of a fixed-size address space are free.
///
/// # Thread Safety
/// Every operation takes the internal lock, so independent structures
/// (B+tree nodes, extents) may allocate and free interleaved through a
/// shared `&Allocator`. There is no cross-process coordination.
///
/// # Example
/// ```
/// use pagetree::storage::Allocator;
/// use pagetree::PageId;
///
/// let allocator = Allocator::new(8);
/// let run = allocator.alloc(3).unwrap();
/// assert_eq!(run, PageId::new(0));
/// assert!(allocator.is_allocated(PageId::new(2)));
///
/// allocator.free(run, 3);
/// assert_eq!(allocator.free_page_count(), 8);
/// ```
pub struct Allocator {
    free_ranges: Mutex<Ranges>,
    limit: u32,
}

impl Allocator {
    /// Create an allocator over pages `[0, limit)`, all free.
    pub fn new(limit: u32) -> Self {
        tracing::trace!(limit, "Allocator::new");
        let mut free = Ranges::new();
        free.add(0, limit as usize);
        Self {
            free_ranges: Mutex::new(free),
            limit,
        }
    }

    /// Allocate `size` contiguous pages.
    ///
    /// First fit: the lowest-addressed free run that is large enough gives
    /// up its first `size` pages.
    ///
    /// # Errors
    /// Returns `Error::OutOfSpace` if no free run is large enough.
    pub fn alloc(&self, size: usize) -> Result<PageId> {
        if size == 0 {
            return Err(Error::invalid_argument("cannot allocate an empty page run"));
        }
        let mut free = self.free_ranges.lock();
        let start = free
            .iter()
            .find(|&(_, len)| len >= size)
            .map(|(start, _)| start);

        match start {
            Some(start) => {
                free.remove(start, size);
                tracing::trace!(start, size, "allocated pages");
                Ok(PageId::new(start))
            }
            None => {
                tracing::trace!(size, "allocation failed");
                Err(Error::OutOfSpace { requested: size })
            }
        }
    }

    /// Return `count` pages starting at `page` to the free set.
    ///
    /// Pages at or beyond [`limit`](Self::limit) are ignored, and pages
    /// that are already free stay free once; both are logged as warnings.
    pub fn free(&self, page: PageId, count: usize) {
        tracing::trace!(page = page.0, count, "free");
        let end = (u64::from(page.0) + count as u64).min(u64::from(self.limit));
        let in_range = end.saturating_sub(u64::from(page.0)) as usize;
        if in_range < count {
            tracing::warn!(page = page.0, count, limit = self.limit, "freeing pages past the limit");
        }

        let mut free = self.free_ranges.lock();
        let already = (0..in_range)
            .filter(|&i| free.contains(page.0 + i as u32))
            .count();
        if already > 0 {
            tracing::warn!(page = page.0, count, already, "freeing pages that are already free");
        }
        if in_range > 0 {
            free.add(page.0, in_range);
        }
    }

    /// Undo a previous [`free`](Self::free).
    pub fn unfree(&self, page: PageId, count: usize) {
        tracing::trace!(page = page.0, count, "unfree");
        self.free_ranges.lock().remove(page.0, count);
    }

    /// Mark every page free again.
    pub fn clear(&self) {
        let mut free = self.free_ranges.lock();
        free.clear();
        free.add(0, self.limit as usize);
    }

    pub fn is_allocated(&self, page: PageId) -> bool {
        !self.free_ranges.lock().contains(page.0)
    }

    /// Number of pages managed by this allocator.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of pages currently free.
    pub fn free_page_count(&self) -> usize {
        self.free_ranges.lock().size()
    }

    /// Snapshot of the free set.
    pub fn free_ranges(&self) -> Ranges {
        self.free_ranges.lock().clone()
    }

    /// Replace the free set, e.g. with one persisted by the caller.
    pub fn set_free_ranges(&self, ranges: Ranges) {
        *self.free_ranges.lock() = ranges;
    }
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field("limit", &self.limit)
            .field("free", &*self.free_ranges.lock())
            .finish()
    }
}
