//! The paged storage capability the extent and B+tree code is written
//! against.

use crate::common::{PageId, Result};
use crate::storage::{Allocator, PagedAccessor};

/// How a [`PageSlice`] will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceMode {
    /// Contents are loaded; nothing is written back.
    Read,
    /// Contents start zeroed and are written back on unslice.
    Write,
    /// Contents are loaded and written back on unslice.
    ReadWrite,
}

/// A copy of a contiguous run of pages.
///
/// Obtained from [`Paged::slice`] and handed back to [`Paged::unslice`],
/// which persists it unless it was opened for reading only.
#[derive(Debug)]
pub struct PageSlice {
    mode: SliceMode,
    page: PageId,
    count: usize,
    data: Vec<u8>,
}

impl PageSlice {
    pub fn new(mode: SliceMode, page: PageId, count: usize, data: Vec<u8>) -> Self {
        Self {
            mode,
            page,
            count,
            data,
        }
    }

    pub fn mode(&self) -> SliceMode {
        self.mode
    }

    /// First page of the run.
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Number of pages in the run.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A fixed-page-size address space with an allocator.
///
/// The B+tree and extents only ever talk to storage through this trait; the
/// transactional page file that gives snapshot isolation and durability is
/// expected to implement it. [`MemoryPaged`](crate::storage::MemoryPaged)
/// and [`FilePaged`](crate::storage::FilePaged) are the providers shipped
/// with this crate.
///
/// All methods take `&self`: implementations synchronise internally, the
/// same way the allocator does.
pub trait Paged {
    /// Size of one page in bytes.
    fn page_size(&self) -> usize;

    /// Allocator for this address space.
    fn allocator(&self) -> &Allocator;

    /// Copy `buffer.len()` bytes starting at the first byte of `page`.
    fn read(&self, page: PageId, buffer: &mut [u8]) -> Result<()>;

    /// Write `buffer` starting at the first byte of `page`.
    fn write(&self, page: PageId, buffer: &[u8]) -> Result<()>;

    /// Number of pages needed to hold `length` bytes.
    fn pages(&self, length: usize) -> usize {
        length.div_ceil(self.page_size())
    }

    /// Take a view of `count` pages starting at `page`.
    fn slice(&self, mode: SliceMode, page: PageId, count: usize) -> Result<PageSlice> {
        let mut data = vec![0u8; count * self.page_size()];
        if mode != SliceMode::Write {
            self.read(page, &mut data)?;
        }
        Ok(PageSlice::new(mode, page, count, data))
    }

    /// Release a view, persisting it if it was opened for writing.
    fn unslice(&self, slice: PageSlice) -> Result<()> {
        match slice.mode {
            SliceMode::Read => Ok(()),
            SliceMode::Write | SliceMode::ReadWrite => self.write(slice.page, &slice.data),
        }
    }

    /// Return a single page to the allocator.
    fn free(&self, page: PageId) {
        self.allocator().free(page, 1);
    }

    /// Load a value stored at `page` through `accessor`.
    fn get<A: PagedAccessor>(&self, accessor: &A, page: PageId) -> Result<A::Value> {
        accessor.load(self, page)
    }

    /// Store a value at `page` through `accessor`, returning the pages it
    /// occupies beyond `page`.
    fn put<A: PagedAccessor>(
        &self,
        accessor: &A,
        page: PageId,
        value: &A::Value,
    ) -> Result<Vec<PageId>> {
        accessor.store(self, page, value)
    }

    /// Free the pages a value stored at `page` occupies beyond `page`.
    fn clear<A: PagedAccessor>(&self, accessor: &A, page: PageId) -> Result<Vec<PageId>> {
        accessor.free_linked(self, page)
    }
}
