use std::io::{self, Write};

use crate::common::config::DEFAULT_EXTENT_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::extent::{Extent, EXTENT_HEADER_SIZE};
use crate::storage::{Paged, Ranges};

/// Writes a byte stream into a chain of extents.
///
/// The first extent is opened at construction. When it fills up, a new
/// extent of `next_extent_size` pages is allocated and linked from the
/// header of the full one. [`close`](Self::close) terminates the chain and
/// frees any unused tail pages of the last extent.
///
/// Dropping a writer without closing it leaves its last extent unwritten.
///
/// # Example
/// ```
/// use std::io::Write;
/// use pagetree::storage::{ExtentReader, ExtentWriter, MemoryPaged};
///
/// let paged = MemoryPaged::new(32, 64).unwrap();
/// let mut writer = ExtentWriter::with_extent_size(&paged, 2).unwrap();
/// writer.write_all(b"a stream longer than one extent can hold").unwrap();
/// let page = writer.page();
/// writer.close().unwrap();
///
/// let mut reader = ExtentReader::new(&paged, page).unwrap();
/// let mut text = String::new();
/// std::io::Read::read_to_string(&mut reader, &mut text).unwrap();
/// assert_eq!(text, "a stream longer than one extent can hold");
/// ```
pub struct ExtentWriter<'a, P: Paged + ?Sized> {
    paged: &'a P,
    page: PageId,
    extent_size: usize,
    next_extent_size: usize,
    current: Extent<'a, P>,
    pages: Ranges,
}

impl<'a, P: Paged + ?Sized> ExtentWriter<'a, P> {
    /// Allocate a first extent big enough for `size_hint` payload bytes, or
    /// [`DEFAULT_EXTENT_SIZE`] pages when there is no hint.
    pub fn new(paged: &'a P, size_hint: Option<usize>) -> Result<Self> {
        let extent_size = match size_hint {
            Some(size) => paged.pages(size + EXTENT_HEADER_SIZE),
            None => DEFAULT_EXTENT_SIZE,
        };
        Self::with_extent_size(paged, extent_size)
    }

    /// Allocate a first extent of `extent_size` pages; continuations use
    /// the same size.
    pub fn with_extent_size(paged: &'a P, extent_size: usize) -> Result<Self> {
        check_sizes(paged, extent_size, extent_size)?;
        let page = paged.allocator().alloc(extent_size)?;
        Self::init(paged, page, extent_size, extent_size)
    }

    /// Write into `extent_size` pages the caller already owns at `page`.
    ///
    /// With a `size_hint`, the first continuation is sized to hold whatever
    /// the first extent cannot.
    pub fn at(
        paged: &'a P,
        page: PageId,
        extent_size: usize,
        size_hint: Option<usize>,
    ) -> Result<Self> {
        let first_capacity = (paged.page_size() * extent_size).saturating_sub(EXTENT_HEADER_SIZE);
        let next_extent_size = match size_hint {
            Some(size) if size > first_capacity => {
                paged.pages(size - first_capacity + EXTENT_HEADER_SIZE)
            }
            _ => DEFAULT_EXTENT_SIZE,
        };
        tracing::trace!(page = page.0, extent_size, next_extent_size, "ExtentWriter::at");
        check_sizes(paged, extent_size, next_extent_size)?;
        Self::init(paged, page, extent_size, next_extent_size)
    }

    fn init(
        paged: &'a P,
        page: PageId,
        extent_size: usize,
        next_extent_size: usize,
    ) -> Result<Self> {
        let mut current = Extent::new(paged, page)?;
        current.write_open(extent_size)?;
        Ok(Self {
            paged,
            page,
            extent_size,
            next_extent_size,
            current,
            pages: Ranges::new(),
        })
    }

    /// First page of the chain.
    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn extent_size(&self) -> usize {
        self.extent_size
    }

    pub fn next_extent_size(&self) -> usize {
        self.next_extent_size
    }

    /// Terminate the chain. Returns every page the stream occupies.
    pub fn close(mut self) -> Result<Ranges> {
        self.current.write_close_eof()?;
        self.pages
            .add(self.current.page().0, self.paged.pages(self.current.length()));
        tracing::trace!(page = self.page.0, pages = ?self.pages, "ExtentWriter::close");
        Ok(self.pages)
    }

    fn next_extent(&mut self) -> Result<()> {
        let next = self.paged.allocator().alloc(self.next_extent_size)?;
        let length = self.current.write_close_linked(next)?;
        self.pages
            .add(self.current.page().0, self.paged.pages(length));

        let mut extent = Extent::new(self.paged, next)?;
        extent.write_open(self.next_extent_size)?;
        self.current = extent;
        Ok(())
    }
}

/// A single-page extent on a page that only fits the header can never
/// hold a byte.
fn check_sizes<P: Paged + ?Sized>(
    paged: &P,
    extent_size: usize,
    next_extent_size: usize,
) -> Result<()> {
    if extent_size == 1 && next_extent_size == 1 && paged.page_size() == EXTENT_HEADER_SIZE {
        return Err(Error::invalid_argument(
            "one-page extents cannot hold data when the page size equals the extent header",
        ));
    }
    Ok(())
}

impl<P: Paged + ?Sized> Write for ExtentWriter<'_, P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut source = buf;
        while !self.current.write_bytes(&mut source) {
            self.next_extent()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
