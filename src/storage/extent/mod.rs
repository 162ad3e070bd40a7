//! Extents - contiguous page runs chained into byte streams.
//!
//! An extent is a run of one or more contiguous pages whose first bytes hold
//! a header:
//!
//! ```text
//! ┌───────────┬──────────────┬──────────────┬─────────────────────────┐
//! │ magic     │ length (i32) │ next (i32)   │ payload ...             │
//! │ (N bytes) │ big-endian   │ big-endian   │                         │
//! └───────────┴──────────────┴──────────────┴─────────────────────────┘
//! ```
//!
//! - `length` is the number of bytes used in the run, header included.
//! - `next` is the first page of the following extent, or `-1`.
//!
//! [`ExtentWriter`] and [`ExtentReader`] expose a chain of extents as a
//! single `std::io::Write` / `std::io::Read` stream.

mod reader;
mod writer;

pub use reader::ExtentReader;
pub use writer::ExtentWriter;

use std::collections::HashSet;
use std::fmt;

use crate::common::config::EXTENT_MAGIC;
use crate::common::{Error, PageId, Result};
use crate::storage::{PageSlice, Paged, SliceMode};

/// Bytes of header that follow the magic tag (`length` + `next`).
const HEADER_INTS: usize = 8;

/// Size of the header written with the default magic.
pub const EXTENT_HEADER_SIZE: usize = EXTENT_MAGIC.len() + HEADER_INTS;

/// A single run of pages, opened for reading or for writing.
pub struct Extent<'a, P: Paged + ?Sized> {
    paged: &'a P,
    page: PageId,
    magic: &'static [u8],
    slice: Option<PageSlice>,
    position: usize,
    limit: usize,
    length: usize,
    next: PageId,
}

impl<'a, P: Paged + ?Sized> Extent<'a, P> {
    /// An extent at `page` tagged with [`EXTENT_MAGIC`].
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if a page cannot hold the header.
    pub fn new(paged: &'a P, page: PageId) -> Result<Self> {
        Self::with_magic(paged, page, EXTENT_MAGIC)
    }

    /// An extent at `page` tagged with a caller-chosen magic.
    pub fn with_magic(paged: &'a P, page: PageId, magic: &'static [u8]) -> Result<Self> {
        tracing::trace!(page = page.0, magic = %hexify(magic), "Extent::new");
        if paged.page_size() < magic.len() + HEADER_INTS {
            return Err(Error::invalid_argument(format!(
                "page size [{}] must be at least magic.len() + 8 [{}]",
                paged.page_size(),
                magic.len() + HEADER_INTS
            )));
        }
        Ok(Self {
            paged,
            page,
            magic,
            slice: None,
            position: 0,
            limit: 0,
            length: 0,
            next: PageId::INVALID,
        })
    }

    fn header_size(&self) -> usize {
        self.magic.len() + HEADER_INTS
    }

    /// Read and validate the header from the first page of the run.
    ///
    /// # Errors
    /// Returns `Error::BadMagic` if the page does not start with this
    /// extent's magic.
    pub fn read_header(&mut self) -> Result<()> {
        let slice = self.paged.slice(SliceMode::Read, self.page, 1)?;
        let bytes = slice.as_slice();
        let m = self.magic.len();

        if &bytes[..m] != self.magic {
            return Err(Error::BadMagic {
                page: self.page,
                expected: hexify(self.magic),
                found: hexify(&bytes[..m]),
            });
        }

        let length = read_i32(&bytes[m..m + 4]);
        let next = read_i32(&bytes[m + 4..m + 8]);
        if length < self.header_size() as i32 {
            return Err(Error::corruption(format!(
                "extent at {} has impossible length {}",
                self.page, length
            )));
        }
        self.length = length as usize;
        self.next = PageId::from_raw(next);
        self.slice = Some(slice);
        tracing::trace!(page = self.page.0, length, next, "Extent::read_header");
        Ok(())
    }

    /// Read the header, then map every page the extent uses, positioned at
    /// the first payload byte.
    pub fn read_open(&mut self) -> Result<()> {
        self.read_header()?;
        let pages = self.paged.pages(self.length);
        if pages > 1 {
            self.read_close()?;
            self.slice = Some(self.paged.slice(SliceMode::Read, self.page, pages)?);
        }
        self.position = self.header_size();
        self.limit = self.length;
        Ok(())
    }

    /// Map `size` fresh pages for writing, positioned past the header.
    pub fn write_open(&mut self, size: usize) -> Result<()> {
        tracing::trace!(page = self.page.0, size, "Extent::write_open");
        if size == 0 {
            return Err(Error::invalid_argument("an extent spans at least one page"));
        }
        let slice = self.paged.slice(SliceMode::Write, self.page, size)?;
        self.limit = slice.len();
        self.position = self.header_size();
        self.slice = Some(slice);
        Ok(())
    }

    /// Write the header with `next` as the follow-on extent and release
    /// the pages. Returns the extent length.
    pub fn write_close_linked(&mut self, next: PageId) -> Result<usize> {
        let mut slice = self.take_slice()?;
        self.next = next;
        self.length = self.position;

        let m = self.magic.len();
        let bytes = slice.as_mut_slice();
        bytes[..m].copy_from_slice(self.magic);
        bytes[m..m + 4].copy_from_slice(&(self.length as i32).to_be_bytes());
        bytes[m + 4..m + 8].copy_from_slice(&next.to_raw().to_be_bytes());
        self.paged.unslice(slice)?;

        tracing::trace!(
            page = self.page.0,
            length = self.length,
            next = next.to_raw(),
            "Extent::write_close_linked"
        );
        Ok(self.length)
    }

    /// Close as the final extent of a chain, handing back pages of the run
    /// that were never written to.
    pub fn write_close_eof(&mut self) -> Result<()> {
        let original_pages = self.paged.pages(self.limit);
        let length = self.write_close_linked(PageId::INVALID)?;
        let used_pages = self.paged.pages(length);

        let remaining = original_pages.saturating_sub(used_pages);
        if remaining > 0 {
            tracing::debug!(
                page = self.page.0,
                used_pages,
                remaining,
                "freeing surplus extent pages"
            );
            self.paged
                .allocator()
                .free(self.page.offset(used_pages), remaining);
        }
        Ok(())
    }

    /// Release the pages mapped for reading.
    pub fn read_close(&mut self) -> Result<()> {
        match self.slice.take() {
            Some(slice) => self.paged.unslice(slice),
            None => Ok(()),
        }
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.limit
    }

    /// Append one byte. Returns `false` if the extent is full.
    pub fn write(&mut self, byte: u8) -> bool {
        if self.at_end() {
            return false;
        }
        if let Some(slice) = self.slice.as_mut() {
            slice.as_mut_slice()[self.position] = byte;
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Append as much of `source` as fits, advancing it past what was
    /// written. Returns `true` once `source` is exhausted.
    pub fn write_bytes(&mut self, source: &mut &[u8]) -> bool {
        while !source.is_empty() {
            if self.at_end() {
                return false;
            }
            let Some(slice) = self.slice.as_mut() else {
                return false;
            };
            let count = (self.limit - self.position).min(source.len());
            slice.as_mut_slice()[self.position..self.position + count]
                .copy_from_slice(&source[..count]);
            self.position += count;
            *source = &source[count..];
        }
        true
    }

    /// Next payload byte, or `None` at the end of the extent.
    pub fn read(&mut self) -> Option<u8> {
        if self.at_end() {
            return None;
        }
        let byte = self.slice.as_ref()?.as_slice()[self.position];
        self.position += 1;
        Some(byte)
    }

    /// Copy payload bytes into `target`. Returns how many were copied.
    pub fn read_into(&mut self, target: &mut [u8]) -> usize {
        let Some(slice) = self.slice.as_ref() else {
            return 0;
        };
        let count = self.limit.saturating_sub(self.position).min(target.len());
        target[..count].copy_from_slice(&slice.as_slice()[self.position..self.position + count]);
        self.position += count;
        count
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn next(&self) -> PageId {
        self.next
    }

    fn take_slice(&mut self) -> Result<PageSlice> {
        self.slice
            .take()
            .ok_or_else(|| Error::invalid_argument(format!("extent at {} is not open", self.page)))
    }

    // ========================================================================
    // Chain operations
    // ========================================================================

    /// Every page used by the chain starting at `page`.
    pub fn pages(paged: &P, page: PageId) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        walk(paged, page, |first, count| {
            pages.extend((0..count).map(|i| first.offset(i)));
        })?;
        tracing::trace!(page = page.0, count = pages.len(), "Extent::pages");
        Ok(pages)
    }

    /// Pages of the extents linked off the one at `page`, not counting
    /// `page`'s own run.
    pub fn pages_linked(paged: &P, page: PageId) -> Result<Vec<PageId>> {
        let next = Self::header_of(paged, page)?;
        Self::pages(paged, next)
    }

    /// Free every page of the chain starting at `page`, returning them.
    pub fn free(paged: &P, page: PageId) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        walk(paged, page, |first, count| {
            paged.allocator().free(first, count);
            pages.extend((0..count).map(|i| first.offset(i)));
        })?;
        tracing::trace!(page = page.0, count = pages.len(), "Extent::free");
        Ok(pages)
    }

    /// Free the extents linked off the one at `page`, leaving `page`'s own
    /// run allocated.
    pub fn free_linked(paged: &P, page: PageId) -> Result<Vec<PageId>> {
        let next = Self::header_of(paged, page)?;
        Self::free(paged, next)
    }

    /// Undo a previous [`free`](Self::free) of the chain at `page`.
    pub fn unfree(paged: &P, page: PageId) -> Result<()> {
        walk(paged, page, |first, count| {
            paged.allocator().unfree(first, count);
        })?;
        tracing::trace!(page = page.0, "Extent::unfree");
        Ok(())
    }

    fn header_of(paged: &P, page: PageId) -> Result<PageId> {
        let mut extent = Extent::new(paged, page)?;
        extent.read_header()?;
        extent.read_close()?;
        Ok(extent.next)
    }
}

/// Visit each extent of a chain as `(first page, page count)`.
fn walk<P, F>(paged: &P, mut page: PageId, mut f: F) -> Result<()>
where
    P: Paged + ?Sized,
    F: FnMut(PageId, usize),
{
    let mut seen = HashSet::new();
    while page.is_valid() {
        if !seen.insert(page) {
            return Err(Error::CycleDetected(page));
        }
        let mut extent = Extent::new(paged, page)?;
        extent.read_header()?;
        extent.read_close()?;
        f(page, paged.pages(extent.length));
        page = extent.next;
    }
    Ok(())
}

impl<P: Paged + ?Sized> fmt::Debug for Extent<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extent")
            .field("page", &self.page)
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("length", &self.length)
            .field("next", &self.next)
            .finish()
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    i32::from_be_bytes(raw)
}

fn hexify(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
