use std::io::{self, Read};

use crate::common::{Error, PageId, Result};
use crate::storage::extent::Extent;
use crate::storage::{Paged, Ranges};

/// Reads the byte stream stored in a chain of extents.
///
/// Follows `next` links transparently. Reading past the end of the chain
/// returns `Ok(0)`.
pub struct ExtentReader<'a, P: Paged + ?Sized> {
    paged: &'a P,
    page: PageId,
    current: Option<Extent<'a, P>>,
    pages: Ranges,
}

impl<'a, P: Paged + ?Sized> ExtentReader<'a, P> {
    /// Open the chain whose first extent starts at `page`.
    ///
    /// # Errors
    /// Returns `Error::BadMagic` if `page` does not hold an extent.
    pub fn new(paged: &'a P, page: PageId) -> Result<Self> {
        let mut current = Extent::new(paged, page)?;
        current.read_open()?;
        let mut pages = Ranges::new();
        pages.add(page.0, paged.pages(current.length()));
        tracing::trace!(page = page.0, length = current.length(), "ExtentReader::new");

        Ok(Self {
            paged,
            page,
            current: Some(current),
            pages,
        })
    }

    /// First page of the chain.
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Pages visited so far.
    pub fn pages(&self) -> &Ranges {
        &self.pages
    }

    pub fn close(mut self) -> Result<()> {
        match self.current.take() {
            Some(mut extent) => extent.read_close(),
            None => Ok(()),
        }
    }

    /// Move to the next extent, or to the end of the stream.
    fn next_extent(&mut self) -> Result<()> {
        let Some(mut extent) = self.current.take() else {
            return Ok(());
        };
        let next = extent.next();
        extent.read_close()?;
        if !next.is_valid() {
            return Ok(());
        }
        if self.pages.contains(next.0) {
            return Err(Error::CycleDetected(next));
        }

        let mut extent = Extent::new(self.paged, next)?;
        extent.read_open()?;
        self.pages.add(next.0, self.paged.pages(extent.length()));
        self.current = Some(extent);
        Ok(())
    }
}

impl<P: Paged + ?Sized> Read for ExtentReader<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let Some(extent) = self.current.as_mut() else {
                break;
            };
            if extent.at_end() {
                self.next_extent()?;
            } else {
                filled += extent.read_into(&mut buf[filled..]);
            }
        }
        Ok(filled)
    }
}
