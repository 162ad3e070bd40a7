//! Storing whole values in extent chains.

use std::io::{Read, Write};

use crate::common::{PageId, Result};
use crate::storage::{Extent, ExtentReader, ExtentWriter, Paged};

/// Encodes values of one type into pages and decodes them back.
///
/// A value is written as an extent stream whose first extent is the single
/// page handed to [`store`](Self::store); anything that does not fit goes
/// into one linked extent sized to hold the rest.
pub trait PagedAccessor {
    type Value;

    fn encode(&self, out: &mut dyn Write, value: &Self::Value) -> Result<()>;

    fn decode(&self, input: &mut dyn Read) -> Result<Self::Value>;

    /// Write `value` starting at `page`. Returns the linked pages it
    /// occupies beyond `page`.
    ///
    /// The value is encoded before any page is written, so an encoding
    /// error leaves `page` as it was.
    fn store<P: Paged + ?Sized>(
        &self,
        paged: &P,
        page: PageId,
        value: &Self::Value,
    ) -> Result<Vec<PageId>> {
        let mut bytes = Vec::new();
        self.encode(&mut bytes, value)?;
        store_bytes(paged, page, &bytes)
    }

    fn load<P: Paged + ?Sized>(&self, paged: &P, page: PageId) -> Result<Self::Value> {
        let mut reader = ExtentReader::new(paged, page)?;
        let value = self.decode(&mut reader)?;
        reader.close()?;
        Ok(value)
    }

    /// Linked pages of the value stored at `page`, without freeing them.
    fn pages_linked<P: Paged + ?Sized>(&self, paged: &P, page: PageId) -> Result<Vec<PageId>> {
        Extent::pages_linked(paged, page)
    }

    /// Free the linked pages of the value stored at `page`.
    fn free_linked<P: Paged + ?Sized>(&self, paged: &P, page: PageId) -> Result<Vec<PageId>> {
        Extent::free_linked(paged, page)
    }
}

/// Write already encoded `bytes` as an extent chain starting at `page`.
/// Returns the linked pages beyond `page`.
///
/// The continuation, if any, is allocated before `page` is written, so
/// `OutOfSpace` leaves `page` untouched.
pub(crate) fn store_bytes<P: Paged + ?Sized>(
    paged: &P,
    page: PageId,
    bytes: &[u8],
) -> Result<Vec<PageId>> {
    let mut writer = ExtentWriter::at(paged, page, 1, Some(bytes.len()))?;
    writer.write_all(bytes)?;
    let mut pages = writer.close()?;
    pages.remove(page.0, 1);
    Ok(pages.values().into_iter().map(PageId::new).collect())
}
