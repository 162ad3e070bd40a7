//! In-memory paged storage.

use parking_lot::RwLock;

use crate::common::{Error, PageId, Result};
use crate::storage::{Allocator, Paged};

/// A fixed number of pages held in one heap buffer.
///
/// # Thread Safety
/// - `data`: `RwLock`, many readers and few writers
/// - `allocator`: internally locked
///
/// # Example
/// ```
/// use pagetree::storage::{MemoryPaged, Paged};
/// use pagetree::PageId;
///
/// let paged = MemoryPaged::new(64, 16).unwrap();
/// paged.write(PageId::new(1), b"hello").unwrap();
///
/// let mut buf = [0u8; 5];
/// paged.read(PageId::new(1), &mut buf).unwrap();
/// assert_eq!(&buf, b"hello");
/// ```
pub struct MemoryPaged {
    page_size: usize,
    data: RwLock<Vec<u8>>,
    allocator: Allocator,
}

impl MemoryPaged {
    /// Create `page_count` zeroed pages of `page_size` bytes, all free.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for a zero page size.
    pub fn new(page_size: usize, page_count: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::invalid_argument("page size must be > 0"));
        }
        Ok(Self {
            page_size,
            data: RwLock::new(vec![0u8; page_size * page_count as usize]),
            allocator: Allocator::new(page_count),
        })
    }

    /// Copy of every byte in the address space.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn byte_range(&self, page: PageId, len: usize, total: usize) -> Result<std::ops::Range<usize>> {
        if !page.is_valid() {
            return Err(Error::PageOutOfRange(page));
        }
        let start = page.index() * self.page_size;
        let end = start + len;
        if end > total {
            return Err(Error::PageOutOfRange(page));
        }
        Ok(start..end)
    }
}

impl Paged for MemoryPaged {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn read(&self, page: PageId, buffer: &mut [u8]) -> Result<()> {
        let data = self.data.read();
        let range = self.byte_range(page, buffer.len(), data.len())?;
        buffer.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write(&self, page: PageId, buffer: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        let total = data.len();
        let range = self.byte_range(page, buffer.len(), total)?;
        data[range].copy_from_slice(buffer);
        Ok(())
    }
}
