//! File-backed paged storage.

use std::path::Path;

use parking_lot::Mutex;

use crate::common::{Error, PageId, Result};
use crate::storage::{Allocator, DiskManager, Paged};

/// Pages stored in a single file through a [`DiskManager`].
///
/// `limit` bounds the allocator; the file itself only grows as far as
/// pages are written.
///
/// # Thread Safety
/// - `disk`: `Mutex`, one I/O at a time
/// - `allocator`: internally locked
pub struct FilePaged {
    disk: Mutex<DiskManager>,
    page_size: usize,
    allocator: Allocator,
}

impl FilePaged {
    /// Create a new page file with all `limit` pages free.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize, limit: u32) -> Result<Self> {
        let disk = DiskManager::create(path, page_size)?;
        tracing::debug!(page_size, limit, "created page file");
        Ok(Self {
            disk: Mutex::new(disk),
            page_size,
            allocator: Allocator::new(limit),
        })
    }

    /// Open an existing page file.
    ///
    /// Every page already present in the file is marked allocated. Callers
    /// that persisted the free list restore it through
    /// [`Allocator::set_free_ranges`].
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if the file holds more than `limit`
    /// pages, or an I/O error if it cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize, limit: u32) -> Result<Self> {
        let disk = DiskManager::open(path, page_size)?;
        let used = disk.page_count();
        if used > limit {
            return Err(Error::invalid_argument(format!(
                "file holds {used} pages, limit is {limit}"
            )));
        }

        let allocator = Allocator::new(limit);
        allocator.unfree(PageId::new(0), used as usize);
        tracing::debug!(page_size, limit, used, "opened page file");

        Ok(Self {
            disk: Mutex::new(disk),
            page_size,
            allocator,
        })
    }

    /// Sync the file to disk.
    pub fn flush(&self) -> Result<()> {
        self.disk.lock().sync()
    }

    /// Current file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.disk.lock().file_size()
    }

    fn check(&self, page: PageId, len: usize) -> Result<()> {
        let end = page.0 as u64 * self.page_size as u64 + len as u64;
        let max = self.allocator.limit() as u64 * self.page_size as u64;
        if !page.is_valid() || end > max {
            return Err(Error::PageOutOfRange(page));
        }
        Ok(())
    }
}

impl Paged for FilePaged {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn read(&self, page: PageId, buffer: &mut [u8]) -> Result<()> {
        self.check(page, buffer.len())?;
        self.disk.lock().read(page, buffer)
    }

    fn write(&self, page: PageId, buffer: &[u8]) -> Result<()> {
        self.check(page, buffer.len())?;
        self.disk.lock().write(page, buffer)
    }
}
