//! Disk Manager - low-level file I/O for a page file.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing byte runs that start on a page boundary
//! - Growing the file as pages are written
//! - Syncing the file to disk

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Error, PageId, Result};

/// Manages disk I/O for a single page file.
///
/// # File Layout
/// Pages are laid out sequentially, with the page size fixed at creation:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0        S        2S     ...      N×S
/// ```
///
/// Page N is located at file offset `N × page_size`. Bytes past the end of
/// the file read as zeros; writing past the end extends the file.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. [`FilePaged`](crate::storage::FilePaged)
/// serialises access with a mutex.
///
/// # Durability
/// Writes are not synced individually; call [`sync`](Self::sync).
pub struct DiskManager {
    file: File,
    page_size: usize,
    /// Length of the file in bytes.
    len: u64,
}

impl DiskManager {
    /// Create a new page file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::invalid_argument("page size must be > 0"));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_size,
            len: 0,
        })
    }

    /// Open an existing page file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::invalid_argument("page size must be > 0"));
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            page_size,
            len,
        })
    }

    /// Fill `buffer` with the bytes starting at `page`.
    ///
    /// The part of the run that lies past the end of the file is zeroed.
    pub fn read(&mut self, page: PageId, buffer: &mut [u8]) -> Result<()> {
        let offset = self.offset(page)?;
        let available = self.len.saturating_sub(offset).min(buffer.len() as u64) as usize;

        if available > 0 {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(&mut buffer[..available])?;
        }
        buffer[available..].fill(0);
        Ok(())
    }

    /// Write `buffer` starting at `page`, extending the file if needed.
    pub fn write(&mut self, page: PageId, buffer: &[u8]) -> Result<()> {
        let offset = self.offset(page)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        self.len = self.len.max(offset + buffer.len() as u64);
        Ok(())
    }

    /// Flush file contents to disk (`fsync`).
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages touched by the file, counting a trailing partial
    /// page.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.len.div_ceil(self.page_size as u64) as u32
    }

    /// Get the total size of the file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.len
    }

    fn offset(&self, page: PageId) -> Result<u64> {
        if !page.is_valid() {
            return Err(Error::PageOutOfRange(page));
        }
        Ok(page.0 as u64 * self.page_size as u64)
    }
}
