//! Page numbers and the on-disk "no page" terminator.

use std::fmt;

/// Number of a page in a [`Paged`](crate::storage::Paged) address space,
/// counted from zero.
///
/// [`PageId::INVALID`] terminates leaf chains and extent chains. Page
/// numbers are stored as big-endian `int32`, where the terminator is `-1`:
/// the same bits as `u32::MAX`, so the conversion is a plain cast.
///
/// # Example
/// ```
/// use pagetree::PageId;
///
/// let next = PageId::from_raw(-1);
/// assert!(!next.is_valid());
/// assert_eq!(PageId::new(3).offset(2).to_raw(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// "No page"; `-1` on disk.
    pub const INVALID: PageId = PageId(u32::MAX);

    #[inline]
    pub fn new(page: u32) -> Self {
        PageId(page)
    }

    /// Whether this names a real page rather than the terminator.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Read back a page number written with [`to_raw`](Self::to_raw).
    #[inline]
    pub fn from_raw(raw: i32) -> Self {
        PageId(raw as u32)
    }

    #[inline]
    pub fn to_raw(self) -> i32 {
        self.0 as i32
    }

    /// The page `count` pages further on.
    #[inline]
    pub fn offset(self, count: usize) -> Self {
        PageId(self.0 + count as u32)
    }

    /// Position in a page-indexed buffer.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_valid() {
            true => write!(f, "page {}", self.0),
            false => f.write_str("page -1"),
        }
    }
}
