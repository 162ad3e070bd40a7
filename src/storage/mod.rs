//! Storage layer - paged address spaces, page allocation and extents.
//!
//! This module handles everything below the index:
//! - [`Paged`] - the page-level capability indexes are written against
//! - [`Allocator`] - first-fit allocation over a [`Ranges`] free set
//! - [`MemoryPaged`] / [`FilePaged`] - in-memory and file-backed providers
//! - [`extent`] - contiguous page runs chained into byte streams
//! - [`PagedAccessor`] - storing whole values in extent chains

mod accessor;
mod allocator;
mod disk_manager;
pub mod extent;
mod file_paged;
mod memory_paged;
mod paged;
mod ranges;

pub use accessor::PagedAccessor;
pub(crate) use accessor::store_bytes;
pub use allocator::Allocator;
pub use disk_manager::DiskManager;
pub use extent::{Extent, ExtentReader, ExtentWriter};
pub use file_paged::FilePaged;
pub use memory_paged::MemoryPaged;
pub use paged::{PageSlice, Paged, SliceMode};
pub use ranges::Ranges;
