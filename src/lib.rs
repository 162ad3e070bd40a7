//! pagetree - a B+tree index over a paged address space.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            pagetree                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Index Layer (index/)                        │   │
//! │  │   BTreeIndexFactory → BTreeIndex → iterators/visitors    │   │
//! │  │   Codec + Comparator + Prefixer + Predicate              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Value Layer (storage/accessor, storage/extent)    │   │
//! │  │   PagedAccessor → ExtentWriter / ExtentReader → Extent   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Page Layer (storage/)                       │   │
//! │  │   Paged trait + Allocator(Ranges)                        │   │
//! │  │   MemoryPaged | FilePaged(DiskManager)                   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, config)
//! - [`storage`] - Paged address spaces, allocation and extents
//! - [`index`] - The B+tree index and its pluggable parts
//!
//! # Quick Start
//! ```
//! use pagetree::index::{BTreeIndexFactory, StringCodec, U64Codec};
//! use pagetree::storage::MemoryPaged;
//!
//! let paged = MemoryPaged::new(4096, 1024).unwrap();
//! let index = BTreeIndexFactory::new(U64Codec, StringCodec)
//!     .create(&paged)
//!     .unwrap();
//!
//! for i in 0..1000u64 {
//!     index.put(i, format!("value {i}")).unwrap();
//! }
//! assert_eq!(index.size().unwrap(), 1000);
//! assert_eq!(index.get(&500).unwrap().as_deref(), Some("value 500"));
//! ```

pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::DEFAULT_PAGE_SIZE;
pub use common::{Error, PageId, Result};

pub use index::{BTreeIndex, BTreeIndexFactory};
pub use storage::{FilePaged, MemoryPaged, Paged};
