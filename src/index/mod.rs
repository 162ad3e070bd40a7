//! Ordered indexes stored in paged memory.
//!
//! # Components
//! - [`Codec`]: byte encoding of keys and values
//! - [`Comparator`]: key ordering
//! - [`Prefixer`]: shortened separator keys
//! - [`predicate`]: pruned range queries
//! - [`IndexVisitor`]: leaf-at-a-time traversal
//! - [`BTreeIndex`]: the B+tree itself

mod btree;
mod codec;
mod comparator;
pub mod predicate;
mod prefixer;
mod visitor;

pub use btree::{
    BTreeIndex, BTreeIndexFactory, BTreeIter, Data, Encoding, Payload, PredicateIter,
};
pub use codec::{BytesCodec, Codec, I64Codec, StringCodec, U32Codec, U64Codec};
pub use comparator::{Comparator, NaturalOrder, Reverse};
pub use predicate::Predicate;
pub use prefixer::{BytesPrefixer, Prefixer, StringPrefixer};
pub use visitor::{IndexVisitor, PredicateVisitor};
