//! Paged B+tree.
//!
//! - [`Data`] / [`Payload`]: node contents, edited by value
//! - `node`: node encoding and the [`Encoding`] strategies
//! - [`BTreeIndex`]: lookups, updates, splits, removal
//! - [`BTreeIter`] / [`PredicateIter`]: ordered and pruned iteration
//! - [`BTreeIndexFactory`]: creates and reopens indexes

mod data;
mod factory;
mod index;
mod iter;
mod node;

pub use data::{Data, Payload};
pub use factory::BTreeIndexFactory;
pub use index::BTreeIndex;
pub use iter::{BTreeIter, PredicateIter};
pub use node::Encoding;
