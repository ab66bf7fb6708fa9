//! Indexed range reading
//!
//! [`IndexedReader`] answers interval queries on a coordinate-sorted file by seeking to
//! the tile recorded in its [`TileIndex`](crate::index::TileIndex) and streaming records
//! forward through a [`RecordIter`] until they leave the requested range.

mod indexed;
mod iter;

pub use indexed::{FileRecordIter, IndexedReader};
pub use iter::RecordIter;
