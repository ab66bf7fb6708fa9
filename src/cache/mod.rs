//! # Tiled feature cache
//!
//! An in-memory LRU cache of fixed-width bins placed in front of any
//! [`FeatureSource`](crate::FeatureSource).
//!
//! ```text
//!  bin_size = 1000
//!
//!  |    bin 1    |    bin 2    |    bin 3    |
//!  1000          2000          3000          4000
//!       [=========== record ===========]
//!        contained   overlapping  overlapping
//! ```
//!
//! A record is stored as *contained* in the bin holding its start coordinate and as
//! *overlapping* in every following bin it reaches into. A query spanning bins
//! `a..=b` returns the overlapping records of bin `a` followed by the contained
//! records of bins `a` through `b`, which yields each record once and in order.
//!
//! Missing bins are fetched in runs: consecutive missing bins are loaded with a single
//! query to the source, while bins already cached split the range into separate runs.

mod bin;
mod iter;
mod tiled;

pub use iter::CachedIter;
pub use tiled::{
    CacheStats, TiledCache, TiledCacheBuilder, DEFAULT_BIN_SIZE, DEFAULT_HUGE_BIN_THRESHOLD,
    DEFAULT_MAX_BINS,
};
