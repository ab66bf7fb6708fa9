//! # tilequery
//!
//! Random-access interval queries over coordinate-sorted feature files.
//!
//! The crate has three layers:
//!
//! * [`index`]: a compact tile index mapping fixed-width windows of each sequence to
//!   byte offsets in the data file, plus a builder that creates it in one scan.
//! * [`IndexedReader`]: seeks into the data file through the tile index and streams the
//!   records of a range lazily.
//! * [`TiledCache`]: an LRU cache of fixed-width bins in front of any
//!   [`FeatureSource`], coalescing fetches of adjacent missing bins.
//!
//! Coordinates are 0-based and half-open throughout.
//!
//! ```rust,no_run
//! use tilequery::{index::TileIndexBuilder, BedCodec, IndexedReader, TiledCacheBuilder};
//!
//! let index = TileIndexBuilder::new(16_000).index_file("features.bed", BedCodec::new())?;
//! index.save_to_path("features.bed.tix")?;
//!
//! let reader = IndexedReader::new("features.bed", BedCodec::new());
//! let cache = TiledCacheBuilder::default().bin_size(32_000).build(reader)?;
//! for record in cache.query("chr1", 1_000_000, 1_050_000)?.into_iter().flatten() {
//!     println!("{record}");
//! }
//! # Ok::<(), tilequery::Error>(())
//! ```

pub mod index;

mod cache;
mod codec;
mod error;
mod reader;
mod record;
mod source;

pub use cache::{
    CacheStats, CachedIter, TiledCache, TiledCacheBuilder, DEFAULT_BIN_SIZE,
    DEFAULT_HUGE_BIN_THRESHOLD, DEFAULT_MAX_BINS,
};
pub use codec::{BedCodec, RecordCodec, RecordStream};
pub use error::{ConfigError, Error, IndexError, ReadError, Result};
pub use reader::{FileRecordIter, IndexedReader, RecordIter};
pub use record::{Feature, Interval};
pub use source::{FeatureSource, MemorySource};
