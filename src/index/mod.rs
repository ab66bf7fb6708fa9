//! # Tile index
//!
//! A tile index maps fixed-width windows ("tiles") of each sequence to the byte offset
//! of the first record that starts in that window, so that a range query can seek
//! straight to the right neighbourhood of a coordinate-sorted file.
//!
//! ## File Structure
//!
//! The index is stored next to the data file (with a `.tix` suffix) and has no header
//! or terminator. All integers are little endian.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ tile width (u32)             │ 4 bytes
//! ├──────────────────────────────┤
//! │ name length (u16)            │
//! │ name (UTF-8)                 │
//! │ tile count (u32)             │  repeated once per
//! │ longest feature (u32)        │  sequence until EOF
//! │ tile count × {               │
//! │   start position (u64)       │
//! │   record count (u32)         │
//! │ }                            │
//! └──────────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```
//! use tilequery::index::TileIndex;
//!
//! let mut index = TileIndex::new(1000);
//! index.add("chr1", 0, 12, 350);
//! index.add("chr1", 4096, 8, 350);
//!
//! let mut bytes = Vec::new();
//! index.write_bytes(&mut bytes).unwrap();
//! let loaded = TileIndex::from_reader(&mut bytes.as_slice()).unwrap();
//!
//! // Tile numbers past the end clamp to the last tile
//! let tile = loaded.tile_definition_for("chr1", 999).unwrap();
//! assert_eq!(tile.start_position, 4096);
//! ```

mod builder;
mod tile;

pub use builder::{TileIndexBuilder, DEFAULT_TILE_WIDTH};
pub use tile::{SequenceIndex, TileDescriptor, TileIndex, INDEX_EXTENSION};
