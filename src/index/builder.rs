use std::{collections::HashSet, fs::File, io::BufRead, path::Path};

use memmap2::Mmap;

use super::{TileDescriptor, TileIndex};
use crate::codec::{RecordCodec, RecordStream};
use crate::error::{IndexError, Result};
use crate::record::Feature;

/// Default tile width used when indexing files
pub const DEFAULT_TILE_WIDTH: u32 = 16_000;

/// Builds a [`TileIndex`] by scanning a coordinate-sorted file once
///
/// Records must be grouped by sequence and sorted by start coordinate within each
/// sequence. Every tile number up to the last occupied tile gets a descriptor, so that
/// tile numbers can be used directly as positions in the tile list; a tile with no
/// records of its own points at the next record that follows it.
///
/// # Examples
///
/// ```
/// use tilequery::{index::TileIndexBuilder, BedCodec};
///
/// let bed = "chr1\t100\t200\nchr1\t2500\t2600\nchr2\t0\t10\n";
/// let index = TileIndexBuilder::new(1000)
///     .build(bed.as_bytes(), BedCodec::new())
///     .unwrap();
///
/// let chr1 = index.sequence("chr1").unwrap();
/// assert_eq!(chr1.n_tiles(), 3);
/// assert_eq!(chr1.tiles()[1].count, 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TileIndexBuilder {
    tile_width: u32,
}
impl Default for TileIndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_WIDTH)
    }
}
impl TileIndexBuilder {
    #[must_use]
    pub fn new(tile_width: u32) -> Self {
        Self { tile_width }
    }

    #[must_use]
    pub fn tile_width(mut self, tile_width: u32) -> Self {
        self.tile_width = tile_width;
        self
    }

    /// Scans all records of `reader` and returns the finished index
    pub fn build<R: BufRead, C: RecordCodec>(&self, reader: R, codec: C) -> Result<TileIndex> {
        let mut index = TileIndex::new(self.tile_width);
        let mut stream = RecordStream::new(reader, codec);
        let mut seen = HashSet::new();
        let mut current: Option<PendingSequence> = None;

        while let Some((offset, record)) = stream.next_record()? {
            let switch = !matches!(&current, Some(pending) if pending.name == record.sequence());
            if switch {
                if let Some(pending) = current.take() {
                    pending.flush_into(&mut index);
                }
                if !seen.insert(record.sequence().to_string()) {
                    return Err(
                        IndexError::SequenceNotContiguous(record.sequence().to_string()).into(),
                    );
                }
                current = Some(PendingSequence::new(record.sequence()));
            }
            if let Some(pending) = current.as_mut() {
                pending.observe(&index, offset, &record)?;
            }
        }
        if let Some(pending) = current.take() {
            pending.flush_into(&mut index);
        }

        tracing::debug!(
            "built tile index: {} sequences, tile width {}",
            index.n_sequences(),
            index.tile_width()
        );
        Ok(index)
    }

    /// Memory-maps the file at `path` and indexes it
    pub fn index_file<P: AsRef<Path>, C: RecordCodec>(&self, path: P, codec: C) -> Result<TileIndex> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(TileIndex::new(self.tile_width));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        self.build(&mmap[..], codec)
    }
}

/// Tiles of the sequence currently being scanned
struct PendingSequence {
    name: String,
    tiles: Vec<TileDescriptor>,
    longest: i64,
    last_start: i64,
}
impl PendingSequence {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tiles: Vec::new(),
            longest: 0,
            last_start: i64::MIN,
        }
    }

    fn observe<F: Feature>(&mut self, index: &TileIndex, offset: u64, record: &F) -> Result<()> {
        if record.start() < self.last_start {
            return Err(IndexError::UnsortedInput {
                sequence: self.name.clone(),
                previous: self.last_start,
                found: record.start(),
            }
            .into());
        }
        self.last_start = record.start();
        self.longest = self.longest.max(record.len());

        let tile_number = index.tile_number_for(record.start());
        while self.tiles.len() <= tile_number {
            self.tiles.push(TileDescriptor::new(offset, 0));
        }
        let tile = &mut self.tiles[tile_number];
        tile.count = tile.count.saturating_add(1);
        Ok(())
    }

    fn flush_into(self, index: &mut TileIndex) {
        let longest = u32::try_from(self.longest.max(0)).unwrap_or(u32::MAX);
        for tile in self.tiles {
            index.add(&self.name, tile.start_position, tile.count, longest);
        }
    }
}
