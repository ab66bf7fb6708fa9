use std::{
    collections::HashMap,
    ffi::OsString,
    fs::File,
    io::{self, BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IndexError, Result};

/// Size of a serialized `TileDescriptor` in bytes
pub const SIZE_TILE_DESCRIPTOR: usize = 12;

/// Suffix appended to a data file path to locate its tile index
pub const INDEX_EXTENSION: &str = "tix";

/// Location of one tile within the indexed file
///
/// Serialized as 12 bytes: `start_position` (u64) followed by `count` (u32).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDescriptor {
    /// File offset of the first record starting in this tile (or after it, for empty tiles)
    pub start_position: u64,

    /// Approximate number of records starting in this tile
    pub count: u32,
}
impl TileDescriptor {
    #[must_use]
    pub fn new(start_position: u64, count: u32) -> Self {
        Self {
            start_position,
            count,
        }
    }

    /// Serializes the descriptor to the provided writer
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = [0; SIZE_TILE_DESCRIPTOR];
        LittleEndian::write_u64(&mut buf[0..8], self.start_position);
        LittleEndian::write_u32(&mut buf[8..12], self.count);
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Deserializes a descriptor from a fixed-size buffer
    #[must_use]
    pub fn from_exact(buffer: &[u8; SIZE_TILE_DESCRIPTOR]) -> Self {
        Self {
            start_position: LittleEndian::read_u64(&buffer[0..8]),
            count: LittleEndian::read_u32(&buffer[8..12]),
        }
    }
}

/// The tiles of a single sequence
///
/// The position of a descriptor in `tiles` is its tile number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceIndex {
    name: String,
    longest_feature: u32,
    tiles: Vec<TileDescriptor>,
}
impl SequenceIndex {
    #[must_use]
    pub fn new(name: impl Into<String>, longest_feature: u32) -> Self {
        Self {
            name: name.into(),
            longest_feature,
            tiles: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Longest feature expected on this sequence, used to pad overlap queries backwards
    #[must_use]
    pub fn longest_feature(&self) -> u32 {
        self.longest_feature
    }

    #[must_use]
    pub fn tiles(&self) -> &[TileDescriptor] {
        &self.tiles
    }

    #[must_use]
    pub fn n_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Returns the descriptor for `tile_number`, clamped to the indexed tiles
    ///
    /// Asking for a tile past the last one yields the last tile: seeking there is
    /// always safe and the stream filter discards whatever precedes the query.
    #[must_use]
    pub fn tile(&self, tile_number: usize) -> Option<TileDescriptor> {
        let last = self.tiles.len().checked_sub(1)?;
        Some(self.tiles[tile_number.min(last)])
    }

    fn push(&mut self, tile: TileDescriptor) {
        self.tiles.push(tile);
    }

    fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let name = self.name.as_bytes();
        let Ok(name_len) = u16::try_from(name.len()) else {
            return Err(IndexError::NameTooLong(name.len()).into());
        };
        writer.write_u16::<LittleEndian>(name_len)?;
        writer.write_all(name)?;
        writer.write_u32::<LittleEndian>(self.tiles.len() as u32)?;
        writer.write_u32::<LittleEndian>(self.longest_feature)?;
        self.tiles
            .iter()
            .try_for_each(|tile| tile.write_bytes(writer))
    }

    /// Reads the next sequence record
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a record boundary, or when
    /// the name at the boundary is not valid UTF-8 (logged and treated as the end of
    /// the readable index).
    fn from_reader<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let Some(name_len) = read_name_len(reader)? else {
            return Ok(None);
        };

        let mut name_bytes = vec![0; name_len as usize];
        reader
            .read_exact(&mut name_bytes)
            .map_err(|e| truncated(e, String::new(), "name"))?;
        let name = match String::from_utf8(name_bytes) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("unreadable sequence name in tile index, ignoring remainder: {e}");
                return Ok(None);
            }
        };

        let n_tiles = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(e, name.clone(), "tile count"))?;
        let longest_feature = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(e, name.clone(), "longest feature"))?;

        let mut sequence = Self::new(name, longest_feature);
        sequence.tiles.reserve((n_tiles as usize).min(1 << 16));
        let mut buf = [0; SIZE_TILE_DESCRIPTOR];
        for _ in 0..n_tiles {
            reader
                .read_exact(&mut buf)
                .map_err(|e| truncated(e, sequence.name.clone(), "tiles"))?;
            sequence.push(TileDescriptor::from_exact(&buf));
        }
        Ok(Some(sequence))
    }
}

/// Reads the u16 name length at a record boundary
///
/// Zero bytes available is the normal end of the index; a single dangling byte is not.
fn read_name_len<R: Read>(reader: &mut R) -> Result<Option<u16>> {
    let mut buf = [0u8; 2];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        2 => Ok(Some(LittleEndian::read_u16(&buf))),
        _ => Err(IndexError::Truncated {
            sequence: String::new(),
            section: "name length",
        }
        .into()),
    }
}

fn truncated(e: io::Error, sequence: String, section: &'static str) -> crate::Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        IndexError::Truncated { sequence, section }.into()
    } else {
        e.into()
    }
}

/// Persisted mapping from `(sequence, tile number)` to file offsets
///
/// Sequences keep the order in which they were added, which is the order they are
/// written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileIndex {
    tile_width: u32,
    sequences: Vec<SequenceIndex>,
    lookup: HashMap<String, usize>,
}
impl TileIndex {
    /// Creates an empty index
    ///
    /// A `tile_width` of 0 means every sequence is a single tile.
    #[must_use]
    pub fn new(tile_width: u32) -> Self {
        Self {
            tile_width,
            sequences: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    #[must_use]
    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    /// Returns the tile number a 0-based position falls in
    ///
    /// Negative positions map to tile 0.
    #[must_use]
    pub fn tile_number_for(&self, position: i64) -> usize {
        if self.tile_width == 0 || position <= 0 {
            return 0;
        }
        (position / i64::from(self.tile_width)) as usize
    }

    /// Appends a tile to `sequence`
    ///
    /// Tiles are expected in increasing tile-number order and are never re-sorted.
    /// `longest_feature` is only recorded when the sequence is first seen.
    pub fn add(
        &mut self,
        sequence: &str,
        start_position: u64,
        count: u32,
        longest_feature: u32,
    ) {
        let idx = match self.lookup.get(sequence) {
            Some(&idx) => idx,
            None => {
                self.sequences
                    .push(SequenceIndex::new(sequence, longest_feature));
                let idx = self.sequences.len() - 1;
                self.lookup.insert(sequence.to_string(), idx);
                idx
            }
        };
        self.sequences[idx].push(TileDescriptor::new(start_position, count));
    }

    /// Returns the descriptor to seek to for `tile_number` on `sequence`
    ///
    /// `None` if the sequence is unknown or has no tiles; tile numbers past the end
    /// clamp to the last tile.
    #[must_use]
    pub fn tile_definition_for(&self, sequence: &str, tile_number: usize) -> Option<TileDescriptor> {
        self.sequence(sequence)?.tile(tile_number)
    }

    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<&SequenceIndex> {
        self.lookup.get(name).map(|&idx| &self.sequences[idx])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Longest feature recorded for `sequence`, 0 if unknown
    #[must_use]
    pub fn longest_feature(&self, sequence: &str) -> u32 {
        self.sequence(sequence)
            .map(SequenceIndex::longest_feature)
            .unwrap_or_default()
    }

    /// Sequence names in write order
    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(SequenceIndex::name)
    }

    #[must_use]
    pub fn n_sequences(&self) -> usize {
        self.sequences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Returns the conventional index path for a data file (`<path>.tix`)
    pub fn index_path_for<P: AsRef<Path>>(path: P) -> PathBuf {
        let mut name = OsString::from(path.as_ref().as_os_str());
        name.push(".");
        name.push(INDEX_EXTENSION);
        PathBuf::from(name)
    }

    /// Serializes the index to the provided writer
    ///
    /// Sequences without tiles are skipped.
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.tile_width)?;
        self.sequences
            .iter()
            .filter(|sequence| sequence.n_tiles() > 0)
            .try_for_each(|sequence| sequence.write_bytes(writer))
    }

    /// Deserializes an index, reading until the stream is exhausted
    ///
    /// A stream ending on a sequence boundary terminates normally; ending anywhere
    /// else is an [`IndexError::Truncated`] error.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let tile_width = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| truncated(e, String::new(), "tile width"))?;
        let mut index = Self::new(tile_width);
        while let Some(sequence) = SequenceIndex::from_reader(reader)? {
            index
                .lookup
                .insert(sequence.name.clone(), index.sequences.len());
            index.sequences.push(sequence);
        }
        Ok(index)
    }

    /// Writes the index to a file
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = File::create(path).map(BufWriter::new)?;
        self.write_bytes(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads an index from a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = File::open(path).map(BufReader::new)?;
        Self::from_reader(&mut reader)
    }
}
