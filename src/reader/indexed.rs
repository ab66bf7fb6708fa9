use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};

use super::iter::{RangeFilter, RecordIter};
use crate::codec::{RecordCodec, RecordStream};
use crate::error::{Error, Result};
use crate::index::TileIndex;
use crate::record::Feature;
use crate::source::FeatureSource;

/// Iterator type produced by an [`IndexedReader`]
pub type FileRecordIter<C> = RecordIter<BufReader<File>, C>;

/// Where the tile index of a reader comes from
#[derive(Debug, Clone)]
enum IndexOrigin {
    /// Loaded lazily from this path
    Path(PathBuf),
    /// Supplied by the caller, never reloaded
    Memory(Arc<TileIndex>),
}

#[derive(Debug, Clone)]
enum IndexState {
    Unloaded,
    Loaded(Arc<TileIndex>),
    /// The index is missing or failed to load; range queries are refused until `reload`
    Unavailable,
    Closed,
}

/// Range reader that seeks into a coordinate-sorted file using a [`TileIndex`]
///
/// The index is loaded on first use. Every query opens its own file handle, seeks to
/// the tile covering the (padded) query start, and streams forward through a
/// [`RecordIter`], so no file handle outlives the iterator that uses it.
///
/// Without an index the reader still supports full sequential scans through
/// [`FeatureSource::iter`].
///
/// # Examples
///
/// ```rust,no_run
/// use tilequery::{BedCodec, FeatureSource, IndexedReader};
///
/// let mut reader = IndexedReader::new("features.bed", BedCodec::new());
/// if let Some(records) = reader.query("chr1", 1_500, 2_500).unwrap() {
///     for record in records {
///         println!("{}", record.unwrap());
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct IndexedReader<C: RecordCodec> {
    path: PathBuf,
    origin: IndexOrigin,
    codec: C,
    state: IndexState,
}
impl<C: RecordCodec> IndexedReader<C> {
    /// Creates a reader for `path` whose index lives at `<path>.tix`
    pub fn new<P: AsRef<Path>>(path: P, codec: C) -> Self {
        let index_path = TileIndex::index_path_for(path.as_ref());
        Self::with_index_path(path, index_path, codec)
    }

    /// Creates a reader whose index is stored at an explicit location
    pub fn with_index_path<P: AsRef<Path>, Q: AsRef<Path>>(path: P, index_path: Q, codec: C) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            origin: IndexOrigin::Path(index_path.as_ref().to_path_buf()),
            codec,
            state: IndexState::Unloaded,
        }
    }

    /// Creates a reader around an index that is already in memory
    pub fn with_index<P: AsRef<Path>>(path: P, index: TileIndex, codec: C) -> Self {
        let index = Arc::new(index);
        Self {
            path: path.as_ref().to_path_buf(),
            origin: IndexOrigin::Memory(index.clone()),
            codec,
            state: IndexState::Loaded(index),
        }
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the tile index, loading it on first call
    ///
    /// A missing index yields [`Error::IndexUnavailable`]. A corrupt index yields the
    /// decoding error once; afterwards the reader reports it as unavailable until
    /// [`FeatureSource::reload`] is called.
    pub fn index(&mut self) -> Result<Arc<TileIndex>> {
        match &self.state {
            IndexState::Loaded(index) => return Ok(index.clone()),
            IndexState::Closed => return Err(Error::Closed),
            IndexState::Unavailable => return Err(self.unavailable()),
            IndexState::Unloaded => {}
        }
        let index = match &self.origin {
            IndexOrigin::Memory(index) => index.clone(),
            IndexOrigin::Path(index_path) => {
                if !index_path.exists() {
                    self.state = IndexState::Unavailable;
                    return Err(self.unavailable());
                }
                match TileIndex::from_path(index_path) {
                    Ok(index) => {
                        tracing::debug!(
                            "loaded tile index {:?}: {} sequences",
                            index_path,
                            index.n_sequences()
                        );
                        Arc::new(index)
                    }
                    Err(e) => {
                        self.state = IndexState::Unavailable;
                        return Err(e);
                    }
                }
            }
        };
        self.state = IndexState::Loaded(index.clone());
        Ok(index)
    }

    /// Returns true if range queries are possible on this reader
    pub fn has_index(&mut self) -> bool {
        self.index().is_ok()
    }

    /// Returns the records overlapping `start..end` on `sequence`
    ///
    /// Shorthand for [`query_with`](Self::query_with) in overlap mode.
    pub fn query_overlapping(&mut self, sequence: &str, start: i64, end: i64) -> Result<Option<FileRecordIter<C>>> {
        self.query_with(sequence, start, end, false)
    }

    /// Returns the records lying entirely within `start..end` on `sequence`
    pub fn query_contained(&mut self, sequence: &str, start: i64, end: i64) -> Result<Option<FileRecordIter<C>>> {
        self.query_with(sequence, start, end, true)
    }

    /// Seeks to the tile covering `start` and streams the matching records
    ///
    /// In overlap mode the seek position is moved back by the longest feature recorded
    /// for the sequence, so records starting before `start` but reaching into the range
    /// are not missed. Returns `Ok(None)` if the index has no entry for `sequence`.
    pub fn query_with(
        &mut self,
        sequence: &str,
        start: i64,
        end: i64,
        contained_only: bool,
    ) -> Result<Option<FileRecordIter<C>>> {
        let index = self.index()?;
        let Some(sequence_index) = index.sequence(sequence) else {
            return Ok(None);
        };

        let adjustment = if contained_only {
            0
        } else {
            i64::from(sequence_index.longest_feature())
        };
        let tile_number = index.tile_number_for(start.saturating_sub(adjustment).max(0));
        let Some(tile) = sequence_index.tile(tile_number) else {
            return Ok(None);
        };
        tracing::trace!(
            "query {sequence}:{start}-{end} seeking tile {tile_number} at byte {}",
            tile.start_position
        );

        let stream = self.open_at(tile.start_position)?;
        let filter = RangeFilter {
            sequence: sequence.to_string(),
            start,
            end,
            contained_only,
        };
        Ok(Some(RecordIter::filtered(stream, filter)))
    }

    fn open_at(&self, offset: u64) -> Result<RecordStream<BufReader<File>, C>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(RecordStream::at_offset(
            BufReader::new(file),
            self.codec.clone(),
            offset,
        ))
    }

    fn unavailable(&self) -> Error {
        match &self.origin {
            IndexOrigin::Path(index_path) => Error::IndexUnavailable(index_path.clone()),
            IndexOrigin::Memory(_) => Error::IndexUnavailable(self.path.clone()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if matches!(self.state, IndexState::Closed) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl<C: RecordCodec> FeatureSource for IndexedReader<C> {
    type Record = C::Record;
    type Iter = FileRecordIter<C>;

    fn query(&mut self, sequence: &str, start: i64, end: i64) -> Result<Option<Self::Iter>> {
        self.query_with(sequence, start, end, false)
    }

    fn iter(&mut self) -> Result<Self::Iter> {
        self.ensure_open()?;
        Ok(RecordIter::unfiltered(self.open_at(0)?))
    }

    fn sequence_names(&mut self) -> Result<Vec<String>> {
        self.ensure_open()?;
        match self.index() {
            Ok(index) => return Ok(index.sequence_names().map(str::to_string).collect()),
            // only a missing index falls back to scanning the data
            Err(Error::IndexUnavailable(_)) => {}
            Err(e) => return Err(e),
        }
        let mut names: Vec<String> = Vec::new();
        for record in self.iter()? {
            let record = record?;
            if names.last().map(String::as_str) != Some(record.sequence()) {
                names.push(record.sequence().to_string());
            }
        }
        Ok(names)
    }

    fn reload(&mut self) -> Result<()> {
        self.state = match &self.origin {
            IndexOrigin::Memory(index) => IndexState::Loaded(index.clone()),
            IndexOrigin::Path(_) => IndexState::Unloaded,
        };
        tracing::debug!("reader for {:?} reset, index will be reloaded", self.path);
        Ok(())
    }

    fn close(&mut self) {
        self.state = IndexState::Closed;
    }
}
