use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use auto_impl::auto_impl;

use crate::codec::{RecordCodec, RecordStream};
use crate::error::{Error, Result};
use crate::record::Feature;

/// Core trait for anything that can answer interval queries over features
///
/// Both the [`IndexedReader`](crate::IndexedReader) and the in-memory fallback
/// implement it, and the [`TiledCache`](crate::TiledCache) wraps any implementor.
/// Coordinates are 0-based half-open.
#[auto_impl(&mut, Box)]
pub trait FeatureSource {
    /// The record type produced by this source
    type Record: Feature;

    /// The iterator returned by queries and full scans
    type Iter: Iterator<Item = Result<Self::Record>>;

    /// Returns the records on `sequence` overlapping `start..end`, in start order
    ///
    /// `Ok(None)` means the sequence is unknown to this source.
    fn query(&mut self, sequence: &str, start: i64, end: i64) -> Result<Option<Self::Iter>>;

    /// Returns every record of the source in file order
    fn iter(&mut self) -> Result<Self::Iter>;

    /// Returns the names of all sequences that have records
    fn sequence_names(&mut self) -> Result<Vec<String>>;

    /// Re-reads the underlying data, for instance after the file changed on disk
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases the underlying data; later queries may fail
    fn close(&mut self) {}
}

/// A fully materialized, non-indexed feature source
///
/// This is the fallback for files whose tile index is missing or corrupt: the whole
/// file is scanned once and queries are answered from memory with a binary search.
#[derive(Debug, Clone)]
pub struct MemorySource<C: RecordCodec> {
    path: Option<PathBuf>,
    codec: C,
    names: Vec<String>,
    records: HashMap<String, SequenceRecords<C::Record>>,
    closed: bool,
}

#[derive(Debug, Clone)]
struct SequenceRecords<F> {
    /// Sorted by start coordinate
    records: Vec<F>,
    longest: i64,
}

impl<C: RecordCodec> MemorySource<C>
where
    C::Record: Clone,
{
    /// Collects all records from an arbitrary reader
    pub fn from_reader<R: BufRead>(reader: R, codec: C) -> Result<Self> {
        let mut source = Self {
            path: None,
            codec: codec.clone(),
            names: Vec::new(),
            records: HashMap::new(),
            closed: false,
        };
        source.ingest(RecordStream::new(reader, codec))?;
        Ok(source)
    }

    /// Collects all records from the file at `path`; `reload` re-reads it
    pub fn from_path<P: AsRef<Path>>(path: P, codec: C) -> Result<Self> {
        let reader = File::open(path.as_ref()).map(BufReader::new)?;
        let mut source = Self::from_reader(reader, codec)?;
        source.path = Some(path.as_ref().to_path_buf());
        Ok(source)
    }

    /// Builds a source from records already in memory
    pub fn from_records<I: IntoIterator<Item = C::Record>>(records: I, codec: C) -> Self {
        let mut source = Self {
            path: None,
            codec,
            names: Vec::new(),
            records: HashMap::new(),
            closed: false,
        };
        records.into_iter().for_each(|record| source.push(record));
        source.sort();
        source
    }

    /// Number of records held in memory
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.records.values().map(|seq| seq.records.len()).sum()
    }

    fn ingest<I: Iterator<Item = Result<C::Record>>>(&mut self, stream: I) -> Result<()> {
        for record in stream {
            self.push(record?);
        }
        self.sort();
        Ok(())
    }

    fn push(&mut self, record: C::Record) {
        if !self.records.contains_key(record.sequence()) {
            self.names.push(record.sequence().to_string());
        }
        let entry = self
            .records
            .entry(record.sequence().to_string())
            .or_insert_with(|| SequenceRecords {
                records: Vec::new(),
                longest: 0,
            });
        entry.longest = entry.longest.max(record.len());
        entry.records.push(record);
    }

    fn sort(&mut self) {
        self.records
            .values_mut()
            .for_each(|seq| seq.records.sort_by_key(|r| r.start()));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl<C: RecordCodec> FeatureSource for MemorySource<C>
where
    C::Record: Clone,
{
    type Record = C::Record;
    type Iter = std::vec::IntoIter<Result<C::Record>>;

    fn query(&mut self, sequence: &str, start: i64, end: i64) -> Result<Option<Self::Iter>> {
        self.ensure_open()?;
        let Some(seq) = self.records.get(sequence) else {
            return Ok(None);
        };
        let from = start.saturating_sub(seq.longest);
        let first = seq.records.partition_point(|r| r.start() < from);
        let hits: Vec<Result<C::Record>> = seq.records[first..]
            .iter()
            .take_while(|r| r.start() < end || (r.start() == start && start == end))
            .filter(|r| r.overlaps(start, end))
            .cloned()
            .map(Ok)
            .collect();
        Ok(Some(hits.into_iter()))
    }

    fn iter(&mut self) -> Result<Self::Iter> {
        self.ensure_open()?;
        let all: Vec<Result<C::Record>> = self
            .names
            .iter()
            .filter_map(|name| self.records.get(name))
            .flat_map(|seq| seq.records.iter().cloned().map(Ok))
            .collect();
        Ok(all.into_iter())
    }

    fn sequence_names(&mut self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.names.clone())
    }

    fn reload(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        // a failed reload leaves the previous records in place
        let fresh = Self::from_path(&path, self.codec.clone())?;
        *self = fresh;
        tracing::debug!("reloaded {} records from {:?}", self.n_records(), path);
        Ok(())
    }

    fn close(&mut self) {
        self.names.clear();
        self.records.clear();
        self.closed = true;
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{BedCodec, Interval};

    fn source() -> MemorySource<BedCodec> {
        let records = vec![
            Interval::new("chr1", 500, 600),
            Interval::new("chr1", 0, 3000),
            Interval::new("chr1", 990, 1010),
            Interval::new("chr2", 10, 20),
        ];
        MemorySource::from_records(records, BedCodec::new())
    }

    fn starts<I: Iterator<Item = Result<Interval>>>(iter: I) -> Result<Vec<i64>> {
        iter.map(|r| r.map(|r| r.start())).collect()
    }

    #[test]
    fn test_query_overlaps() -> Result<()> {
        let mut source = source();
        let hits = starts(source.query("chr1", 1000, 2000)?.unwrap())?;
        assert_eq!(hits, vec![0, 990]);
        let hits = starts(source.query("chr1", 550, 560)?.unwrap())?;
        assert_eq!(hits, vec![0, 500]);
        assert!(source.query("chr3", 0, 10)?.is_none());
        Ok(())
    }

    #[test]
    fn test_iter_and_names() -> Result<()> {
        let mut source = source();
        assert_eq!(source.sequence_names()?, vec!["chr1", "chr2"]);
        assert_eq!(starts(source.iter()?)?, vec![0, 500, 990, 10]);
        assert_eq!(source.n_records(), 4);
        Ok(())
    }

    #[test]
    fn test_close() {
        let mut source = source();
        source.close();
        assert!(matches!(source.query("chr1", 0, 10), Err(Error::Closed)));
    }

    #[test]
    fn test_failed_reload_keeps_records() -> anyhow::Result<()> {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"chr1\t100\t200\nchr1\t300\t400\nchr1\t500\t600\n")?;
        file.flush()?;
        let mut source = MemorySource::from_path(file.path(), BedCodec::new())?;

        std::fs::write(file.path(), "chr1\t100\t200\nchr1\tBAD\t400\nchr1\t500\t600\n")?;
        assert!(matches!(source.reload(), Err(Error::Read(_))));
        let hits = starts(source.query("chr1", 0, 1000)?.unwrap())?;
        assert_eq!(hits, vec![100, 300, 500]);

        std::fs::write(file.path(), "chr1\t700\t800\n")?;
        source.reload()?;
        let hits = starts(source.query("chr1", 0, 1000)?.unwrap())?;
        assert_eq!(hits, vec![700]);
        Ok(())
    }

    #[test]
    fn test_boxed_source() -> Result<()> {
        let mut boxed: Box<MemorySource<BedCodec>> = Box::new(source());
        let hits = starts(FeatureSource::query(&mut boxed, "chr2", 0, 15)?.unwrap())?;
        assert_eq!(hits, vec![10]);
        Ok(())
    }
}
