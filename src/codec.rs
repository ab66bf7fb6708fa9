//! Decoding of raw bytes into records
//!
//! Format-specific parsing lives behind the [`RecordCodec`] trait so the index builder,
//! the indexed reader, and any other consumer can stream records without knowing the
//! file format. [`BedCodec`] is the reference implementation for tab-delimited interval
//! text; binary formats plug in the same way.

use std::io::BufRead;

use crate::error::{ReadError, Result};
use crate::record::{Feature, Interval};

/// Trait for decoding one record at a time from a buffered byte stream
///
/// Implementations must leave the reader positioned at the first byte of the next
/// record, so that the number of bytes consumed can be used to compute record offsets.
pub trait RecordCodec: Clone {
    /// The record type produced by this codec
    type Record: Feature;

    /// Decodes the next record from the reader
    ///
    /// # Returns
    ///
    /// * `Ok(Some((record, consumed)))` - The next record and the number of bytes consumed,
    ///   including any skipped header or comment lines
    /// * `Ok(None)` - The stream is exhausted
    /// * `Err(_)` - The bytes could not be read or decoded
    fn decode<R: BufRead>(&mut self, reader: &mut R) -> Result<Option<(Self::Record, usize)>>;
}

/// Codec for BED-like text: `sequence <TAB> start <TAB> end [<TAB> name [<TAB> ...]]`
///
/// Coordinates are 0-based half-open as in the BED convention. Blank lines and lines
/// beginning with `#`, `track`, or `browser` are skipped.
#[derive(Debug, Clone, Default)]
pub struct BedCodec {
    line: String,
    line_number: usize,
}
impl BedCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_skippable(line: &str) -> bool {
        line.is_empty()
            || line.starts_with('#')
            || line.starts_with("track")
            || line.starts_with("browser")
    }

    fn parse_line(line: &str, line_number: usize) -> Result<Interval> {
        let mut fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            fields = line.split_whitespace().collect();
        }
        if fields.len() < 3 {
            return Err(ReadError::MalformedLine {
                line: line_number,
                reason: format!("expected at least 3 columns, found {}", fields.len()),
            }
            .into());
        }
        let parse_coord = |field: &str, what: &str| -> Result<i64> {
            match field.trim().parse::<i64>() {
                Ok(value) if value >= 0 => Ok(value),
                _ => Err(ReadError::MalformedLine {
                    line: line_number,
                    reason: format!("invalid {what} coordinate {field:?}"),
                }
                .into()),
            }
        };
        let start = parse_coord(fields[1], "start")?;
        let end = parse_coord(fields[2], "end")?;
        if start > end {
            return Err(ReadError::InvalidCoordinates { start, end }.into());
        }

        let mut interval = Interval::new(fields[0], start, end);
        if let Some(name) = fields.get(3) {
            interval = interval.with_name(*name);
        }
        if fields.len() > 4 {
            interval = interval.with_extra(fields[4..].iter().map(|s| (*s).to_string()).collect());
        }
        Ok(interval)
    }
}

impl RecordCodec for BedCodec {
    type Record = Interval;

    fn decode<R: BufRead>(&mut self, reader: &mut R) -> Result<Option<(Interval, usize)>> {
        let mut consumed = 0;
        loop {
            self.line.clear();
            let n = reader.read_line(&mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            consumed += n;
            self.line_number += 1;

            let line = self.line.trim_end_matches(['\n', '\r']);
            if Self::is_skippable(line) {
                continue;
            }
            let interval = Self::parse_line(line, self.line_number)?;
            return Ok(Some((interval, consumed)));
        }
    }
}

/// A forward-only stream of records that tracks the byte offset of each record
///
/// The offset starts at whatever position the underlying reader was placed at, which
/// lets the index builder record seek targets and the range reader resume mid-file.
pub struct RecordStream<R: BufRead, C: RecordCodec> {
    reader: R,
    codec: C,
    offset: u64,
    finished: bool,
}
impl<R: BufRead, C: RecordCodec> RecordStream<R, C> {
    /// Creates a stream positioned at the start of the reader
    pub fn new(reader: R, codec: C) -> Self {
        Self::at_offset(reader, codec, 0)
    }

    /// Creates a stream for a reader that has already been positioned at `offset`
    pub fn at_offset(reader: R, codec: C, offset: u64) -> Self {
        Self {
            reader,
            codec,
            offset,
            finished: false,
        }
    }

    /// Returns the byte offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns true once the stream hit its end or an error
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes the next record and returns it along with the offset it started at
    ///
    /// The reported offset is where decoding began, so it may point at skipped
    /// comment lines preceding the record. Seeking there and decoding again yields
    /// the same record.
    pub fn next_record(&mut self) -> Result<Option<(u64, C::Record)>> {
        if self.finished {
            return Ok(None);
        }
        let record_offset = self.offset;
        match self.codec.decode(&mut self.reader) {
            Ok(Some((record, consumed))) => {
                self.offset += consumed as u64;
                Ok(Some((record_offset, record)))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }
}

impl<R: BufRead, C: RecordCodec> Iterator for RecordStream<R, C> {
    type Item = Result<C::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
            .transpose()
            .map(|item| item.map(|(_, record)| record))
    }
}
