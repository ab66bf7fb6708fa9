use std::io::BufRead;

use crate::codec::{RecordCodec, RecordStream};
use crate::error::Result;
use crate::record::Feature;

/// Bounds applied to records while streaming a range query
#[derive(Debug, Clone)]
pub(crate) struct RangeFilter {
    pub sequence: String,
    pub start: i64,
    pub end: i64,
    pub contained_only: bool,
}
impl RangeFilter {
    /// True once a record starts at or beyond the end of the query
    fn is_past_end<F: Feature>(&self, record: &F) -> bool {
        if self.start == self.end {
            return record.start() > self.end;
        }
        record.start() >= self.end
    }

    fn accepts<F: Feature>(&self, record: &F) -> bool {
        if self.contained_only {
            record.is_contained_in(self.start, self.end)
        } else {
            record.overlaps(self.start, self.end)
        }
    }
}

/// Lazy, forward-only iterator over the records of a stream
///
/// For range queries the iterator discards records before the requested interval and
/// ends at the first record that belongs to another sequence or starts past the end of
/// the interval. Up to one record is decoded ahead of the consumer (see [`peek`]).
/// The iterator cannot be restarted; dropping it releases the file handle.
///
/// [`peek`]: RecordIter::peek
pub struct RecordIter<R: BufRead, C: RecordCodec> {
    stream: RecordStream<R, C>,
    filter: Option<RangeFilter>,
    next: Option<C::Record>,
    finished: bool,
}
impl<R: BufRead, C: RecordCodec> RecordIter<R, C> {
    /// Yields every record of the stream
    pub(crate) fn unfiltered(stream: RecordStream<R, C>) -> Self {
        Self {
            stream,
            filter: None,
            next: None,
            finished: false,
        }
    }

    /// Yields the records of the stream that satisfy `filter`
    pub(crate) fn filtered(stream: RecordStream<R, C>, filter: RangeFilter) -> Self {
        Self {
            stream,
            filter: Some(filter),
            next: None,
            finished: false,
        }
    }

    /// Returns the next record without consuming it
    pub fn peek(&mut self) -> Result<Option<&C::Record>> {
        if self.next.is_none() {
            self.next = self.advance().transpose()?;
        }
        Ok(self.next.as_ref())
    }

    /// Returns true once the iterator can no longer produce records
    pub fn is_finished(&self) -> bool {
        self.finished && self.next.is_none()
    }

    /// Byte offset of the next undecoded byte in the underlying stream
    pub fn offset(&self) -> u64 {
        self.stream.offset()
    }

    fn finish(&mut self) {
        self.finished = true;
    }

    /// Decodes forward until a record passes the filter or the range is exhausted
    fn advance(&mut self) -> Option<Result<C::Record>> {
        while !self.finished {
            let record = match self.stream.next_record() {
                Ok(Some((_, record))) => record,
                Ok(None) => {
                    self.finish();
                    return None;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            };

            let Some(filter) = &self.filter else {
                return Some(Ok(record));
            };
            if record.sequence() != filter.sequence || filter.is_past_end(&record) {
                self.finish();
                return None;
            }
            if filter.accepts(&record) {
                return Some(Ok(record));
            }
        }
        None
    }
}

impl<R: BufRead, C: RecordCodec> Iterator for RecordIter<R, C> {
    type Item = Result<C::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.next.take() {
            return Some(Ok(record));
        }
        self.advance()
    }
}
