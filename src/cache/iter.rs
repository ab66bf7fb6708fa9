use std::{sync::Arc, vec};

use crate::record::Feature;

/// Iterator over the records of a cached query
///
/// Holds shared references to the cached records and no lock, so it may outlive
/// later changes to the cache. Records are trimmed to the exact query bounds.
#[derive(Debug)]
pub struct CachedIter<F> {
    records: vec::IntoIter<Arc<F>>,
    start: i64,
    end: i64,
    finished: bool,
}
impl<F: Feature> CachedIter<F> {
    pub(crate) fn new(records: Vec<Arc<F>>, start: i64, end: i64) -> Self {
        Self {
            records: records.into_iter(),
            start,
            end,
            finished: false,
        }
    }
}

/// True once a record starts at or beyond the end of `start..end`
fn is_past_end<F: Feature>(record: &F, start: i64, end: i64) -> bool {
    if start == end {
        return record.start() > end;
    }
    record.start() >= end
}

impl<F: Feature> Iterator for CachedIter<F> {
    type Item = Arc<F>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let (start, end) = (self.start, self.end);
        for record in self.records.by_ref() {
            if is_past_end(&record, start, end) {
                break;
            }
            if record.overlaps(start, end) {
                return Some(record);
            }
        }
        self.finished = true;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        (0, self.records.size_hint().1)
    }
}

impl<F: Feature> std::iter::FusedIterator for CachedIter<F> {}
