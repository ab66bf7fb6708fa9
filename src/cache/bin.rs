use std::sync::Arc;

use crate::record::Feature;

/// Builds the cache key of a bin: `{sequence}_{number}`
pub(crate) fn bin_key(sequence: &str, number: i64) -> String {
    let mut buffer = itoa::Buffer::new();
    let number = buffer.format(number);
    let mut key = String::with_capacity(sequence.len() + 1 + number.len());
    key.push_str(sequence);
    key.push('_');
    key.push_str(number);
    key
}

/// Returns the half-open bounds of bin `number`
///
/// A bin size of 0 means a single bin covering the whole sequence.
pub(crate) fn bin_bounds(number: i64, bin_size: i64) -> (i64, i64) {
    if bin_size == 0 {
        return (0, i64::MAX);
    }
    let start = number.saturating_mul(bin_size);
    (start, start.saturating_add(bin_size))
}

/// Returns the bin number a position falls in
pub(crate) fn bin_number(position: i64, bin_size: i64) -> i64 {
    if bin_size == 0 {
        return 0;
    }
    position.max(0) / bin_size
}

/// One cached window of a sequence
///
/// `contained` holds the records starting inside `start..end`; `overlapping` holds the
/// records starting before `start` that reach into the bin. A record belongs to at most
/// one of the two lists of a given bin.
#[derive(Debug)]
pub(crate) struct Bin<F> {
    number: i64,
    start: i64,
    end: i64,
    loaded: bool,
    contained: Vec<Arc<F>>,
    overlapping: Vec<Arc<F>>,
}
impl<F: Feature> Bin<F> {
    /// Creates an unloaded bin
    pub fn new(number: i64, bin_size: i64) -> Self {
        let (start, end) = bin_bounds(number, bin_size);
        Self {
            number,
            start,
            end,
            loaded: false,
            contained: Vec::new(),
            overlapping: Vec::new(),
        }
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn contained(&self) -> &[Arc<F>] {
        &self.contained
    }

    pub fn overlapping(&self) -> &[Arc<F>] {
        &self.overlapping
    }

    /// True if the record starts inside this bin
    pub fn contains_start(&self, record: &F) -> bool {
        record.start() >= self.start && record.start() < self.end
    }

    /// True if the record starts before this bin and reaches into it
    pub fn is_overlapped_by(&self, record: &F) -> bool {
        record.start() < self.start && record.end() > self.start
    }

    /// Files `record` under this bin if it belongs here, returning true if it did
    fn attribute(&mut self, record: &Arc<F>) -> bool {
        if self.contains_start(record) {
            self.contained.push(record.clone());
            true
        } else if self.is_overlapped_by(record) {
            self.overlapping.push(record.clone());
            true
        } else {
            false
        }
    }

    fn mark_loaded(&mut self) {
        self.loaded = true;
    }
}

/// Distributes fetched records over a run of consecutive unloaded bins
///
/// Each record is filed under every bin of the run it touches: as contained in the bin
/// it starts in and as overlapping in the later ones. Records touching no bin of the run
/// are dropped. Every bin of the run is marked loaded afterwards.
pub(crate) fn partition<F: Feature>(run: &mut [Bin<F>], records: Vec<F>) {
    if run.is_empty() {
        return;
    }
    for record in records {
        let record = Arc::new(record);
        // bins before `origin` end before the record starts
        let origin = run
            .iter()
            .position(|bin| bin.start() > record.start())
            .unwrap_or(run.len())
            .saturating_sub(1);
        for bin in &mut run[origin..] {
            if !bin.attribute(&record) {
                break;
            }
        }
    }
    run.iter_mut().for_each(Bin::mark_loaded);
}
