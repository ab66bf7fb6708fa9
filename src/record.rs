use std::fmt;

/// Core trait for every record that can be placed on a genomic coordinate axis
///
/// Coordinates are 0-based and half-open: a feature covers `start()..end()`.
pub trait Feature {
    /// Returns the name of the sequence (chromosome, contig) this record lies on
    fn sequence(&self) -> &str;

    /// Returns the 0-based start coordinate (inclusive)
    fn start(&self) -> i64;

    /// Returns the end coordinate (exclusive)
    fn end(&self) -> i64;

    /// Returns the number of bases this record spans
    fn len(&self) -> i64 {
        self.end() - self.start()
    }

    /// A convenience function to check for zero-length records (e.g. insertion points)
    fn is_empty(&self) -> bool {
        self.end() <= self.start()
    }

    /// Returns true if this record shares at least one base with `start..end`
    ///
    /// A zero-length record sitting exactly on `start` is considered overlapping,
    /// otherwise it could never be returned by any query.
    fn overlaps(&self, start: i64, end: i64) -> bool {
        if self.is_empty() && self.start() == start {
            return true;
        }
        self.start() < end.max(start.saturating_add(1)) && self.end() > start
    }

    /// Returns true if this record lies entirely inside `start..end`
    ///
    /// A zero-length record sitting on `end` lies outside a non-empty interval.
    fn is_contained_in(&self, start: i64, end: i64) -> bool {
        self.start() >= start && self.end() <= end && self.start() < end.max(start.saturating_add(1))
    }
}

impl<F: Feature + ?Sized> Feature for std::sync::Arc<F> {
    fn sequence(&self) -> &str {
        (**self).sequence()
    }
    fn start(&self) -> i64 {
        (**self).start()
    }
    fn end(&self) -> i64 {
        (**self).end()
    }
}

/// A generic genomic interval with an optional name and the remaining raw columns
///
/// This is the record produced by [`BedCodec`](crate::BedCodec).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    sequence: String,
    start: i64,
    end: i64,
    name: Option<String>,
    /// Columns beyond the name, kept verbatim
    extra: Vec<String>,
}
impl Interval {
    #[must_use]
    pub fn new(sequence: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            sequence: sequence.into(),
            start,
            end,
            name: None,
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: Vec<String>) -> Self {
        self.extra = extra;
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn extra(&self) -> &[String] {
        &self.extra
    }
}

impl Feature for Interval {
    fn sequence(&self) -> &str {
        &self.sequence
    }
    fn start(&self) -> i64 {
        self.start
    }
    fn end(&self) -> i64 {
        self.end
    }
}

/// Writes the interval back out as a BED line (without the trailing newline)
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.sequence, self.start, self.end)?;
        if let Some(name) = &self.name {
            write!(f, "\t{name}")?;
        }
        for column in &self.extra {
            write!(f, "\t{column}")?;
        }
        Ok(())
    }
}
