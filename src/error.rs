use std::path::PathBuf;

/// Custom Result type for tilequery operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the tilequery library, encompassing all possible error cases
/// that can occur while indexing, reading, or caching features.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to building, reading, or writing a tile index
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Errors that occur while decoding records from a source
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Invalid cache or index configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standard I/O errors from the Rust standard library
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A range query was requested on a file that has no tile index
    ///
    /// Full sequential scans remain available on the same reader.
    ///
    /// # Arguments
    /// * `PathBuf` - The index path that was expected to exist
    #[error("No tile index available at {0:?}; only full scans are supported")]
    IndexUnavailable(PathBuf),

    /// The source was closed and can no longer be queried
    #[error("Source has been closed")]
    Closed,
}

/// Errors specific to tile index construction and (de)serialization
///
/// Any of these encountered while loading makes the index unusable for that file;
/// callers are expected to rebuild the index or fall back to non-indexed access.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The index ended in the middle of a sequence record
    ///
    /// # Fields
    /// * `sequence` - The sequence being read when the stream ended (empty if the name itself was cut)
    /// * `section` - Which part of the record was incomplete
    #[error("Tile index truncated while reading {section} of sequence {sequence:?}")]
    Truncated {
        sequence: String,
        section: &'static str,
    },

    /// A sequence name is too long to be stored with a 16-bit length prefix
    ///
    /// # Arguments
    /// * `usize` - The length of the offending name in bytes
    #[error("Sequence name of {0} bytes exceeds the maximum storable length")]
    NameTooLong(usize),

    /// Records were not sorted by start coordinate within a sequence
    #[error("Input is not sorted on {sequence}: start {found} follows {previous}")]
    UnsortedInput {
        sequence: String,
        previous: i64,
        found: i64,
    },

    /// A sequence appeared again after records of another sequence
    ///
    /// # Arguments
    /// * `String` - The name of the sequence that reappeared
    #[error("Records for sequence {0:?} are not contiguous in the input")]
    SequenceNotContiguous(String),
}

/// Errors that can occur while decoding records
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// A text line could not be parsed into a record
    ///
    /// # Fields
    /// * `line` - The 1-based line number relative to where decoding began
    /// * `reason` - A short description of the problem
    #[error("Malformed record at line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    /// A record's coordinates do not describe a valid half-open interval
    #[error("Invalid record coordinates: start {start} > end {end}")]
    InvalidCoordinates { start: i64, end: i64 },
}

/// Errors raised when validating configuration values
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The cache was configured to hold no bins
    #[error("Cache capacity must be at least one bin")]
    ZeroCapacity,

    /// A negative bin size was provided (zero is the whole-sequence sentinel)
    ///
    /// # Arguments
    /// * `i64` - The rejected bin size
    #[error("Bin size must not be negative: {0}")]
    NegativeBinSize(i64),

    /// A negative huge-bin threshold was provided
    ///
    /// # Arguments
    /// * `i64` - The rejected threshold
    #[error("Huge bin threshold must not be negative: {0}")]
    NegativeThreshold(i64),
}
