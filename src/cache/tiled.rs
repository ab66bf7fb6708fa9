use std::{mem, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;

use super::bin::{bin_key, bin_number, partition, Bin};
use super::iter::CachedIter;
use crate::error::{ConfigError, Error, Result};
use crate::source::FeatureSource;

/// Default width of a cache bin
pub const DEFAULT_BIN_SIZE: i64 = 16_000;

/// Default number of bins kept in memory
pub const DEFAULT_MAX_BINS: usize = 64;

/// Bin size at or above which a miss on the first bin of a query empties the cache
pub const DEFAULT_HUGE_BIN_THRESHOLD: i64 = 50_000_000;

/// Counters describing how a [`TiledCache`] has been used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Bins found loaded in the cache
    pub hits: u64,
    /// Bins that had to be fetched
    pub misses: u64,
    /// Queries sent to the underlying source
    pub fetches: u64,
}

/// A builder for [`TiledCache`] instances
///
/// # Examples
///
/// ```
/// use tilequery::{BedCodec, MemorySource, TiledCacheBuilder};
///
/// let bed = "chr1\t100\t200\nchr1\t15990\t16100\n";
/// let source = MemorySource::from_reader(bed.as_bytes(), BedCodec::new()).unwrap();
/// let cache = TiledCacheBuilder::default()
///     .bin_size(16_000)
///     .max_bins(32)
///     .build(source)
///     .unwrap();
///
/// let hits = cache.query("chr1", 15_000, 17_000).unwrap().unwrap();
/// assert_eq!(hits.count(), 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TiledCacheBuilder {
    bin_size: i64,
    max_bins: usize,
    huge_bin_threshold: i64,
}
impl Default for TiledCacheBuilder {
    fn default() -> Self {
        Self {
            bin_size: DEFAULT_BIN_SIZE,
            max_bins: DEFAULT_MAX_BINS,
            huge_bin_threshold: DEFAULT_HUGE_BIN_THRESHOLD,
        }
    }
}
impl TiledCacheBuilder {
    /// Sets the bin width; 0 caches each sequence as a single bin
    #[must_use]
    pub fn bin_size(mut self, bin_size: i64) -> Self {
        self.bin_size = bin_size;
        self
    }

    /// Sets the number of bins kept before the least recently used one is evicted
    #[must_use]
    pub fn max_bins(mut self, max_bins: usize) -> Self {
        self.max_bins = max_bins;
        self
    }

    #[must_use]
    pub fn huge_bin_threshold(mut self, threshold: i64) -> Self {
        self.huge_bin_threshold = threshold;
        self
    }

    /// Validates the configuration and wraps `source`
    pub fn build<S: FeatureSource>(self, source: S) -> Result<TiledCache<S>> {
        if self.bin_size < 0 {
            return Err(ConfigError::NegativeBinSize(self.bin_size).into());
        }
        if self.huge_bin_threshold < 0 {
            return Err(ConfigError::NegativeThreshold(self.huge_bin_threshold).into());
        }
        let capacity = NonZeroUsize::new(self.max_bins).ok_or(ConfigError::ZeroCapacity)?;
        Ok(TiledCache {
            state: Mutex::new(CacheState {
                source,
                bins: LruCache::new(capacity),
                bin_size: self.bin_size,
                stats: CacheStats::default(),
                closed: false,
            }),
            huge_bin_threshold: self.huge_bin_threshold,
        })
    }
}

/// Everything guarded by the cache lock
struct CacheState<S: FeatureSource> {
    source: S,
    bins: LruCache<String, Arc<Bin<S::Record>>>,
    bin_size: i64,
    stats: CacheStats,
    closed: bool,
}
impl<S: FeatureSource> CacheState<S> {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Fetches a run of consecutive unloaded bins with one source query
    ///
    /// The run is drained; the loaded bins are inserted into the cache and returned in
    /// order. On error nothing from the run is cached.
    fn load_run(&mut self, sequence: &str, run: &mut Vec<(String, Bin<S::Record>)>) -> Result<Vec<Arc<Bin<S::Record>>>> {
        let pending = mem::take(run);
        let (Some((_, first)), Some((_, last))) = (pending.first(), pending.last()) else {
            return Ok(Vec::new());
        };
        let (from, to) = (first.start(), last.end());
        tracing::debug!(
            "fetching {sequence}:{from}-{to} for bins {}..={}",
            first.number(),
            last.number()
        );
        self.stats.fetches += 1;

        let records = match self.source.query(sequence, from, to)? {
            Some(iter) => iter.collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let (keys, mut bins): (Vec<String>, Vec<Bin<S::Record>>) = pending.into_iter().unzip();
        partition(&mut bins, records);

        let mut loaded = Vec::with_capacity(bins.len());
        for (key, bin) in keys.into_iter().zip(bins) {
            let bin = Arc::new(bin);
            self.bins.put(key, bin.clone());
            loaded.push(bin);
        }
        Ok(loaded)
    }
}

/// An LRU cache of fixed-width bins in front of a [`FeatureSource`]
///
/// Each sequence is split into bins of `bin_size` bases. A query resolves the bins it
/// touches, fetches every run of consecutive missing bins from the source with a single
/// query, and files each fetched record under the bin it starts in (contained) and
/// under every later bin of the run it reaches into (overlapping). Results are then
/// assembled from the overlapping records of the first bin and the contained records
/// of every bin, so each record appears exactly once and in start order.
///
/// All state sits behind one lock, so a cache can be shared between threads through
/// an [`Arc`]. Returned iterators own their records and hold no lock.
pub struct TiledCache<S: FeatureSource> {
    state: Mutex<CacheState<S>>,
    huge_bin_threshold: i64,
}
impl<S: FeatureSource> TiledCache<S> {
    /// Wraps `source` with the default configuration
    pub fn new(source: S) -> Result<Self> {
        TiledCacheBuilder::default().build(source)
    }

    /// Returns the records overlapping `start..end` on `sequence`
    ///
    /// Returns `Ok(None)` for an empty or inverted interval (`start > end`, or a
    /// negative start). A failing fetch returns its error; bins loaded earlier in the
    /// same query remain cached.
    pub fn query(&self, sequence: &str, start: i64, end: i64) -> Result<Option<CachedIter<S::Record>>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if start < 0 || start > end {
            return Ok(None);
        }

        let bin_size = state.bin_size;
        let start_bin = bin_number(start, bin_size);
        let end_bin = bin_number(end, bin_size);

        let mut resolved = Vec::new();
        let mut run = Vec::new();
        for number in start_bin..=end_bin {
            let key = bin_key(sequence, number);
            let cached = state.bins.get(&key).cloned();
            if number == start_bin
                && cached.is_none()
                && self.is_huge(bin_size)
                && !state.bins.is_empty()
            {
                tracing::debug!("clearing {} cached bins before loading a huge bin", state.bins.len());
                state.bins.clear();
            }

            match cached {
                Some(bin) => {
                    debug_assert!(bin.is_loaded());
                    tracing::trace!("bin hit {key}");
                    state.stats.hits += 1;
                    if !run.is_empty() {
                        let loaded = state.load_run(sequence, &mut run)?;
                        resolved.extend(loaded);
                    }
                    resolved.push(bin);
                }
                None => {
                    state.stats.misses += 1;
                    run.push((key, Bin::new(number, bin_size)));
                }
            }
        }
        if !run.is_empty() {
            let loaded = state.load_run(sequence, &mut run)?;
            resolved.extend(loaded);
        }
        drop(state);

        let mut records = Vec::new();
        if let Some(first) = resolved.first() {
            records.extend(first.overlapping().iter().cloned());
        }
        for bin in &resolved {
            records.extend(bin.contained().iter().cloned());
        }
        Ok(Some(CachedIter::new(records, start, end)))
    }

    /// Changes the bin width, discarding all cached bins if it differs from the current one
    pub fn set_bin_size(&self, bin_size: i64) -> Result<()> {
        if bin_size < 0 {
            return Err(ConfigError::NegativeBinSize(bin_size).into());
        }
        let mut state = self.state.lock();
        if state.bin_size != bin_size {
            tracing::debug!("bin size {} -> {bin_size}, clearing cache", state.bin_size);
            state.bins.clear();
            state.bin_size = bin_size;
        }
        Ok(())
    }

    pub fn bin_size(&self) -> i64 {
        self.state.lock().bin_size
    }

    /// Maximum number of bins held at once
    pub fn max_bins(&self) -> usize {
        self.state.lock().bins.cap().get()
    }

    pub fn huge_bin_threshold(&self) -> i64 {
        self.huge_bin_threshold
    }

    /// Discards all cached bins
    pub fn clear(&self) {
        let mut state = self.state.lock();
        tracing::debug!("clearing {} cached bins", state.bins.len());
        state.bins.clear();
    }

    /// Number of bins currently cached
    pub fn len(&self) -> usize {
        self.state.lock().bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().bins.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    /// Names of the sequences known to the source
    pub fn sequence_names(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.source.sequence_names()
    }

    /// Discards all cached bins and reloads the source
    pub fn reload(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.bins.clear();
        state.source.reload()
    }

    /// Discards all cached bins and closes the source
    ///
    /// Later queries fail with [`Error::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.bins.clear();
        state.source.close();
        state.closed = true;
    }

    fn is_huge(&self, bin_size: i64) -> bool {
        bin_size == 0 || bin_size >= self.huge_bin_threshold
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{BedCodec, Feature, Interval, MemorySource};

    /// Source wrapper recording every range it is asked for
    struct Recording<S> {
        inner: S,
        queries: Vec<(String, i64, i64)>,
        /// Queries from this position on fail
        fail_from: usize,
    }
    impl<S> Recording<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                queries: Vec::new(),
                fail_from: usize::MAX,
            }
        }
    }
    impl<S: FeatureSource> FeatureSource for Recording<S> {
        type Record = S::Record;
        type Iter = S::Iter;

        fn query(&mut self, sequence: &str, start: i64, end: i64) -> Result<Option<Self::Iter>> {
            self.queries.push((sequence.to_string(), start, end));
            if self.queries.len() > self.fail_from {
                return Err(std::io::Error::other("source failure").into());
            }
            self.inner.query(sequence, start, end)
        }

        fn iter(&mut self) -> Result<Self::Iter> {
            self.inner.iter()
        }

        fn sequence_names(&mut self) -> Result<Vec<String>> {
            self.inner.sequence_names()
        }
    }

    fn source() -> MemorySource<BedCodec> {
        MemorySource::from_records(
            vec![
                Interval::new("chr1", 100, 200),
                Interval::new("chr1", 990, 1010),
                Interval::new("chr1", 1500, 3500),
                Interval::new("chr1", 2000, 2000),
                Interval::new("chr1", 2999, 3001),
                Interval::new("chr2", 50, 60),
            ],
            BedCodec::new(),
        )
    }

    fn cache(bin_size: i64) -> TiledCache<MemorySource<BedCodec>> {
        TiledCacheBuilder::default()
            .bin_size(bin_size)
            .build(source())
            .unwrap()
    }

    fn starts(iter: Option<CachedIter<Interval>>) -> Vec<i64> {
        iter.into_iter().flatten().map(|r| r.start()).collect()
    }

    #[test]
    fn test_query_across_bins() -> Result<()> {
        let cache = cache(1000);
        assert_eq!(starts(cache.query("chr1", 950, 2500)?), vec![990, 1500, 2000]);
        assert_eq!(starts(cache.query("chr1", 3000, 3100)?), vec![1500, 2999]);
        assert_eq!(starts(cache.query("chr2", 0, 1000)?), vec![50]);
        assert!(starts(cache.query("chr3", 0, 1000)?).is_empty());
        Ok(())
    }

    #[test]
    fn test_inverted_interval() -> Result<()> {
        let cache = cache(1000);
        assert!(cache.query("chr1", 500, 400)?.is_none());
        assert!(cache.query("chr1", -5, 400)?.is_none());
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_query_at_max_coordinate() -> Result<()> {
        let cache = cache(1000);
        assert!(starts(cache.query("chr1", i64::MAX, i64::MAX)?).is_empty());
        assert!(starts(cache.query("chr1", i64::MAX - 10, i64::MAX)?).is_empty());
        Ok(())
    }

    #[test]
    fn test_zero_length_record_at_query_start() -> Result<()> {
        let cache = cache(1000);
        assert_eq!(starts(cache.query("chr1", 2000, 2100)?), vec![1500, 2000]);
        assert_eq!(starts(cache.query("chr1", 2001, 2100)?), vec![1500]);
        Ok(())
    }

    #[test]
    fn test_coalesced_fetch() -> Result<()> {
        let cache = TiledCacheBuilder::default()
            .bin_size(1000)
            .build(Recording::new(source()))?;
        cache.query("chr1", 2100, 2200)?;
        cache.query("chr1", 0, 4500)?;

        let stats = cache.stats();
        assert_eq!(stats.fetches, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(cache.len(), 5);

        let state = cache.state.lock();
        assert_eq!(
            state.source.queries,
            vec![
                ("chr1".to_string(), 2000, 3000),
                ("chr1".to_string(), 0, 2000),
                ("chr1".to_string(), 3000, 5000),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_repeat_query_hits_cache() -> Result<()> {
        let cache = TiledCacheBuilder::default()
            .bin_size(1000)
            .build(Recording::new(source()))?;
        let first = starts(cache.query("chr1", 900, 3100)?);
        let second = starts(cache.query("chr1", 900, 3100)?);
        assert_eq!(first, second);
        assert_eq!(cache.stats().fetches, 1);
        assert_eq!(cache.stats().hits, 4);
        Ok(())
    }

    #[test]
    fn test_fetch_error_keeps_earlier_bins() -> Result<()> {
        let cache = TiledCacheBuilder::default()
            .bin_size(1000)
            .build(Recording::new(source()))?;
        cache.query("chr1", 1000, 1500)?;

        // bin 0 is fetched, bin 1 is a hit, the fetch of bins 2..=3 fails
        {
            let mut state = cache.state.lock();
            state.source.fail_from = state.source.queries.len() + 1;
        }
        assert!(cache.query("chr1", 0, 3500).is_err());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().fetches, 3);

        cache.state.lock().source.fail_from = usize::MAX;
        assert_eq!(starts(cache.query("chr1", 0, 3500)?), vec![100, 990, 1500, 2000, 2999]);
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.stats().fetches, 4);
        Ok(())
    }

    #[test]
    fn test_set_bin_size() -> Result<()> {
        let cache = cache(1000);
        cache.query("chr1", 0, 2500)?;
        assert_eq!(cache.len(), 3);
        cache.set_bin_size(1000)?;
        assert_eq!(cache.len(), 3);
        cache.set_bin_size(500)?;
        assert!(cache.is_empty());
        assert_eq!(cache.bin_size(), 500);
        assert_eq!(starts(cache.query("chr1", 950, 2500)?), vec![990, 1500, 2000]);
        assert!(matches!(
            cache.set_bin_size(-1),
            Err(Error::Config(ConfigError::NegativeBinSize(-1)))
        ));
        Ok(())
    }

    #[test]
    fn test_huge_bins_clear_cache() -> Result<()> {
        let cache = TiledCacheBuilder::default()
            .bin_size(0)
            .build(source())?;
        assert_eq!(starts(cache.query("chr1", 1800, 2100)?), vec![1500, 2000]);
        assert_eq!(cache.len(), 1);
        assert_eq!(starts(cache.query("chr2", 0, 100)?), vec![50]);
        // the chr1 bin was dropped before chr2 was loaded
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().fetches, 2);

        // a hit on the first bin keeps the cache as is
        assert_eq!(starts(cache.query("chr2", 0, 100)?), vec![50]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().fetches, 2);
        assert_eq!(cache.stats().hits, 1);

        assert_eq!(starts(cache.query("chr1", 1800, 2100)?), vec![1500, 2000]);
        assert_eq!(cache.stats().fetches, 3);
        Ok(())
    }

    #[test]
    fn test_lru_eviction() -> Result<()> {
        let cache = TiledCacheBuilder::default()
            .bin_size(1000)
            .max_bins(2)
            .build(source())?;
        assert_eq!(starts(cache.query("chr1", 0, 3500)?), vec![100, 990, 1500, 2000, 2999]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.max_bins(), 2);
        Ok(())
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            TiledCacheBuilder::default().max_bins(0).build(source()),
            Err(Error::Config(ConfigError::ZeroCapacity))
        ));
        assert!(matches!(
            TiledCacheBuilder::default().bin_size(-10).build(source()),
            Err(Error::Config(ConfigError::NegativeBinSize(-10)))
        ));
        assert!(matches!(
            TiledCacheBuilder::default().huge_bin_threshold(-1).build(source()),
            Err(Error::Config(ConfigError::NegativeThreshold(-1)))
        ));
    }

    #[test]
    fn test_close_and_reload() -> Result<()> {
        let cache = cache(1000);
        cache.query("chr1", 0, 100)?;
        cache.reload()?;
        assert!(cache.is_empty());
        assert_eq!(cache.sequence_names()?, vec!["chr1", "chr2"]);
        cache.close();
        assert!(matches!(cache.query("chr1", 0, 100), Err(Error::Closed)));
        assert!(matches!(cache.sequence_names(), Err(Error::Closed)));
        Ok(())
    }

    #[test]
    fn test_shared_between_threads() -> Result<()> {
        let cache = Arc::new(cache(1000));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || -> Result<Vec<i64>> {
                    let start = i * 500;
                    Ok(starts(cache.query("chr1", start, start + 1500)?))
                })
            })
            .collect();
        for handle in handles {
            let hits = handle.join().expect("thread panicked")?;
            assert!(hits.windows(2).all(|w| w[0] <= w[1]));
        }
        Ok(())
    }
}
