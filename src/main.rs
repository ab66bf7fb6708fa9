use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fmt::Display,
    io::{stdout, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilequery::{
    index::{TileIndex, TileIndexBuilder, DEFAULT_TILE_WIDTH},
    BedCodec, Feature, FeatureSource, IndexedReader, Interval, MemorySource, TiledCacheBuilder,
    DEFAULT_BIN_SIZE, DEFAULT_MAX_BINS,
};

#[derive(Debug, Parser)]
#[command(name = "tilequery")]
#[command(about = "Tile-indexed range queries over sorted BED files")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the tile index (`<file>.tix`) of a coordinate-sorted file
    Index {
        path: PathBuf,

        /// Width of a tile in bases; 0 indexes each sequence as one tile
        #[arg(long, default_value_t = DEFAULT_TILE_WIDTH)]
        tile_width: u32,

        /// Where to write the index instead of next to the data file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the records overlapping a range
    Query {
        path: PathBuf,
        sequence: String,
        start: i64,
        end: i64,

        /// Width of a cache bin in bases; 0 caches each sequence as one bin
        #[arg(long, default_value_t = DEFAULT_BIN_SIZE)]
        bin_size: i64,

        /// Number of bins kept in memory
        #[arg(long, default_value_t = DEFAULT_MAX_BINS)]
        max_bins: usize,

        /// Only print records lying entirely inside the range
        #[arg(long)]
        contained: bool,
    },

    /// List the sequences of a file
    Names { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Index {
            path,
            tile_width,
            output,
        } => build_index(&path, tile_width, output),
        Command::Query {
            path,
            sequence,
            start,
            end,
            bin_size,
            max_bins,
            contained,
        } => {
            let builder = TiledCacheBuilder::default()
                .bin_size(bin_size)
                .max_bins(max_bins);
            if contained {
                return write_records(contained_records(&path, &sequence, start, end)?);
            }
            let mut reader = IndexedReader::new(&path, BedCodec::new());
            if reader.has_index() {
                query(builder.build(reader)?, &sequence, start, end)
            } else {
                tracing::warn!(
                    "no usable index for {}, loading the whole file",
                    path.display()
                );
                let source = MemorySource::from_path(&path, BedCodec::new())?;
                query(builder.build(source)?, &sequence, start, end)
            }
        }
        Command::Names { path } => {
            let mut reader = IndexedReader::new(&path, BedCodec::new());
            write_records(reader.sequence_names()?)
        }
    }
}

fn build_index(path: &Path, tile_width: u32, output: Option<PathBuf>) -> Result<()> {
    let index = TileIndexBuilder::new(tile_width)
        .index_file(path, BedCodec::new())
        .with_context(|| format!("indexing {}", path.display()))?;
    let output = output.unwrap_or_else(|| TileIndex::index_path_for(path));
    index.save_to_path(&output)?;
    tracing::info!(
        "wrote index of {} sequences to {}",
        index.n_sequences(),
        output.display()
    );
    Ok(())
}

/// Records lying entirely inside `start..end`, from the index or a full scan without one
fn contained_records(path: &Path, sequence: &str, start: i64, end: i64) -> Result<Vec<Interval>> {
    let mut reader = IndexedReader::new(path, BedCodec::new());
    if reader.has_index() {
        let records = reader
            .query_contained(sequence, start, end)
            .with_context(|| format!("contained query on {}", path.display()))?;
        return Ok(records
            .into_iter()
            .flatten()
            .collect::<tilequery::Result<Vec<_>>>()?);
    }

    tracing::warn!("no usable index for {}, scanning the whole file", path.display());
    let mut records = Vec::new();
    for record in reader.iter()? {
        let record = record?;
        if record.sequence() == sequence && record.is_contained_in(start, end) {
            records.push(record);
        }
    }
    Ok(records)
}

fn query<S>(cache: tilequery::TiledCache<S>, sequence: &str, start: i64, end: i64) -> Result<()>
where
    S: FeatureSource,
    S::Record: Display,
{
    let Some(records) = cache.query(sequence, start, end)? else {
        tracing::info!("empty range {sequence}:{start}-{end}");
        return Ok(());
    };
    write_records(records)
}

fn write_records<I: IntoIterator<Item = T>, T: Display>(records: I) -> Result<()> {
    let mut out = BufWriter::new(stdout().lock());
    let mut n = 0usize;
    for record in records {
        writeln!(out, "{record}")?;
        n += 1;
    }
    out.flush()?;
    tracing::debug!("wrote {n} lines");
    Ok(())
}
