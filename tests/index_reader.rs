use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tilequery::{
    index::{TileDescriptor, TileIndex, TileIndexBuilder},
    BedCodec, Error, Feature, FeatureSource, IndexError, IndexedReader, Interval,
};

/// Fixed-width lines make byte offsets easy to reason about: every line is 21 bytes
const BED: &str = "chr1\t0000100\t0000200\n\
                   chr1\t0000990\t0001010\n\
                   chr1\t0001200\t0001300\n\
                   chr1\t0001600\t0001700\n\
                   chr1\t0002400\t0002550\n\
                   chr1\t0002600\t0002700\n\
                   chr1\t0003100\t0003200\n\
                   chr2\t0000010\t0000020\n";
const LINE: u64 = 21;

fn write_fixture(dir: &Path, contents: &str) -> Result<PathBuf> {
    let data = dir.join("features.bed");
    let mut file = std::fs::File::create(&data)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(data)
}

fn index_fixture(data: &Path, tile_width: u32) -> Result<TileIndex> {
    let index = TileIndexBuilder::new(tile_width).index_file(data, BedCodec::new())?;
    index.save_to_path(TileIndex::index_path_for(data))?;
    Ok(index)
}

#[test]
fn index_round_trip() -> Result<()> {
    let mut index = TileIndex::new(1000);
    index.add("chr1", 100, 5, 50);
    index.add("chr1", 200, 10, 50);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("manual.tix");
    index.save_to_path(&path)?;
    let loaded = TileIndex::from_path(&path)?;

    let chr1 = loaded.sequence("chr1").expect("chr1 present");
    assert_eq!(loaded.tile_width(), 1000);
    assert_eq!(chr1.n_tiles(), 2);
    assert_eq!(
        chr1.tiles(),
        &[TileDescriptor::new(100, 5), TileDescriptor::new(200, 10)]
    );
    assert_eq!(chr1.longest_feature(), 50);
    Ok(())
}

#[test]
fn clamped_tile_lookup() {
    let mut index = TileIndex::new(1000);
    index.add("chr1", 100, 5, 50);
    index.add("chr1", 200, 10, 50);
    assert_eq!(
        index.tile_definition_for("chr1", 999),
        Some(TileDescriptor::new(200, 10))
    );
    assert_eq!(index.tile_definition_for("chr9", 0), None);
}

#[test]
fn built_index_offsets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data = write_fixture(dir.path(), BED)?;
    let index = index_fixture(&data, 1000)?;

    let chr1 = index.sequence("chr1").expect("chr1 present");
    let offsets: Vec<u64> = chr1.tiles().iter().map(|t| t.start_position).collect();
    let counts: Vec<u32> = chr1.tiles().iter().map(|t| t.count).collect();
    assert_eq!(offsets, vec![0, 2 * LINE, 4 * LINE, 6 * LINE]);
    assert_eq!(counts, vec![2, 2, 2, 1]);
    assert_eq!(chr1.longest_feature(), 150);
    assert_eq!(
        index.tile_definition_for("chr2", 0),
        Some(TileDescriptor::new(7 * LINE, 1))
    );

    let reloaded = TileIndex::from_path(TileIndex::index_path_for(&data))?;
    assert_eq!(reloaded.sequence("chr1"), index.sequence("chr1"));
    Ok(())
}

#[test]
fn concrete_tile_scenario() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data = write_fixture(dir.path(), BED)?;
    index_fixture(&data, 1000)?;

    let mut reader = IndexedReader::new(&data, BedCodec::new());
    let mut records = reader
        .query_contained("chr1", 1500, 2500)?
        .expect("chr1 indexed");
    // nothing decoded yet: positioned at the byte offset of tile 1
    assert_eq!(records.offset(), 2 * LINE);

    let starts = records
        .by_ref()
        .map(|r| r.map(|r| r.start()))
        .collect::<tilequery::Result<Vec<_>>>()?;
    assert_eq!(starts, vec![1600]);
    // decoding stopped right after the first record starting past the range
    assert_eq!(records.offset(), 6 * LINE);
    assert!(records.is_finished());
    Ok(())
}

#[test]
fn containment_versus_overlap() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data = write_fixture(dir.path(), BED)?;
    index_fixture(&data, 1000)?;
    let mut reader = IndexedReader::new(&data, BedCodec::new());

    let overlapping: Vec<Interval> = reader
        .query_overlapping("chr1", 1000, 2000)?
        .into_iter()
        .flatten()
        .collect::<tilequery::Result<_>>()?;
    assert!(overlapping.iter().any(|r| r.start() == 990 && r.end() == 1010));

    let contained: Vec<Interval> = reader
        .query_contained("chr1", 1000, 2000)?
        .into_iter()
        .flatten()
        .collect::<tilequery::Result<_>>()?;
    assert!(contained.iter().all(|r| r.start() != 990));
    assert_eq!(contained.len(), 2);

    let inside: Vec<Interval> = reader
        .query_contained("chr1", 900, 2000)?
        .into_iter()
        .flatten()
        .collect::<tilequery::Result<_>>()?;
    assert_eq!(inside.first().map(|r| r.start()), Some(990));
    Ok(())
}

#[test]
fn truncated_index_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data = write_fixture(dir.path(), BED)?;
    index_fixture(&data, 1000)?;
    let index_path = TileIndex::index_path_for(&data);

    let bytes = std::fs::read(&index_path)?;
    // cut inside the tile list of chr1
    std::fs::write(&index_path, &bytes[..4 + 2 + 4 + 4 + 4 + 12 + 6])?;
    assert!(matches!(
        TileIndex::from_path(&index_path),
        Err(Error::Index(IndexError::Truncated { .. }))
    ));

    // a cut exactly at a sequence boundary just loses the later sequences
    let chr1_len = 4 + 2 + 4 + 4 + 4 + 4 * 12;
    std::fs::write(&index_path, &bytes[..chr1_len])?;
    let partial = TileIndex::from_path(&index_path)?;
    assert!(partial.contains("chr1"));
    assert!(!partial.contains("chr2"));

    let mut reader = IndexedReader::new(&data, BedCodec::new());
    assert!(reader.query("chr2", 0, 100)?.is_none());
    Ok(())
}

#[test]
fn unsorted_file_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data = write_fixture(dir.path(), "chr1\t500\t600\nchr1\t100\t200\n")?;
    let result = TileIndexBuilder::new(100).index_file(&data, BedCodec::new());
    assert!(matches!(
        result,
        Err(Error::Index(IndexError::UnsortedInput { .. }))
    ));
    Ok(())
}
