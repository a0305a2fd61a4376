use std::collections::BTreeSet;

use assert_approx_eq::assert_approx_eq;
use rstest::*;
use squire::data_structs::locus::keys_from_frame;
use squire::prelude::*;
use tempfile::{tempdir, TempDir};

mod common;
use common::*;

#[fixture]
fn workdir() -> TempDir {
    tempdir().expect("Failed to create temporary directory")
}

fn call_keys(calls: &[Call]) -> BTreeSet<LocusKey> {
    calls
        .iter()
        .map(|(chr, start, name, ..)| LocusKey::new(*chr, *start, start + 1, *name))
        .collect()
}

#[rstest]
#[case::small_chunks(3)]
#[case::single_chunk(10_000)]
fn coordinate_index_is_the_sorted_union(
    workdir: TempDir,
    #[case] chunk_size: usize,
) -> anyhow::Result<()> {
    let config = config(chunk_size);
    let samples = (0..3)
        .map(|seed| dedup_calls(synthetic_calls(seed, 60)))
        .collect::<Vec<_>>();

    let mut store = Store::create(&workdir.path().join("run.squire"), false)?;
    for (idx, calls) in samples.iter().enumerate() {
        let path = write_bedmethyl(workdir.path(), &format!("s{idx}"), calls)?;
        ingest_file(&mut store, &path, &format!("s{idx}"), &config)?;
    }
    let rows = build_coordinate_index(&mut store, &config)?;

    let expected = samples.iter().flat_map(|calls| call_keys(calls)).collect::<BTreeSet<_>>();
    let index = keys_from_frame(&read_table(&store, &StoreTable::Coordinates)?)?;
    assert_eq!(rows, expected.len());
    assert_eq!(index, expected.into_iter().collect::<Vec<_>>());
    assert!(index.windows(2).all(|pair| pair[0] < pair[1]));
    Ok(())
}

#[rstest]
fn merge_zero_fills_uncovered_loci(workdir: TempDir) -> anyhow::Result<()> {
    let config = config(2);
    let a = write_bedmethyl(workdir.path(), "a", &[
        ("chr1", 100, "m", 10, 5),
        ("chr2", 50, "m", 4, 4),
        ("chr1", 10, "h", 0, 0),
    ])?;
    let b = write_bedmethyl(workdir.path(), "b", &[
        ("chr1", 100, "m", 20, 2),
        ("chr10", 5, "m", 8, 6),
    ])?;

    let mut store = Store::create(&workdir.path().join("run.squire"), false)?;
    ingest_file(&mut store, &a, "a", &config)?;
    ingest_file(&mut store, &b, "b", &config)?;
    build_coordinate_index(&mut store, &config)?;
    let rows = merge(&mut store, &config)?;
    assert_eq!(rows, 4);

    let merged = read_table(&store, &StoreTable::Merged)?;
    assert_eq!(keys_from_frame(&merged)?, vec![
        LocusKey::new("chr1", 10, 11, "h"),
        LocusKey::new("chr1", 100, 101, "m"),
        LocusKey::new("chr2", 50, 51, "m"),
        LocusKey::new("chr10", 5, 6, "m"),
    ]);
    assert_eq!(u32_values(&merged, "a_read_depth")?, vec![0, 10, 4, 0]);
    assert_eq!(u32_values(&merged, "a_modifications")?, vec![0, 5, 4, 0]);
    assert_eq!(f64_values(&merged, "a_fraction")?, vec![0.0, 50.0, 100.0, 0.0]);
    assert_eq!(u32_values(&merged, "b_read_depth")?, vec![0, 20, 0, 8]);
    assert_eq!(u32_values(&merged, "b_modifications")?, vec![0, 2, 0, 6]);
    assert_eq!(f64_values(&merged, "b_fraction")?, vec![0.0, 10.0, 0.0, 75.0]);

    assert!(!store.has_table(&StoreTable::Sample("a".into())));
    assert!(!store.has_table(&StoreTable::Sample("b".into())));
    assert!(!store.has_table(&StoreTable::Coordinates));
    assert!(store
        .manifest()
        .samples
        .iter()
        .all(|entry| entry.state == SampleState::Merged));

    let reopened = Store::open(store.root())?;
    assert_eq!(reopened.manifest().merged_rows, Some(4));
    Ok(())
}

#[rstest]
fn amending_equals_a_full_build(workdir: TempDir) -> anyhow::Result<()> {
    let config = config(7);
    let files = (0..4)
        .map(|seed| {
            let calls = dedup_calls(synthetic_calls(seed * 5 + 1, 50));
            write_bedmethyl(workdir.path(), &format!("cell{seed}"), &calls)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let full = create_store(&workdir.path().join("full.squire"), &files, false, &config, |_| {})?;

    let incremental_root = workdir.path().join("incremental.squire");
    create_store(&incremental_root, &files[..2], false, &config, |_| {})?;
    add_samples(&incremental_root, &files[2..3], &config, |_| {})?;
    let incremental = add_samples(&incremental_root, &files[3..], &config, |_| {})?;

    let full_merged = read_table(&full, &StoreTable::Merged)?;
    let incremental_merged = read_table(&incremental, &StoreTable::Merged)?;
    assert!(full_merged.equals(&incremental_merged));

    let full_stats = read_table(&full, &StoreTable::Stats)?;
    let incremental_stats = read_table(&incremental, &StoreTable::Stats)?;
    assert!(full_stats.equals(&incremental_stats));
    assert_eq!(full_stats.height(), full_merged.height());
    assert_eq!(
        incremental.manifest().stats.as_ref().map(|s| s.test),
        Some(TestKind::ChiSquaredContingency)
    );
    Ok(())
}

#[rstest]
fn results_do_not_depend_on_workers_or_chunks(workdir: TempDir) -> anyhow::Result<()> {
    let files = (0..3)
        .map(|seed| {
            let calls = dedup_calls(synthetic_calls(seed + 2, 80));
            write_bedmethyl(workdir.path(), &format!("s{seed}"), &calls)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let first = create_store(
        &workdir.path().join("first.squire"),
        &files,
        false,
        &config(5).with_n_workers(1),
        |_| {},
    )?;
    let second = create_store(
        &workdir.path().join("second.squire"),
        &files,
        false,
        &config(64).with_n_workers(4),
        |_| {},
    )?;

    let first_stats = read_table(&first, &StoreTable::Stats)?;
    let second_stats = read_table(&second, &StoreTable::Stats)?;
    assert!(first_stats.equals(&second_stats));

    let keys = keys_from_frame(&first_stats)?;
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    let p_values = f64_values(&first_stats, "p_value")?;
    assert!(p_values.iter().all(|p| (0.0..=1.0).contains(p)));
    Ok(())
}

#[rstest]
fn missing_locus_scores_as_sentinel(workdir: TempDir) -> anyhow::Result<()> {
    let s1 = write_bedmethyl(workdir.path(), "sample1", &[
        ("chr1", 100, "m", 10, 5),
        ("chr1", 200, "m", 10, 1),
    ])?;
    let s2 = write_bedmethyl(workdir.path(), "sample2", &[("chr1", 200, "m", 10, 9)])?;
    let store = create_store(
        &workdir.path().join("run.squire"),
        &[s1, s2],
        false,
        &config(100),
        |_| {},
    )?;

    let locus = LocusKey::new("chr1", 100, 101, "m");
    let merged = read_table(&store, &StoreTable::Merged)?;
    let row = row_of(&merged, &locus)?.expect("locus is merged");
    assert_eq!(u32_values(&merged, "sample2_read_depth")?[row], 0);
    assert_eq!(u32_values(&merged, "sample2_modifications")?[row], 0);
    assert_eq!(f64_values(&merged, "sample2_fraction")?[row], 0.0);

    assert_eq!(p_value_at(&store, &locus)?, SENTINEL_P_VALUE);
    assert!(p_value_at(&store, &LocusKey::new("chr1", 200, 201, "m"))? < 0.01);
    Ok(())
}

#[rstest]
fn contingency_scenarios(workdir: TempDir) -> anyhow::Result<()> {
    let files = [(50, 90), (50, 10), (50, 10)]
        .iter()
        .enumerate()
        .map(|(idx, (same, differing))| {
            write_bedmethyl(workdir.path(), &format!("cell{idx}"), &[
                ("chr1", 1000, "m", 100, *same),
                ("chr1", 2000, "m", 100, *differing),
            ])
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let store = create_store(
        &workdir.path().join("run.squire"),
        &files,
        false,
        &config(1),
        |_| {},
    )?;

    let identical = p_value_at(&store, &LocusKey::new("chr1", 1000, 1001, "m"))?;
    assert_approx_eq!(identical, 1.0, 1e-9);
    let differing = p_value_at(&store, &LocusKey::new("chr1", 2000, 2001, "m"))?;
    assert!(differing < 0.01);
    Ok(())
}

#[rstest]
fn failed_ingestion_publishes_nothing(workdir: TempDir) -> anyhow::Result<()> {
    let path = workdir.path().join("broken.bed");
    let good = bedmethyl_row(&("chr1", 1, "m", 4, 2));
    std::fs::write(&path, format!("{good}\n{good}\nchr1\t5\tsix\n{good}\n"))?;

    let mut store = Store::create(&workdir.path().join("run.squire"), false)?;
    let err = ingest_file(&mut store, &path, "broken", &config(1)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquireError>(),
        Some(SquireError::BedMethylParse { line: 3, .. })
    ));

    let table = StoreTable::Sample("broken".into());
    assert!(!store.has_table(&table));
    assert!(!store.table_path(&table).with_extension("partial").exists());
    assert!(store.manifest().sample("broken").is_none());
    assert!(Store::open(store.root())?.manifest().samples.is_empty());
    Ok(())
}

#[rstest]
fn duplicate_samples_are_rejected(workdir: TempDir) -> anyhow::Result<()> {
    let a = write_bedmethyl(workdir.path(), "a", &[("chr1", 1, "m", 4, 2)])?;
    let b = write_bedmethyl(workdir.path(), "b", &[("chr1", 1, "m", 4, 1)])?;
    let root = workdir.path().join("run.squire");
    create_store(&root, &[a.clone(), b], false, &config(10), |_| {})?;

    let err = add_samples(&root, &[a], &config(10), |_| {}).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquireError>(),
        Some(SquireError::DuplicateSample(id)) if id == "a"
    ));
    assert_eq!(Store::open(&root)?.manifest().samples.len(), 2);
    Ok(())
}

#[rstest]
fn single_sample_is_not_enough(workdir: TempDir) -> anyhow::Result<()> {
    let a = write_bedmethyl(workdir.path(), "a", &[("chr1", 1, "m", 4, 2)])?;
    let err = create_store(&workdir.path().join("run.squire"), &[a], false, &config(10), |_| {})
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquireError>(),
        Some(SquireError::NotEnoughSamples { found: 1 })
    ));
    Ok(())
}

#[rstest]
fn duplicated_loci_break_the_merge(workdir: TempDir) -> anyhow::Result<()> {
    let config = config(10);
    let a = write_bedmethyl(workdir.path(), "a", &[("chr1", 1, "m", 4, 2), ("chr1", 1, "m", 6, 3)])?;
    let b = write_bedmethyl(workdir.path(), "b", &[("chr1", 1, "m", 4, 1)])?;
    let mut store = Store::create(&workdir.path().join("run.squire"), false)?;
    ingest_file(&mut store, &a, "a", &config)?;
    ingest_file(&mut store, &b, "b", &config)?;
    build_coordinate_index(&mut store, &config)?;

    let err = merge(&mut store, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquireError>(),
        Some(SquireError::DuplicateLocus(id)) if id == "a"
    ));
    assert!(!store.has_table(&StoreTable::Merged));
    assert!(store.has_table(&StoreTable::Sample("a".into())));
    Ok(())
}

#[rstest]
fn merge_requires_a_coordinate_index(workdir: TempDir) -> anyhow::Result<()> {
    let config = config(10);
    let a = write_bedmethyl(workdir.path(), "a", &[("chr1", 1, "m", 4, 2)])?;
    let mut store = Store::create(&workdir.path().join("run.squire"), false)?;
    ingest_file(&mut store, &a, "a", &config)?;

    let err = merge(&mut store, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquireError>(),
        Some(SquireError::MissingCoordinates)
    ));
    Ok(())
}

#[rstest]
fn ingest_after_indexing_requires_a_new_index(workdir: TempDir) -> anyhow::Result<()> {
    let config = config(10);
    let a = write_bedmethyl(workdir.path(), "a", &[("chr1", 1, "m", 4, 2)])?;
    let b = write_bedmethyl(workdir.path(), "b", &[
        ("chr1", 1, "m", 4, 1),
        ("chr2", 5, "m", 6, 3),
    ])?;
    let root = workdir.path().join("run.squire");
    let mut store = Store::create(&root, false)?;
    ingest_file(&mut store, &a, "a", &config)?;
    build_coordinate_index(&mut store, &config)?;
    ingest_file(&mut store, &b, "b", &config)?;

    assert!(store.manifest().coordinates_rows.is_none());
    assert!(!store.has_table(&StoreTable::Coordinates));
    let err = merge(&mut store, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquireError>(),
        Some(SquireError::MissingCoordinates)
    ));
    assert!(store.has_table(&StoreTable::Sample("b".into())));

    build_coordinate_index(&mut store, &config)?;
    assert_eq!(merge(&mut store, &config)?, 2);
    let merged = read_table(&Store::open(&root)?, &StoreTable::Merged)?;
    assert_eq!(keys_from_frame(&merged)?, vec![
        LocusKey::new("chr1", 1, 2, "m"),
        LocusKey::new("chr2", 5, 6, "m"),
    ]);
    assert_eq!(u32_values(&merged, "b_read_depth")?, vec![4, 6]);
    assert_eq!(u32_values(&merged, "a_read_depth")?, vec![4, 0]);
    Ok(())
}

#[rstest]
fn range_reads_decode_overlapping_blocks(workdir: TempDir) -> anyhow::Result<()> {
    let files = (0..2)
        .map(|seed| {
            let calls = dedup_calls(synthetic_calls(seed, 120));
            write_bedmethyl(workdir.path(), &format!("s{seed}"), &calls)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let store = create_store(&workdir.path().join("run.squire"), &files, false, &config(16), |_| {})?;

    let merged = read_table(&store, &StoreTable::Merged)?;
    let expected = keys_from_frame(&merged)?
        .into_iter()
        .filter(|key| key.chr == "chr2" && key.start < 900 && key.end > 300)
        .collect::<Vec<_>>();
    let found = keys_from_frame(&store.read_range(&StoreTable::Merged, "chr2", 300, 900)?)?;
    assert!(!expected.is_empty());
    assert_eq!(found, expected);
    Ok(())
}
