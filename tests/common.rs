#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use squire::prelude::*;

/// One bedMethyl call: chromosome, start, modification type, read depth and
/// modified reads.
pub type Call = (&'static str, u32, &'static str, u32, u32);

/// Formats a call as a full 18-field bedMethyl row.
pub fn bedmethyl_row(call: &Call) -> String {
    let (chr, start, name, depth, modified) = *call;
    let fraction = if depth == 0 {
        0.0
    }
    else {
        modified as f64 / depth as f64 * 100.0
    };
    format!(
        "{chr}\t{start}\t{end}\t{name}\t{depth}\t+\t{start}\t{end}\t255,0,0\t{depth}\t{fraction:.2}\t{modified}\t{canonical}\t0\t0\t0\t0\t0",
        end = start + 1,
        canonical = depth - modified,
    )
}

/// Writes `calls` to `<dir>/<sample>.bed` and returns the path.
pub fn write_bedmethyl(
    dir: &Path,
    sample: &str,
    calls: &[Call],
) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("{sample}.bed"));
    let mut text = String::new();
    for call in calls {
        writeln!(text, "{}", bedmethyl_row(call))?;
    }
    fs::write(&path, text)?;
    Ok(path)
}

/// Deterministic calls spread over three chromosomes. `seed` shifts the
/// positions so different samples overlap only partially.
pub fn synthetic_calls(
    seed: u32,
    n: u32,
) -> Vec<Call> {
    const CHRS: [&str; 3] = ["chr1", "chr2", "chr10"];
    (0..n)
        .map(|i| {
            let chr = CHRS[((i + seed) % 3) as usize];
            let start = (i * 7 + seed * 3) % 200 * 10;
            let name = if (i + seed) % 4 == 0 { "h" } else { "m" };
            let depth = (i * 13 + seed) % 40;
            let modified = if depth == 0 { 0 } else { (i * 5 + seed) % (depth + 1) };
            (chr, start, name, depth, modified)
        })
        .collect()
}

/// Keeps the first call of every key.
pub fn dedup_calls(calls: Vec<Call>) -> Vec<Call> {
    let mut seen = std::collections::HashSet::new();
    calls
        .into_iter()
        .filter(|(chr, start, name, ..)| seen.insert((*chr, *start, *name)))
        .collect()
}

pub fn config(chunk_size: usize) -> SquireConfig {
    SquireConfig::default()
        .with_chunk_size(chunk_size)
        .with_n_workers(2)
}

pub fn read_table(
    store: &Store,
    table: &StoreTable,
) -> anyhow::Result<DataFrame> {
    store.chunks(table, 1024)?.collect_all()
}

pub fn u32_values(
    frame: &DataFrame,
    name: &str,
) -> anyhow::Result<Vec<u32>> {
    Ok(frame
        .column(name)?
        .u32()?
        .into_iter()
        .map(|v| v.unwrap_or(u32::MAX))
        .collect())
}

pub fn f64_values(
    frame: &DataFrame,
    name: &str,
) -> anyhow::Result<Vec<f64>> {
    Ok(frame
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Row of `frame` holding `key`, if any.
pub fn row_of(
    frame: &DataFrame,
    key: &LocusKey,
) -> anyhow::Result<Option<usize>> {
    let keys = squire::data_structs::locus::keys_from_frame(frame)?;
    Ok(keys.iter().position(|k| k == key))
}

pub fn p_value_at(
    store: &Store,
    key: &LocusKey,
) -> anyhow::Result<f64> {
    let stats = read_table(store, &StoreTable::Stats)?;
    let row = row_of(&stats, key)?.ok_or_else(|| anyhow::anyhow!("{key} is not scored"))?;
    Ok(f64_values(&stats, "p_value")?[row])
}
