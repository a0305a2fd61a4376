use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use log::{info, warn};
use polars::io::csv::write::{BatchedWriter as BatchedCsvWriter, CsvWriter};
use polars::prelude::*;

use crate::config::SquireConfig;
use crate::data_structs::columns::{key_dtypes, key_schema, KEY_COLUMNS, P_VALUE_COL};
use crate::error::SquireError;
use crate::store::{Store, StoreTable};
use crate::utils::schema_from_arrays;

/// Decimal places of fraction columns in the reference matrix.
pub const FRACTION_PRECISION: usize = 3;

fn tsv_writer(
    path: &Path,
    schema: &Schema,
    float_precision: Option<usize>,
) -> Result<BatchedCsvWriter<BufWriter<File>>> {
    let sink = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    CsvWriter::new(sink)
        .include_header(false)
        .with_separator(b'\t')
        .with_float_precision(float_precision)
        .batched(schema)
        .map_err(|e| {
            warn!("Failed to create batched CSV writer: {}", e);
            anyhow!(e)
        })
}

fn require_table(
    store: &Store,
    table: &StoreTable,
    recorded: bool,
) -> Result<()> {
    if !recorded || !store.has_table(table) {
        return Err(SquireError::StoreRead {
            path:   store.root().to_path_buf(),
            reason: format!("table {table} is missing"),
        }
        .into());
    }
    Ok(())
}

fn require_stats(store: &Store) -> Result<()> {
    let state = store.manifest().stats.as_ref();
    require_table(store, &StoreTable::Stats, state.is_some())?;
    if state.is_some_and(|state| !state.complete) {
        warn!("Stats table is incomplete, results cover only part of the loci");
    }
    Ok(())
}

/// Writes the reference matrix: for every merged locus its key followed by
/// the fraction of each sample, tab-separated, no header.
///
/// Returns the number of rows written.
pub fn export_reference_matrix(
    store: &Store,
    out: &Path,
    config: &SquireConfig,
) -> Result<usize> {
    require_table(
        store,
        &StoreTable::Merged,
        store.manifest().merged_rows.is_some(),
    )?;
    let groups = store.merged_groups();
    let columns = KEY_COLUMNS
        .iter()
        .copied()
        .chain(groups.iter().map(|group| group.fraction.as_str()))
        .collect_vec();
    let dtypes = key_dtypes()
        .into_iter()
        .chain(groups.iter().map(|_| DataType::Float64))
        .collect_vec();

    let mut writer = tsv_writer(
        out,
        &schema_from_arrays(&columns, &dtypes),
        Some(FRACTION_PRECISION),
    )?;
    let mut rows = 0;
    for chunk in store.chunks_projected(&StoreTable::Merged, *config.chunk_size(), &columns)? {
        // Projection keeps file order, restore the requested one
        let mut chunk = chunk?.select(columns.iter().copied())?;
        chunk.rechunk_mut();
        writer.write_batch(&chunk)?;
        rows += chunk.height();
    }
    writer.finish()?;
    info!("Wrote reference matrix with {} loci to {}", rows, out.display());
    Ok(rows)
}

/// Writes the keys of loci with p-value strictly below `threshold`,
/// tab-separated, no header. Returns the number of loci written.
pub fn export_cpg_list(
    store: &Store,
    out: &Path,
    threshold: f64,
    config: &SquireConfig,
) -> Result<usize> {
    require_stats(store)?;
    let mut writer = tsv_writer(out, &key_schema(), None)?;
    let mut rows = 0;
    for chunk in store.chunks(&StoreTable::Stats, *config.chunk_size())? {
        let mut selected = chunk?
            .lazy()
            .filter(col(P_VALUE_COL).lt(lit(threshold)))
            .select(KEY_COLUMNS.iter().map(|name| col(*name)).collect_vec())
            .collect()?;
        selected.rechunk_mut();
        writer.write_batch(&selected)?;
        rows += selected.height();
    }
    writer.finish()?;
    info!(
        "Wrote {} loci with p-value below {:?} to {}",
        rows,
        threshold,
        out.display()
    );
    Ok(rows)
}

/// Number of loci passing one p-value threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCount {
    pub threshold: f64,
    pub count:     usize,
}

/// Shortest round-trip form of `value`, switching to scientific notation
/// below 1e-4 or from 1e16 with a signed exponent of at least two digits
/// (`1e-05`, `0.001`, `1e+16`).
fn format_threshold(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || !value.is_finite() || (1e-4..1e16).contains(&magnitude) {
        return format!("{:?}", value);
    }
    let scientific = format!("{:e}", value);
    match scientific.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        },
        None => scientific,
    }
}

impl ThresholdCount {
    /// `T:N` when `machine`, a sentence otherwise.
    pub fn format(
        &self,
        machine: bool,
    ) -> String {
        if machine {
            format!("{}:{}", format_threshold(self.threshold), self.count)
        }
        else {
            format!(
                "If you use a threshold of {}: {} cpgs will remain.",
                format_threshold(self.threshold),
                self.count
            )
        }
    }
}

/// Counts loci with p-value strictly below each threshold, in one pass
/// over the stats table.
pub fn threshold_counts(
    store: &Store,
    thresholds: &[f64],
    config: &SquireConfig,
) -> Result<Vec<ThresholdCount>> {
    require_stats(store)?;
    let mut counts = vec![0usize; thresholds.len()];
    for chunk in store.chunks_projected(&StoreTable::Stats, *config.chunk_size(), &[P_VALUE_COL])? {
        let chunk = chunk?;
        let p_values = chunk.column(P_VALUE_COL)?.f64()?;
        for p_value in p_values.into_iter().flatten() {
            for (count, threshold) in counts.iter_mut().zip(thresholds) {
                if p_value < *threshold {
                    *count += 1;
                }
            }
        }
    }
    Ok(thresholds
        .iter()
        .zip(counts)
        .map(|(threshold, count)| {
            ThresholdCount {
                threshold: *threshold,
                count,
            }
        })
        .collect())
}

/// Writes the threshold report, one line per threshold.
pub fn write_threshold_report<W: Write>(
    sink: &mut W,
    counts: &[ThresholdCount],
    machine: bool,
) -> Result<()> {
    for count in counts {
        writeln!(sink, "{}", count.format(machine))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_line_forms() {
        let count = ThresholdCount {
            threshold: 1e-10,
            count:     42,
        };
        assert_eq!(count.format(true), "1e-10:42");
        assert_eq!(
            count.format(false),
            "If you use a threshold of 1e-10: 42 cpgs will remain."
        );
        let coarse = ThresholdCount {
            threshold: 0.1,
            count:     7,
        };
        assert_eq!(coarse.format(true), "0.1:7");
    }

    #[test]
    fn thresholds_print_like_the_report_defaults() {
        let printed = [1e-1, 1e-2, 1e-5, 1e-10, 1e-20, 1.5e-7, 1e-4, 1.0, 2e16]
            .map(format_threshold);
        assert_eq!(printed, [
            "0.1", "0.01", "1e-05", "1e-10", "1e-20", "1.5e-07", "0.0001", "1.0", "2e+16"
        ]);
        let count = ThresholdCount {
            threshold: 1e-5,
            count:     3,
        };
        assert_eq!(count.format(true), "1e-05:3");
    }
}
