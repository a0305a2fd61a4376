//! Per-locus significance of methylation differences between samples.
//!
//! With two merged samples every locus gets a pooled two-proportion z-test,
//! with more a chi-squared test of independence on the 2×k table of
//! modified and unmodified reads. Loci where the test is undefined get
//! [`SENTINEL_P_VALUE`].
//!
//! The merged table is processed chunk by chunk. Each chunk is scored on its
//! own rayon pool, sorted back into key order and appended to the stats
//! table before the next chunk is read.

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use polars::prelude::*;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::config::SquireConfig;
use crate::data_structs::columns::{stats_schema, ColumnGroup, KEY_COLUMNS, P_VALUE_COL};
use crate::data_structs::locus::{keys_from_frame, keys_to_frame, LocusKey};
use crate::error::SquireError;
pub use crate::store::manifest::TestKind;
use crate::store::manifest::StatsState;
use crate::store::{Store, StoreTable};

/// p-value assigned to loci where the test can not be computed.
pub const SENTINEL_P_VALUE: f64 = 1.0;

impl TestKind {
    /// Test used for `n_samples` merged samples.
    pub fn for_samples(n_samples: usize) -> Result<Self, SquireError> {
        match n_samples {
            0 | 1 => Err(SquireError::NotEnoughSamples { found: n_samples }),
            2 => Ok(TestKind::TwoProportionZ),
            _ => Ok(TestKind::ChiSquaredContingency),
        }
    }

    pub fn p_value(
        &self,
        counts: &[u64],
        depths: &[u64],
    ) -> Result<f64> {
        match self {
            TestKind::TwoProportionZ => two_proportion_z_test(counts, depths),
            TestKind::ChiSquaredContingency => chi_squared_contingency(counts, depths),
        }
    }
}

fn check_inputs(
    counts: &[u64],
    depths: &[u64],
) -> Result<()> {
    if counts.len() != depths.len() {
        bail!(
            "{} modification counts for {} read depths",
            counts.len(),
            depths.len()
        );
    }
    if let Some((count, depth)) = counts
        .iter()
        .zip(depths)
        .find(|(count, depth)| count > depth)
    {
        bail!("modification count {} exceeds read depth {}", count, depth);
    }
    Ok(())
}

fn finite_or_sentinel(p_value: f64) -> f64 {
    if p_value.is_finite() {
        p_value.clamp(0.0, 1.0)
    }
    else {
        SENTINEL_P_VALUE
    }
}

/// Two-sided two-proportion z-test with pooled variance.
pub fn two_proportion_z_test(
    counts: &[u64],
    depths: &[u64],
) -> Result<f64> {
    check_inputs(counts, depths)?;
    if counts.len() != 2 {
        bail!("two-proportion test needs 2 samples, got {}", counts.len());
    }
    if depths.iter().filter(|depth| **depth > 0).count() < 2 {
        return Ok(SENTINEL_P_VALUE);
    }

    let (c1, c2) = (counts[0] as f64, counts[1] as f64);
    let (n1, n2) = (depths[0] as f64, depths[1] as f64);
    let pooled = (c1 + c2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    // 0/0 when both proportions are 0 or 1, caught below
    let z = (c1 / n1 - c2 / n2) / se;

    let normal = Normal::new(0.0, 1.0)?;
    Ok(finite_or_sentinel(2.0 * normal.sf(z.abs())))
}

/// Chi-squared test of independence on modified/unmodified reads of the
/// samples with nonzero depth. Yates' correction is applied when the table
/// has one degree of freedom.
pub fn chi_squared_contingency(
    counts: &[u64],
    depths: &[u64],
) -> Result<f64> {
    check_inputs(counts, depths)?;
    let observed = counts
        .iter()
        .zip(depths)
        .filter(|(_, depth)| **depth > 0)
        .map(|(count, depth)| [*count as f64, (depth - count) as f64])
        .collect_vec();
    if observed.len() < 2 {
        return Ok(SENTINEL_P_VALUE);
    }

    let totals = observed.iter().fold([0f64; 2], |acc, column| {
        [acc[0] + column[0], acc[1] + column[1]]
    });
    let grand = totals[0] + totals[1];
    if totals.iter().any(|total| *total == 0.0) {
        // Zero expected frequency in a whole row
        return Ok(SENTINEL_P_VALUE);
    }

    let dof = observed.len() - 1;
    let statistic: f64 = observed
        .iter()
        .flat_map(|column| {
            let column_total = column[0] + column[1];
            (0..2).map(move |row| {
                let expected = totals[row] * column_total / grand;
                let mut diff = (column[row] - expected).abs();
                if dof == 1 {
                    diff = (diff - 0.5).max(0.0);
                }
                diff * diff / expected
            })
        })
        .sum();

    let distribution = ChiSquared::new(dof as f64)?;
    Ok(finite_or_sentinel(distribution.sf(statistic)))
}

/// Scores one locus, reporting malformed inputs as
/// [`SquireError::InvalidLocus`].
fn score_locus(
    kind: TestKind,
    key: LocusKey,
    counts: &[u64],
    depths: &[u64],
) -> Result<(LocusKey, f64)> {
    match kind.p_value(counts, depths) {
        Ok(p_value) => Ok((key, p_value)),
        Err(e) => {
            Err(SquireError::InvalidLocus {
                locus:  key.to_string(),
                reason: e.to_string(),
            }
            .into())
        },
    }
}

/// Counts and depths of every row of a merged chunk, samples in group
/// order.
fn chunk_tasks(
    chunk: &DataFrame,
    groups: &[ColumnGroup],
) -> Result<Vec<(LocusKey, Vec<u64>, Vec<u64>)>> {
    let keys = keys_from_frame(chunk)?;
    let counts = groups
        .iter()
        .map(|group| chunk.column(&group.modifications)?.u32())
        .collect::<PolarsResult<Vec<_>>>()?;
    let depths = groups
        .iter()
        .map(|group| chunk.column(&group.depth)?.u32())
        .collect::<PolarsResult<Vec<_>>>()?;

    // Null cells are uncovered loci
    let row_values = |columns: &[&UInt32Chunked], row: usize| {
        columns
            .iter()
            .map(|column| column.get(row).unwrap_or(0) as u64)
            .collect_vec()
    };
    Ok(keys
        .into_iter()
        .enumerate()
        .map(|(row, key)| (key, row_values(&counts, row), row_values(&depths, row)))
        .collect())
}

/// Scores one chunk on a fresh pool of `n_workers` threads. Output is in key
/// order.
fn score_chunk(
    chunk: &DataFrame,
    groups: &[ColumnGroup],
    kind: TestKind,
    n_workers: usize,
) -> Result<DataFrame> {
    let tasks = chunk_tasks(chunk, groups)?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .build()
        .context("Failed to build worker pool")?;
    let mut scored = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|(key, counts, depths)| score_locus(kind, key, &counts, &depths))
            .collect::<Result<Vec<_>>>()
    })?;
    scored.sort_by(|a, b| a.0.cmp(&b.0));

    let (keys, p_values): (Vec<LocusKey>, Vec<f64>) = scored.into_iter().unzip();
    let mut frame = keys_to_frame(&keys)?;
    frame.with_column(Column::new(P_VALUE_COL.into(), p_values))?;
    Ok(frame)
}

/// Computes p-values for every locus of the merged table and rewrites the
/// stats table.
///
/// Fails with [`SquireError::NotEnoughSamples`] before any work when fewer
/// than two samples are merged. A failing locus aborts the run; chunks
/// appended before it are kept and the stats table is recorded as
/// incomplete. Returns the number of scored loci.
pub fn compute_p_values(
    store: &mut Store,
    config: &SquireConfig,
) -> Result<usize> {
    if store.manifest().merged_rows.is_none() {
        return Err(SquireError::StoreRead {
            path:   store.root().to_path_buf(),
            reason: "merged table is missing".to_string(),
        }
        .into());
    }
    let groups = store.merged_groups();
    let kind = TestKind::for_samples(groups.len())?;
    info!(
        "Scoring {} loci of {} samples with {:?}",
        store.manifest().merged_rows.unwrap_or(0),
        groups.len(),
        kind
    );

    let projection = KEY_COLUMNS
        .iter()
        .copied()
        .chain(
            groups
                .iter()
                .flat_map(|group| [group.depth.as_str(), group.modifications.as_str()]),
        )
        .collect_vec();
    let chunks = store.chunks_projected(&StoreTable::Merged, *config.chunk_size(), &projection)?;
    let mut writer = store.writer(&StoreTable::Stats, stats_schema())?;

    let mut outcome = Ok(());
    for (idx, chunk) in chunks.enumerate() {
        let scored = chunk.and_then(|chunk| {
            score_chunk(&chunk, &groups, kind, *config.n_workers())
        });
        match scored.and_then(|frame| writer.write_chunk(&frame)) {
            Ok(()) => debug!("Chunk {} committed, {} loci so far", idx, writer.rows()),
            Err(e) => {
                outcome = Err(e.context(format!("Statistics aborted at chunk {idx}")));
                break;
            },
        }
    }

    let complete = outcome.is_ok();
    let rows = writer.finish()?;
    store.manifest_mut().stats = Some(StatsState {
        test: kind,
        rows,
        complete,
    });
    store.commit()?;

    match outcome {
        Ok(()) => {
            info!("Stats table written ({} loci)", rows);
            Ok(rows)
        },
        Err(e) => {
            warn!("Stats table is incomplete, {} loci were committed", rows);
            Err(e)
        },
    }
}
