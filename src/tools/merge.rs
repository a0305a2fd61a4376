use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use polars::prelude::*;

use crate::config::SquireConfig;
use crate::data_structs::columns::{merged_schema, ColumnGroup, KEY_COLUMNS};
use crate::error::SquireError;
use crate::store::manifest::SampleState;
use crate::store::{Store, StoreTable, MERGED_TABLE};

const ROW_INDEX_COL: &str = "__row_index";

fn key_exprs() -> Vec<Expr> {
    KEY_COLUMNS.iter().map(|name| col(*name)).collect()
}

/// Left-joins `right` onto the skeleton and zero-fills `groups`.
///
/// A key repeated in `right` multiplies skeleton rows; the height check
/// turns that into a [`SquireError::DuplicateLocus`] for `source`.
fn join_groups(
    skeleton: DataFrame,
    right: DataFrame,
    groups: &[ColumnGroup],
    source: &str,
) -> Result<DataFrame> {
    let expected = skeleton.height();
    let fill = groups
        .iter()
        .flat_map(ColumnGroup::fill_zero_exprs)
        .collect_vec();
    let joined = skeleton
        .lazy()
        .join(
            right.lazy(),
            key_exprs(),
            key_exprs(),
            JoinArgs::new(JoinType::Left),
        )
        .with_columns(fill)
        .collect()
        .with_context(|| format!("Failed to join {source} onto the coordinate index"))?;

    if joined.height() != expected {
        return Err(SquireError::DuplicateLocus(source.to_string()).into());
    }
    Ok(joined)
}

/// Aligns every pending sample onto the coordinate index and publishes the
/// merged table.
///
/// Without an existing merged table this is a full build. Otherwise the
/// merged table is first joined onto the (extended) index, which keeps its
/// cells unchanged and zero-fills only loci new to the index, then the
/// pending samples are joined as in a full build.
///
/// On success the per-sample tables and the coordinate index are removed
/// and the stats table, now stale, is dropped. Returns the merged row count.
pub fn merge(
    store: &mut Store,
    config: &SquireConfig,
) -> Result<usize> {
    if store.manifest().coordinates_rows.is_none() {
        return Err(SquireError::MissingCoordinates.into());
    }
    let chunk_size = (*config.chunk_size()).max(1);
    let pending = store.pending_groups();
    let previous = store.merged_groups();
    if pending.is_empty() {
        warn!("No pending samples, merged table is left unchanged");
        return Ok(store.manifest().merged_rows.unwrap_or(0));
    }

    let skeleton = store
        .chunks(&StoreTable::Coordinates, chunk_size)?
        .collect_all()?;
    let mut merged = skeleton.with_row_index(ROW_INDEX_COL.into(), None)?;
    debug!("Merge skeleton has {} loci", merged.height());

    if store.manifest().merged_rows.is_some() {
        let existing = store
            .chunks(&StoreTable::Merged, chunk_size)?
            .collect_all()?;
        merged = join_groups(merged, existing, &previous, MERGED_TABLE)?;
        info!("Amending merged table of {} samples", previous.len());
    }
    for group in pending.iter() {
        let sample = store
            .chunks(&StoreTable::Sample(group.sample.clone()), chunk_size)?
            .collect_all()?;
        merged = join_groups(merged, sample, std::slice::from_ref(group), &group.sample)?;
        debug!("Joined sample {}", group.sample);
    }

    let merged = merged
        .sort([ROW_INDEX_COL], SortMultipleOptions::default())?
        .drop(ROW_INDEX_COL)?;

    let groups = previous
        .iter()
        .chain(pending.iter())
        .cloned()
        .collect_vec();
    let mut writer = store.writer(&StoreTable::Merged, merged_schema(&groups))?;
    let mut offset = 0usize;
    while offset < merged.height() {
        writer.write_chunk(&merged.slice(offset as i64, chunk_size))?;
        offset += chunk_size;
    }
    let rows = writer.finish()?;

    let had_stats = store.manifest().stats.is_some();
    {
        let manifest = store.manifest_mut();
        for entry in manifest.samples.iter_mut() {
            entry.state = SampleState::Merged;
        }
        manifest.merged_rows = Some(rows);
        manifest.coordinates_rows = None;
        manifest.stats = None;
    }
    store.commit()?;

    for group in pending.iter() {
        store.remove_table(&StoreTable::Sample(group.sample.clone()))?;
    }
    store.remove_table(&StoreTable::Coordinates)?;
    if had_stats {
        store.remove_table(&StoreTable::Stats)?;
    }
    info!(
        "Merged {} new sample(s), {} total, into {} loci",
        pending.len(),
        groups.len(),
        rows
    );
    Ok(rows)
}
