use std::collections::BTreeSet;

use anyhow::Result;
use itertools::Itertools;
use log::{debug, info};

use crate::config::SquireConfig;
use crate::data_structs::columns::{key_schema, KEY_COLUMNS};
use crate::data_structs::locus::{keys_from_frame, keys_to_frame, LocusKey};
use crate::store::{Store, StoreTable};

fn collect_keys(
    store: &Store,
    table: &StoreTable,
    chunk_size: usize,
    keys: &mut BTreeSet<LocusKey>,
) -> Result<()> {
    let before = keys.len();
    for chunk in store.chunks_projected(table, chunk_size, &KEY_COLUMNS)? {
        keys.extend(keys_from_frame(&chunk?)?);
    }
    debug!("{}: {} new keys", table, keys.len() - before);
    Ok(())
}

/// Builds the `coordinates` table: the sorted, deduplicated union of the
/// keys of every pending sample and of the merged table if there is one.
///
/// Any previous index is replaced. Returns the number of keys.
pub fn build_coordinate_index(
    store: &mut Store,
    config: &SquireConfig,
) -> Result<usize> {
    let chunk_size = (*config.chunk_size()).max(1);
    let mut keys = BTreeSet::new();

    if store.manifest().merged_rows.is_some() {
        collect_keys(store, &StoreTable::Merged, chunk_size, &mut keys)?;
    }
    for group in store.pending_groups() {
        collect_keys(store, &StoreTable::Sample(group.sample), chunk_size, &mut keys)?;
    }

    let mut writer = store.writer(&StoreTable::Coordinates, key_schema())?;
    for chunk in &keys.into_iter().chunks(chunk_size) {
        let chunk = chunk.collect_vec();
        writer.write_chunk(&keys_to_frame(&chunk)?)?;
    }
    let rows = writer.finish()?;

    store.manifest_mut().coordinates_rows = Some(rows);
    store.commit()?;
    info!("Built coordinate index with {} loci", rows);
    Ok(rows)
}
