use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::config::SquireConfig;
use crate::data_structs::columns::{validate_sample_id, ColumnGroup};
use crate::error::SquireError;
use crate::io::bedmethyl::BedMethylReader;
use crate::store::manifest::{SampleEntry, SampleState};
use crate::store::{Store, StoreTable};

/// Streams one bedMethyl file into a new per-sample table.
///
/// The table is published and registered only after the last chunk is
/// written; a parse error leaves the store as it was. A coordinate index
/// built before this sample no longer covers it and is dropped, so the next
/// merge needs a rebuilt index. Returns the number of rows ingested.
pub fn ingest_file(
    store: &mut Store,
    path: &Path,
    sample_id: &str,
    config: &SquireConfig,
) -> Result<usize> {
    validate_sample_id(sample_id)?;
    if store.manifest().sample(sample_id).is_some() {
        return Err(SquireError::DuplicateSample(sample_id.to_string()).into());
    }

    let group = ColumnGroup::new(sample_id);
    let table = StoreTable::Sample(sample_id.to_string());
    let reader = BedMethylReader::from_path(path, group.clone(), *config.chunk_size())?;
    let mut writer = store.writer(&table, group.sample_schema())?;

    for chunk in reader {
        let chunk = chunk?;
        writer.write_chunk(&chunk)?;
        debug!("{}: {} rows written", table, writer.rows());
    }
    let rows = writer
        .finish()
        .with_context(|| format!("Failed to publish table {table}"))?;

    let manifest = store.manifest_mut();
    let stale_index = manifest.coordinates_rows.take().is_some();
    manifest.samples.push(SampleEntry {
        group,
        state: SampleState::Ingested,
        rows,
        source: Some(path.to_path_buf()),
    });
    store.commit()?;
    if stale_index {
        store.remove_table(&StoreTable::Coordinates)?;
        debug!("Dropped coordinate index made stale by {}", table);
    }
    info!("Ingested {} as {} ({} rows)", path.display(), table, rows);
    Ok(rows)
}
