use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::info;

use super::coordinates::build_coordinate_index;
use super::ingest::ingest_file;
use super::merge::merge;
use super::stats::compute_p_values;
use crate::config::SquireConfig;
use crate::data_structs::columns::validate_sample_id;
use crate::error::SquireError;
use crate::io::bedmethyl::validate_bedmethyl;
use crate::store::Store;
use crate::utils::sample_id_from_path;

/// Stage reached by a pipeline run, reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Ingest,
    Index,
    Merge,
    Stats,
}

/// Pairs every input with its sample identifier and validates all of them
/// before the store is touched.
fn prepare_inputs(
    files: &[PathBuf],
    existing: Option<&Store>,
) -> Result<Vec<(PathBuf, String)>> {
    if files.is_empty() {
        return Err(anyhow!("No bedMethyl files were given"));
    }
    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let sample_id = sample_id_from_path(path).ok_or_else(|| {
            SquireError::InvalidSampleId(path.display().to_string())
        })?;
        validate_sample_id(&sample_id)?;
        let known = existing.is_some_and(|store| store.manifest().sample(&sample_id).is_some());
        if known || !seen.insert(sample_id.clone()) {
            return Err(SquireError::DuplicateSample(sample_id).into());
        }
        validate_bedmethyl(path)?;
        inputs.push((path.clone(), sample_id));
    }
    Ok(inputs)
}

fn run_stages<F: FnMut(PipelineStage)>(
    store: &mut Store,
    inputs: &[(PathBuf, String)],
    config: &SquireConfig,
    mut on_stage: F,
) -> Result<()> {
    on_stage(PipelineStage::Ingest);
    for (path, sample_id) in inputs {
        ingest_file(store, path, sample_id, config)?;
    }
    on_stage(PipelineStage::Index);
    build_coordinate_index(store, config)?;
    on_stage(PipelineStage::Merge);
    merge(store, config)?;
    on_stage(PipelineStage::Stats);
    compute_p_values(store, config)?;
    Ok(())
}

/// Builds a new store from `files`: ingestion, coordinate index, full merge
/// and statistics. `on_stage` is called when each stage starts.
pub fn create_store<F: FnMut(PipelineStage)>(
    root: &Path,
    files: &[PathBuf],
    overwrite: bool,
    config: &SquireConfig,
    on_stage: F,
) -> Result<Store> {
    let inputs = prepare_inputs(files, None)?;
    let mut store = Store::create(root, overwrite)?;
    run_stages(&mut store, &inputs, config, on_stage)?;
    info!(
        "Store {} created from {} samples",
        root.display(),
        inputs.len()
    );
    Ok(store)
}

/// Adds `files` to an existing store: the coordinate index is extended, the
/// merged table amended and the stats table rewritten.
pub fn add_samples<F: FnMut(PipelineStage)>(
    root: &Path,
    files: &[PathBuf],
    config: &SquireConfig,
    on_stage: F,
) -> Result<Store> {
    let mut store = Store::open(root)?;
    let inputs = prepare_inputs(files, Some(&store))?;
    run_stages(&mut store, &inputs, config, on_stage)?;
    info!(
        "Added {} samples to {}, {} in total",
        inputs.len(),
        root.display(),
        store.manifest().samples.len()
    );
    Ok(store)
}
