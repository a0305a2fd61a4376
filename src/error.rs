use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds surfaced by the store, the ingestion path and the
/// statistics engine.
///
/// Library functions return [`anyhow::Result`]; wrap these with context and
/// recover the kind with `err.downcast_ref::<SquireError>()`.
#[derive(Debug, Error)]
pub enum SquireError {
    #[error("bedMethyl file {path} is not readable: {reason}")]
    BedMethylRead { path: PathBuf, reason: String },

    #[error("bedMethyl file {path}, line {line}: {reason}")]
    BedMethylParse {
        path:   PathBuf,
        line:   usize,
        reason: String,
    },

    #[error("store at {path} is not usable: {reason}")]
    StoreRead { path: PathBuf, reason: String },

    #[error("{found} merged sample(s) in store, at least 2 are required for statistical comparison")]
    NotEnoughSamples { found: usize },

    #[error("locus {locus}: {reason}")]
    InvalidLocus { locus: String, reason: String },

    #[error("sample '{0}' is already present in the store")]
    DuplicateSample(String),

    #[error("sample '{0}' contains duplicated loci")]
    DuplicateLocus(String),

    #[error("sample identifier '{0}' can not be used as a table key")]
    InvalidSampleId(String),

    #[error("coordinate index is missing, build it before merging")]
    MissingCoordinates,

    #[error("{path} already exists, if this is expected rerun with -o/--overwrite")]
    PathExists { path: PathBuf },
}
