//! Small helpers shared by the store, the pipelines and the console:
//! builder-style macros, schema construction and worker-count defaults.

use std::num::NonZeroUsize;
use std::path::Path;

use itertools::Itertools;
use log::warn;
use polars::prelude::*;

/// Creates a schema from separate arrays of names and data types.
pub(crate) fn schema_from_arrays(
    names: &[&str],
    dtypes: &[DataType],
) -> Schema {
    if names.len() != dtypes.len() {
        warn!(
            "Mismatch between names and dtypes array lengths: {} vs {}",
            names.len(),
            dtypes.len()
        );
    }
    Schema::from_iter(
        names
            .iter()
            .map(|name| PlSmallStr::from(*name))
            .zip(dtypes.iter().cloned())
            .collect_vec(),
    )
}

/// Worker count used when none is configured: available parallelism minus
/// one, never below one.
pub fn default_n_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Sample identifier of an input file: its name without the last extension.
pub fn sample_id_from_path<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
}

#[macro_export]
macro_rules! getter_fn {
    ($field_name: ident, $field_type: ty) => {
        pub fn $field_name(&self) -> &$field_type {
            &self.$field_name
        }
    };
}
pub use getter_fn;

#[macro_export]
macro_rules! with_field_fn {
    ($field_name: ident, $field_type: ty) => {
        paste::paste! {
            pub fn [<with_$field_name>](mut self, value: $field_type) -> Self {
            self.$field_name = value;
            self
            }
        }
    };
}
pub use with_field_fn;
