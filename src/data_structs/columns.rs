use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::SquireError;
use crate::utils::schema_from_arrays;

pub const CHR_COL: &str = "chr";
pub const START_COL: &str = "start";
pub const END_COL: &str = "end";
pub const NAME_COL: &str = "name";
pub const P_VALUE_COL: &str = "p_value";

/// Key columns, in table order.
pub const KEY_COLUMNS: [&str; 4] = [CHR_COL, START_COL, END_COL, NAME_COL];

pub(crate) fn key_dtypes() -> [DataType; 4] {
    [DataType::String, DataType::UInt32, DataType::UInt32, DataType::String]
}

/// Schema of the key-only tables (`coordinates`).
pub fn key_schema() -> Schema {
    schema_from_arrays(&KEY_COLUMNS, &key_dtypes())
}

/// Schema of the `stats` table.
pub fn stats_schema() -> Schema {
    let mut schema = key_schema();
    schema.with_column(P_VALUE_COL.into(), DataType::Float64);
    schema
}

/// Column identifiers of a single sample inside per-sample and merged
/// tables.
///
/// Names are built from the full sample identifier with distinct suffixes,
/// so two different identifiers never share a column. Sample discovery goes
/// through the store registry, never through parsing these names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnGroup {
    pub sample:        String,
    pub depth:         String,
    pub modifications: String,
    pub fraction:      String,
}

impl ColumnGroup {
    pub fn new(sample: &str) -> Self {
        Self {
            sample:        sample.to_string(),
            depth:         format!("{sample}_read_depth"),
            modifications: format!("{sample}_modifications"),
            fraction:      format!("{sample}_fraction"),
        }
    }

    pub fn names(&self) -> [&str; 3] {
        [&self.depth, &self.modifications, &self.fraction]
    }

    pub fn dtypes() -> [DataType; 3] {
        [DataType::UInt32, DataType::UInt32, DataType::Float64]
    }

    /// Zero-fill expressions for this group's columns.
    pub fn fill_zero_exprs(&self) -> [Expr; 3] {
        [
            col(self.depth.as_str()).fill_null(lit(0u32)),
            col(self.modifications.as_str()).fill_null(lit(0u32)),
            col(self.fraction.as_str()).fill_null(lit(0f64)),
        ]
    }

    /// Schema of a per-sample table: key columns followed by this group.
    pub fn sample_schema(&self) -> Schema {
        let names = KEY_COLUMNS
            .iter()
            .copied()
            .chain(self.names())
            .collect_vec();
        let dtypes = key_dtypes()
            .into_iter()
            .chain(Self::dtypes())
            .collect_vec();
        schema_from_arrays(&names, &dtypes)
    }
}

/// Schema of the merged table for the given groups, in merge order.
pub fn merged_schema(groups: &[ColumnGroup]) -> Schema {
    let mut schema = key_schema();
    for group in groups {
        for (name, dtype) in group.names().into_iter().zip(ColumnGroup::dtypes()) {
            schema.with_column(name.into(), dtype);
        }
    }
    schema
}

/// Checks that a sample identifier can name a table file and a column
/// group.
pub fn validate_sample_id(sample: &str) -> Result<(), SquireError> {
    let forbidden = |c: char| c == '/' || c == '\\' || c.is_control();
    if sample.is_empty() || sample.starts_with('.') || sample.chars().any(forbidden) {
        return Err(SquireError::InvalidSampleId(sample.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_with_shared_prefix_do_not_collide() {
        let short = ColumnGroup::new("liver");
        let long = ColumnGroup::new("liver_read");
        let all = short
            .names()
            .into_iter()
            .chain(long.names())
            .unique()
            .count();
        assert_eq!(all, 6);
    }

    #[test]
    fn merged_schema_layout() {
        let schema = merged_schema(&[ColumnGroup::new("a"), ColumnGroup::new("b")]);
        let names = schema.iter_names().map(|n| n.as_str()).collect_vec();
        assert_eq!(names, vec![
            "chr",
            "start",
            "end",
            "name",
            "a_read_depth",
            "a_modifications",
            "a_fraction",
            "b_read_depth",
            "b_modifications",
            "b_fraction",
        ]);
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(validate_sample_id("sample_1").is_ok());
        assert!(validate_sample_id("").is_err());
        assert!(validate_sample_id("../x").is_err());
        assert!(validate_sample_id("a/b").is_err());
    }
}
