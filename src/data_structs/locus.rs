use std::cmp::Ordering;
use std::fmt::{self, Display};

use anyhow::{anyhow, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::columns::{CHR_COL, END_COL, NAME_COL, START_COL};

/// Collation class of a chromosome name.
///
/// `chr<digits>` sorts first (numerically), then other `chr`-prefixed
/// contigs, then everything else. Both named classes compare as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChromosomeRank<'a> {
    Numbered(u64),
    Named(&'a str),
    Other(&'a str),
}

impl<'a> ChromosomeRank<'a> {
    pub fn of(chr: &'a str) -> Self {
        match chr.strip_prefix("chr") {
            Some(rest) if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) => {
                // Digit runs too long for u64 fall back to string order
                rest.parse::<u64>()
                    .map(ChromosomeRank::Numbered)
                    .unwrap_or(ChromosomeRank::Named(rest))
            },
            Some(rest) => ChromosomeRank::Named(rest),
            None => ChromosomeRank::Other(chr),
        }
    }
}

/// Compares chromosome names by the canonical collation.
pub fn cmp_chromosomes(
    left: &str,
    right: &str,
) -> Ordering {
    ChromosomeRank::of(left)
        .cmp(&ChromosomeRank::of(right))
        // "chr01" and "chr1" share a rank, keep the order total
        .then_with(|| left.cmp(right))
}

/// Coordinate key of a locus: chromosome, half-open interval and
/// modification type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocusKey {
    pub chr:   String,
    pub start: u32,
    pub end:   u32,
    pub name:  String,
}

impl LocusKey {
    pub fn new(
        chr: impl Into<String>,
        start: u32,
        end: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            chr: chr.into(),
            start,
            end,
            name: name.into(),
        }
    }
}

impl Ord for LocusKey {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        cmp_chromosomes(&self.chr, &other.chr)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for LocusKey {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for LocusKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}-{}({})", self.chr, self.start, self.end, self.name)
    }
}

/// Builds a key-only frame from sorted keys.
pub fn keys_to_frame(keys: &[LocusKey]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            CHR_COL.into(),
            keys.iter().map(|k| k.chr.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(START_COL.into(), keys.iter().map(|k| k.start).collect::<Vec<_>>()),
        Column::new(END_COL.into(), keys.iter().map(|k| k.end).collect::<Vec<_>>()),
        Column::new(
            NAME_COL.into(),
            keys.iter().map(|k| k.name.as_str()).collect::<Vec<_>>(),
        ),
    ])
}

/// Reads the key columns of `frame` row by row.
pub fn keys_from_frame(frame: &DataFrame) -> Result<Vec<LocusKey>> {
    let chrs = frame.column(CHR_COL)?.str()?;
    let starts = frame.column(START_COL)?.u32()?;
    let ends = frame.column(END_COL)?.u32()?;
    let names = frame.column(NAME_COL)?.str()?;

    chrs.into_iter()
        .zip(starts)
        .zip(ends)
        .zip(names)
        .enumerate()
        .map(|(row, (((chr, start), end), name))| {
            match (chr, start, end, name) {
                (Some(chr), Some(start), Some(end), Some(name)) => {
                    Ok(LocusKey::new(chr, start, end, name))
                },
                _ => Err(anyhow!("Row {} has a null key column", row)),
            }
        })
        .collect()
}
