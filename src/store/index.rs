use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data_structs::columns::{CHR_COL, END_COL, START_COL};

/// Range of one chromosome covered by one table block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    pub block: usize,
    pub start: u32,
    pub end:   u32,
}

/// Secondary lookup over (chromosome, start, end) of a key-sorted table.
///
/// Maps every chromosome to the blocks holding its rows and the interval
/// each block spans, so a range lookup decodes only the overlapping
/// blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockIndex {
    map: BTreeMap<String, Vec<BlockSpan>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one row position to the span of `block` on `chr`.
    pub fn insert(
        &mut self,
        chr: &str,
        start: u32,
        end: u32,
        block: usize,
    ) {
        let spans = self.map.entry(chr.to_string()).or_default();
        match spans.last_mut() {
            Some(span) if span.block == block => {
                span.start = span.start.min(start);
                span.end = span.end.max(end);
            },
            _ => spans.push(BlockSpan { block, start, end }),
        }
    }

    /// Records the key columns of the chunk written as `block`.
    pub fn record_chunk(
        &mut self,
        block: usize,
        chunk: &DataFrame,
    ) -> Result<()> {
        let chrs = chunk.column(CHR_COL)?.str()?;
        let starts = chunk.column(START_COL)?.u32()?;
        let ends = chunk.column(END_COL)?.u32()?;
        for ((chr, start), end) in chrs.into_iter().zip(starts).zip(ends) {
            if let (Some(chr), Some(start), Some(end)) = (chr, start, end) {
                self.insert(chr, start, end, block);
            }
        }
        Ok(())
    }

    /// Blocks whose span on `chr` overlaps the half-open `[start, end)`.
    pub fn find(
        &self,
        chr: &str,
        start: u32,
        end: u32,
    ) -> Vec<usize> {
        self.map
            .get(chr)
            .map(|spans| {
                spans
                    .iter()
                    .filter(|span| span.start < end && start < span.end)
                    .map(|span| span.block)
                    .dedup()
                    .collect_vec()
            })
            .unwrap_or_default()
    }

    pub fn to_file(
        &self,
        path: &Path,
    ) -> Result<()> {
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        bincode::serialize_into(writer, self)
            .with_context(|| format!("Failed to write index {}", path.display()))?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        bincode::deserialize_from(reader)
            .with_context(|| format!("Failed to read index {}", path.display()))
    }
}
