//! Persistent store of a SQUIRE run.
//!
//! A store is a directory holding a JSON manifest and a set of Arrow IPC
//! tables:
//!
//! * `data/<sample>.arrow`: per-sample tables, removed once merged;
//! * `coordinates.arrow` (+ `.idx`): the coordinate index, removed once
//!   merged;
//! * `merged_data.arrow` (+ `.idx`): the merged table;
//! * `stats.arrow`: per-locus p-values.
//!
//! Every table is written chunk by chunk, one IPC block per chunk, and only
//! becomes visible once finished. The manifest is the registry of samples
//! and their column groups; it is rewritten after each published change.
//! The store has a single writer: the process driving the pipeline.

pub mod index;
pub mod manifest;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info};
use polars::prelude::*;

use self::index::BlockIndex;
use self::manifest::{Manifest, SampleState, MANIFEST_VERSION};
use crate::data_structs::columns::{ColumnGroup, CHR_COL, END_COL, START_COL};
use crate::error::SquireError;
use crate::io::ipc::IpcBlockReader;
use crate::io::table::{TableChunks, TableWriter};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DATA_DIR: &str = "data";
pub const COORDINATES_TABLE: &str = "coordinates";
pub const MERGED_TABLE: &str = "merged_data";
pub const STATS_TABLE: &str = "stats";

const TABLE_EXTENSION: &str = "arrow";
const INDEX_EXTENSION: &str = "idx";

/// Tables a store can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreTable {
    Sample(String),
    Coordinates,
    Merged,
    Stats,
}

impl StoreTable {
    fn relative_path(&self) -> PathBuf {
        match self {
            StoreTable::Sample(id) => {
                Path::new(DATA_DIR).join(format!("{id}.{TABLE_EXTENSION}"))
            },
            StoreTable::Coordinates => {
                PathBuf::from(format!("{COORDINATES_TABLE}.{TABLE_EXTENSION}"))
            },
            StoreTable::Merged => PathBuf::from(format!("{MERGED_TABLE}.{TABLE_EXTENSION}")),
            StoreTable::Stats => PathBuf::from(format!("{STATS_TABLE}.{TABLE_EXTENSION}")),
        }
    }

    /// Key-sorted tables carry a block index.
    fn is_indexed(&self) -> bool {
        matches!(self, StoreTable::Coordinates | StoreTable::Merged)
    }
}

impl std::fmt::Display for StoreTable {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            StoreTable::Sample(id) => write!(f, "/{DATA_DIR}/{id}"),
            StoreTable::Coordinates => write!(f, "/{COORDINATES_TABLE}"),
            StoreTable::Merged => write!(f, "/{MERGED_TABLE}"),
            StoreTable::Stats => write!(f, "/{STATS_TABLE}"),
        }
    }
}

#[derive(Debug)]
pub struct Store {
    root:     PathBuf,
    manifest: Manifest,
}

impl Store {
    fn invalid(
        root: &Path,
        reason: impl Into<String>,
    ) -> SquireError {
        SquireError::StoreRead {
            path:   root.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Creates an empty store at `root`. An existing store is removed first
    /// when `overwrite` is set, otherwise it is an error.
    pub fn create(
        root: &Path,
        overwrite: bool,
    ) -> Result<Self> {
        if root.exists() {
            if !overwrite {
                return Err(SquireError::PathExists {
                    path: root.to_path_buf(),
                }
                .into());
            }
            info!("Removing existing store {}", root.display());
            let removed = if root.is_dir() {
                fs::remove_dir_all(root)
            }
            else {
                fs::remove_file(root)
            };
            removed.with_context(|| format!("Failed to remove {}", root.display()))?;
        }
        fs::create_dir_all(root.join(DATA_DIR))
            .with_context(|| format!("You do not have permissions to create {}", root.display()))?;

        let store = Self {
            root:     root.to_path_buf(),
            manifest: Manifest::default(),
        };
        store.commit()?;
        info!("Created store {}", root.display());
        Ok(store)
    }

    /// Opens and validates an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Self::invalid(root, "store directory does not exist").into());
        }
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(Self::invalid(root, "manifest is missing").into());
        }
        let manifest = Manifest::read(&manifest_path)
            .map_err(|e| Self::invalid(root, format!("manifest is corrupt: {e:#}")))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Self::invalid(
                root,
                format!("unsupported store version {}", manifest.version),
            )
            .into());
        }

        let store = Self {
            root: root.to_path_buf(),
            manifest,
        };
        store.validate_tables()?;
        debug!(
            "Opened store {} ({} samples)",
            root.display(),
            store.manifest.samples.len()
        );
        Ok(store)
    }

    fn validate_tables(&self) -> Result<()> {
        let mut expected = self
            .manifest
            .samples_in(SampleState::Ingested)
            .map(|entry| StoreTable::Sample(entry.id().to_string()))
            .collect_vec();
        if self.manifest.coordinates_rows.is_some() {
            expected.push(StoreTable::Coordinates);
        }
        if self.manifest.merged_rows.is_some() {
            expected.push(StoreTable::Merged);
        }
        if self.manifest.stats.is_some() {
            expected.push(StoreTable::Stats);
        }
        for table in expected {
            if !self.has_table(&table) {
                return Err(Self::invalid(&self.root, format!("table {table} is missing")).into());
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub(crate) fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    /// Persists the manifest.
    pub fn commit(&self) -> Result<()> {
        self.manifest.write(&self.root.join(MANIFEST_FILE))
    }

    pub fn table_path(
        &self,
        table: &StoreTable,
    ) -> PathBuf {
        self.root.join(table.relative_path())
    }

    pub fn index_path(
        &self,
        table: &StoreTable,
    ) -> PathBuf {
        self.table_path(table).with_extension(INDEX_EXTENSION)
    }

    pub fn has_table(
        &self,
        table: &StoreTable,
    ) -> bool {
        self.table_path(table).is_file()
    }

    /// Column groups of merged samples, in merge order.
    pub fn merged_groups(&self) -> Vec<ColumnGroup> {
        self.manifest
            .samples_in(SampleState::Merged)
            .map(|entry| entry.group.clone())
            .collect()
    }

    /// Column groups of samples waiting to be merged, in ingestion order.
    pub fn pending_groups(&self) -> Vec<ColumnGroup> {
        self.manifest
            .samples_in(SampleState::Ingested)
            .map(|entry| entry.group.clone())
            .collect()
    }

    /// Streams `table` in chunks of `chunk_size` rows.
    pub fn chunks(
        &self,
        table: &StoreTable,
        chunk_size: usize,
    ) -> Result<TableChunks> {
        self.open_chunks(table, chunk_size, None)
    }

    /// Streams only `columns` of `table`.
    pub fn chunks_projected(
        &self,
        table: &StoreTable,
        chunk_size: usize,
        columns: &[&str],
    ) -> Result<TableChunks> {
        self.open_chunks(table, chunk_size, Some(columns))
    }

    fn open_chunks(
        &self,
        table: &StoreTable,
        chunk_size: usize,
        columns: Option<&[&str]>,
    ) -> Result<TableChunks> {
        if !self.has_table(table) {
            return Err(Self::invalid(&self.root, format!("table {table} is missing")).into());
        }
        TableChunks::try_new(&self.table_path(table), chunk_size, columns)
            .with_context(|| format!("Failed to read table {table}"))
    }

    /// Starts (re)writing `table`. The previous content stays readable until
    /// the writer is finished.
    pub fn writer(
        &self,
        table: &StoreTable,
        schema: Schema,
    ) -> Result<TableWriter> {
        let writer = TableWriter::try_new(&self.table_path(table), schema)
            .with_context(|| format!("Failed to open table {table} for writing"))?;
        if table.is_indexed() {
            Ok(writer.with_block_index(self.index_path(table)))
        }
        else {
            Ok(writer)
        }
    }

    /// Deletes `table` and its block index if present.
    pub fn remove_table(
        &self,
        table: &StoreTable,
    ) -> Result<()> {
        for path in [self.table_path(table), self.index_path(table)] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        debug!("Removed table {}", table);
        Ok(())
    }

    /// Rows of an indexed table overlapping `[start, end)` on `chr`.
    ///
    /// Only blocks whose span overlaps the range are decoded.
    pub fn read_range(
        &self,
        table: &StoreTable,
        chr: &str,
        start: u32,
        end: u32,
    ) -> Result<DataFrame> {
        if !table.is_indexed() {
            anyhow::bail!("Table {} has no block index", table);
        }
        let index = BlockIndex::from_file(&self.index_path(table))?;
        let handle = File::open(self.table_path(table))
            .with_context(|| format!("Failed to open table {table}"))?;
        let mut reader = IpcBlockReader::try_new(BufReader::new(handle), None)?;

        let mut out: Option<DataFrame> = None;
        for block in index.find(chr, start, end) {
            let frame = match reader.read_at(block) {
                Some(frame) => frame?,
                None => anyhow::bail!("Block {} of table {} does not exist", block, table),
            };
            let selected = frame
                .lazy()
                .filter(
                    col(CHR_COL)
                        .eq(lit(chr))
                        .and(col(START_COL).lt(lit(end)))
                        .and(col(END_COL).gt(lit(start))),
                )
                .collect()?;
            match out.as_mut() {
                Some(df) => {
                    df.vstack_mut(&selected)?;
                },
                None => out = Some(selected),
            }
        }
        Ok(out.unwrap_or_else(DataFrame::empty))
    }
}
