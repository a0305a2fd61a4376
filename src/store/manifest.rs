use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data_structs::columns::ColumnGroup;

pub const MANIFEST_VERSION: u32 = 1;

/// Lifecycle of a sample inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleState {
    /// Per-sample table written, not yet merged.
    Ingested,
    /// Columns are part of `merged_data`, per-sample table removed.
    Merged,
}

/// Registry entry mapping a sample identifier to its column group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub group:  ColumnGroup,
    pub state:  SampleState,
    pub rows:   usize,
    pub source: Option<PathBuf>,
}

impl SampleEntry {
    pub fn id(&self) -> &str {
        &self.group.sample
    }
}

/// Which statistical test produced the stats table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    TwoProportionZ,
    ChiSquaredContingency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsState {
    pub test:     TestKind,
    pub rows:     usize,
    /// False when a run aborted after committing some chunks.
    pub complete: bool,
}

/// Persistent description of the store content. Rewritten after every
/// operation that publishes or removes a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version:          u32,
    /// Samples in ingestion order, which is also merge column order.
    pub samples:          Vec<SampleEntry>,
    pub coordinates_rows: Option<usize>,
    pub merged_rows:      Option<usize>,
    pub stats:            Option<StatsState>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version:          MANIFEST_VERSION,
            samples:          Vec::new(),
            coordinates_rows: None,
            merged_rows:      None,
            stats:            None,
        }
    }
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self> {
        let handle = File::open(path)?;
        let manifest = serde_json::from_reader(BufReader::new(handle))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(manifest)
    }

    /// Writes through a temporary file so a crash never leaves a truncated
    /// manifest behind.
    pub fn write(
        &self,
        path: &Path,
    ) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn sample(
        &self,
        id: &str,
    ) -> Option<&SampleEntry> {
        self.samples
            .iter()
            .find(|entry| entry.id() == id)
    }

    pub fn samples_in(
        &self,
        state: SampleState,
    ) -> impl Iterator<Item = &SampleEntry> {
        self.samples
            .iter()
            .filter(move |entry| entry.state == state)
    }
}
