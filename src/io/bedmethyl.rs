use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use polars::prelude::*;

use crate::data_structs::columns::{ColumnGroup, CHR_COL, END_COL, NAME_COL, START_COL};
use crate::data_structs::record::IntervalRecord;
use crate::error::SquireError;

/// Column buffers of one chunk under construction.
#[derive(Default)]
struct ChunkColumns {
    chr:           Vec<String>,
    start:         Vec<u32>,
    end:           Vec<u32>,
    name:          Vec<String>,
    depth:         Vec<u32>,
    modifications: Vec<u32>,
    fraction:      Vec<Option<f64>>,
}

impl ChunkColumns {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            chr:           Vec::with_capacity(capacity),
            start:         Vec::with_capacity(capacity),
            end:           Vec::with_capacity(capacity),
            name:          Vec::with_capacity(capacity),
            depth:         Vec::with_capacity(capacity),
            modifications: Vec::with_capacity(capacity),
            fraction:      Vec::with_capacity(capacity),
        }
    }

    fn push(
        &mut self,
        record: IntervalRecord,
    ) {
        self.fraction.push(record.fraction());
        self.chr.push(record.chr);
        self.start.push(record.start);
        self.end.push(record.end);
        self.name.push(record.name);
        self.depth.push(record.depth);
        self.modifications.push(record.modifications);
    }

    fn len(&self) -> usize {
        self.chr.len()
    }

    fn into_frame(
        self,
        group: &ColumnGroup,
    ) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Column::new(CHR_COL.into(), self.chr),
            Column::new(START_COL.into(), self.start),
            Column::new(END_COL.into(), self.end),
            Column::new(NAME_COL.into(), self.name),
            Column::new(group.depth.as_str().into(), self.depth),
            Column::new(group.modifications.as_str().into(), self.modifications),
            Column::new(group.fraction.as_str().into(), self.fraction),
        ])
    }
}

/// Streams a bedMethyl file as per-sample table chunks.
///
/// Each chunk holds at most `chunk_size` rows with the key columns and the
/// sample's column group, fraction already derived. Blank lines are
/// skipped. The first malformed row ends the stream with an error.
pub struct BedMethylReader<R: BufRead> {
    lines:      std::io::Lines<R>,
    group:      ColumnGroup,
    chunk_size: usize,
    source:     PathBuf,
    line_no:    usize,
    failed:     bool,
}

impl BedMethylReader<BufReader<File>> {
    pub fn from_path(
        path: &Path,
        group: ColumnGroup,
        chunk_size: usize,
    ) -> Result<Self> {
        let handle = File::open(path).map_err(|e| SquireError::BedMethylRead {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(BufReader::new(handle), group, chunk_size, path))
    }
}

impl<R: BufRead> BedMethylReader<R> {
    pub fn new(
        reader: R,
        group: ColumnGroup,
        chunk_size: usize,
        source: &Path,
    ) -> Self {
        Self {
            lines: reader.lines(),
            group,
            chunk_size: chunk_size.max(1),
            source: source.to_path_buf(),
            line_no: 0,
            failed: false,
        }
    }

    fn parse_error(
        &self,
        reason: String,
    ) -> anyhow::Error {
        SquireError::BedMethylParse {
            path: self.source.clone(),
            line: self.line_no,
            reason,
        }
        .into()
    }

    fn read_chunk(&mut self) -> Result<Option<DataFrame>> {
        let mut columns = ChunkColumns::with_capacity(self.chunk_size.min(1 << 16));
        while columns.len() < self.chunk_size {
            let line = match self.lines.next() {
                Some(line) => line,
                None => break,
            };
            self.line_no += 1;
            let line = line.map_err(|e| self.parse_error(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = IntervalRecord::parse_line(&line, false)
                .map_err(|reason| self.parse_error(reason))?;
            columns.push(record);
        }
        if columns.len() == 0 {
            return Ok(None);
        }
        Ok(Some(columns.into_frame(&self.group)?))
    }
}

impl<R: BufRead> Iterator for BedMethylReader<R> {
    type Item = Result<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let chunk = self.read_chunk();
        if chunk.is_err() {
            self.failed = true;
        }
        chunk.transpose()
    }
}

/// Checks that `path` is a non-empty bedMethyl file: every non-blank row has
/// the full 18-field layout and integer fields where they are consumed.
///
/// Runs before ingestion touches the store.
pub fn validate_bedmethyl(path: &Path) -> Result<()> {
    let read_error = |reason: String| SquireError::BedMethylRead {
        path: path.to_path_buf(),
        reason,
    };
    let metadata = fs::metadata(path).map_err(|e| read_error(e.to_string()))?;
    if !metadata.is_file() {
        return Err(read_error("not a regular file".to_string()).into());
    }

    let reader = BufReader::new(File::open(path).map_err(|e| read_error(e.to_string()))?);
    let mut rows = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| read_error(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        IntervalRecord::parse_line(&line, true).map_err(|reason| {
            SquireError::BedMethylParse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            }
        })?;
        rows += 1;
    }
    if rows == 0 {
        return Err(read_error("file is empty".to_string()).into());
    }
    debug!("Validated {} ({} rows)", path.display(), rows);
    Ok(())
}

/// Reads a newline-separated list of input paths. Blank lines are skipped.
pub fn read_file_of_files(path: &Path) -> Result<Vec<PathBuf>> {
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("Failed to open file list {}", path.display()))?,
    );
    let mut files = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            files.push(PathBuf::from(trimmed));
        }
    }
    info!("Read {} input paths from {}", files.len(), path.display());
    Ok(files)
}

/// Prepares `path` for writing: refuses an existing path unless
/// `overwrite`, creates missing parent directories.
pub fn make_viable_path(
    path: &Path,
    overwrite: bool,
) -> Result<()> {
    if !overwrite && path.exists() {
        return Err(SquireError::PathExists {
            path: path.to_path_buf(),
        }
        .into());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("You do not have permissions to create {}", parent.display())
            })?;
        }
    }
    Ok(())
}
