use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, trace, warn};
use polars::io::ipc::BatchedWriter;
use polars::prelude::*;

use super::ipc::IpcBlockReader;
use crate::store::index::BlockIndex;

/// Finite, non-restartable sequence of fixed-size chunks of a stored table.
///
/// Blocks are read lazily and re-sliced so that every chunk but the last
/// has exactly `chunk_size` rows. At most one block plus one chunk is held
/// in memory.
pub struct TableChunks {
    reader:     IpcBlockReader<BufReader<File>>,
    chunk_size: usize,
    buffer:     Option<DataFrame>,
    exhausted:  bool,
}

impl TableChunks {
    pub fn try_new(
        path: &Path,
        chunk_size: usize,
        projection: Option<&[&str]>,
    ) -> Result<Self> {
        let handle = File::open(path)
            .with_context(|| format!("Failed to open table {}", path.display()))?;
        let reader = IpcBlockReader::try_new(BufReader::new(handle), projection)
            .with_context(|| format!("Failed to read IPC metadata of {}", path.display()))?;
        debug!(
            "Opened {} ({} blocks, chunk size {})",
            path.display(),
            reader.blocks_total(),
            chunk_size
        );
        Ok(Self {
            reader,
            chunk_size: chunk_size.max(1),
            buffer: None,
            exhausted: false,
        })
    }

    fn take_chunk(&mut self) -> Option<DataFrame> {
        let buffered = self.buffer.take()?;
        if buffered.height() > self.chunk_size {
            let (head, tail) = buffered.split_at(self.chunk_size as i64);
            self.buffer = Some(tail);
            Some(head)
        }
        else if buffered.height() == self.chunk_size || self.exhausted {
            Some(buffered).filter(|df| df.height() > 0)
        }
        else {
            self.buffer = Some(buffered);
            None
        }
    }

    /// Reads every remaining chunk into a single frame.
    pub fn collect_all(self) -> Result<DataFrame> {
        let mut out: Option<DataFrame> = None;
        for chunk in self {
            let chunk = chunk?;
            match out.as_mut() {
                Some(df) => {
                    df.vstack_mut(&chunk)?;
                },
                None => out = Some(chunk),
            }
        }
        let mut out = out.unwrap_or_else(DataFrame::empty);
        out.rechunk_mut();
        Ok(out)
    }
}

impl Iterator for TableChunks {
    type Item = Result<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.take_chunk() {
                return Some(Ok(chunk));
            }
            if self.exhausted {
                return None;
            }
            match self.reader.next() {
                None => self.exhausted = true,
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(anyhow::Error::from(e).context("Failed to read table block")));
                },
                Some(Ok(block)) => {
                    trace!("Read block with {} rows", block.height());
                    match self.buffer.as_mut() {
                        Some(buffered) => {
                            if let Err(e) = buffered.vstack_mut(&block) {
                                self.exhausted = true;
                                return Some(Err(anyhow::Error::from(e)
                                    .context("Table blocks have mismatching schemas")));
                            }
                        },
                        None => self.buffer = Some(block),
                    }
                },
            }
        }
    }
}

/// Append-only writer of a store table.
///
/// Chunks go to `<table>.partial`; [`TableWriter::finish`] writes the IPC
/// footer and moves the file to its final name. A writer dropped without
/// finishing removes its partial file, so a failed write never publishes a
/// table.
pub struct TableWriter {
    writer:       Option<BatchedWriter<BufWriter<File>>>,
    schema:       Schema,
    partial_path: PathBuf,
    final_path:   PathBuf,
    rows:         usize,
    blocks:       usize,
    index:        Option<(BlockIndex, PathBuf)>,
}

impl TableWriter {
    pub fn try_new(
        path: &Path,
        schema: Schema,
    ) -> Result<Self> {
        let partial_path = path.with_extension("partial");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let sink = File::create(&partial_path)
            .with_context(|| format!("Failed to create {}", partial_path.display()))?;

        let opts = IpcWriterOptions {
            compression:    None,
            maintain_order: true,
        };
        let writer = opts
            .to_writer(BufWriter::new(sink))
            .batched(&schema)
            .with_context(|| "Failed to create batched writer")?;

        Ok(Self {
            writer: Some(writer),
            schema,
            partial_path,
            final_path: path.to_path_buf(),
            rows: 0,
            blocks: 0,
            index: None,
        })
    }

    /// Maintains a [`BlockIndex`] over the written blocks, saved to
    /// `index_path` on finish. Chunks must carry the key columns.
    pub fn with_block_index(
        mut self,
        index_path: PathBuf,
    ) -> Self {
        self.index = Some((BlockIndex::new(), index_path));
        self
    }

    /// Appends one chunk as one IPC block.
    pub fn write_chunk(
        &mut self,
        chunk: &DataFrame,
    ) -> Result<()> {
        if chunk.height() == 0 {
            return Ok(());
        }
        let mut chunk = chunk
            .select(self.schema.iter_names().cloned())
            .with_context(|| format!("Chunk does not match schema of {}", self.final_path.display()))?;
        // One chunk must land as exactly one IPC block
        chunk.rechunk_mut();
        match self.writer.as_mut() {
            Some(writer) => writer.write_batch(&chunk)?,
            None => anyhow::bail!("Writer for {} is already closed", self.final_path.display()),
        }
        if let Some((index, _)) = self.index.as_mut() {
            index.record_chunk(self.blocks, &chunk)?;
        }
        self.blocks += 1;
        self.rows += chunk.height();
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Finalizes the file and publishes it under its table name. Returns the
    /// number of rows written.
    pub fn finish(mut self) -> Result<usize> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .finish()
                .with_context(|| format!("Failed to finalize {}", self.partial_path.display()))?;
        }
        if let Some((index, index_path)) = self.index.take() {
            index.to_file(&index_path)?;
        }
        fs::rename(&self.partial_path, &self.final_path).with_context(|| {
            format!(
                "Failed to move {} to {}",
                self.partial_path.display(),
                self.final_path.display()
            )
        })?;
        debug!("Published {} ({} rows)", self.final_path.display(), self.rows);
        Ok(self.rows)
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = fs::remove_file(&self.partial_path) {
                warn!(
                    "Failed to remove unfinished table {}: {}",
                    self.partial_path.display(),
                    e
                );
            }
        }
    }
}
