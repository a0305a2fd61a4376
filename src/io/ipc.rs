// Copyright (c) 2020 Ritchie Vink
// Some portions Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights
// reserved.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

// Block-wise reader over an Arrow IPC file, derived from
// polars_core::utils::arrow::io::ipc::read::FileReader. Blocks are the
// chunks the store appended, read one at a time with an optional column
// projection.

use std::io::{Read, Seek};

use polars::export::arrow::array::Array;
use polars::export::arrow::io::ipc::read::{
    read_batch, read_file_dictionaries, read_file_metadata, Dictionaries,
    FileMetadata,
};
use polars::export::arrow::record_batch::RecordBatchT;
use polars::prelude::{ArrowSchema, DataFrame, PolarsError, PolarsResult};

/// Resolves column names to sorted, unique positions in `schema` and builds
/// the projected schema.
fn prepare_projection(
    schema: &ArrowSchema,
    columns: &[&str],
) -> PolarsResult<(Vec<usize>, ArrowSchema)> {
    let mut indices = Vec::with_capacity(columns.len());
    for name in columns {
        match schema.index_of(name) {
            Some(idx) => indices.push(idx),
            None => {
                return Err(PolarsError::ColumnNotFound(
                    format!("{name} is not in the IPC schema").into(),
                ))
            },
        }
    }
    indices.sort_unstable();
    indices.dedup();

    let projected = indices
        .iter()
        .filter_map(|idx| schema.get_at_index(*idx))
        .map(|(name, field)| (name.clone(), field.clone()))
        .collect();
    Ok((indices, projected))
}

/// An iterator of [`DataFrame`] blocks from an Arrow IPC file.
pub struct IpcBlockReader<R: Read + Seek> {
    reader:          R,
    metadata:        FileMetadata,
    dictionaries:    Option<Dictionaries>,
    current_block:   usize,
    projection:      Option<(Vec<usize>, ArrowSchema)>,
    data_scratch:    Vec<u8>,
    message_scratch: Vec<u8>,
}

impl<R: Read + Seek> IpcBlockReader<R> {
    /// Opens the reader. With `projection` only the named columns are
    /// decoded; they come back in file order.
    pub fn try_new(
        mut reader: R,
        projection: Option<&[&str]>,
    ) -> PolarsResult<Self> {
        let metadata = read_file_metadata(&mut reader)?;
        let projection = projection
            .map(|columns| prepare_projection(&metadata.schema, columns))
            .transpose()?;
        Ok(Self {
            reader,
            metadata,
            dictionaries: None,
            current_block: 0,
            projection,
            data_scratch: Default::default(),
            message_scratch: Default::default(),
        })
    }

    /// Schema of the produced blocks.
    pub fn schema(&self) -> &ArrowSchema {
        self.projection
            .as_ref()
            .map(|x| &x.1)
            .unwrap_or(self.metadata.schema.as_ref())
    }

    pub fn blocks_total(&self) -> usize {
        self.metadata.blocks.len()
    }

    /// Reads one block by position, independent of iteration state.
    pub fn read_at(
        &mut self,
        block: usize,
    ) -> Option<PolarsResult<DataFrame>> {
        if block >= self.blocks_total() {
            return None;
        }
        let frame = self
            .read_block(block)
            .and_then(|batch| DataFrame::try_from((batch, self.schema())));
        Some(frame)
    }

    fn read_dictionaries(&mut self) -> PolarsResult<()> {
        if self.dictionaries.is_none() {
            self.dictionaries = Some(read_file_dictionaries(
                &mut self.reader,
                &self.metadata,
                &mut self.data_scratch,
            )?);
        };
        Ok(())
    }

    fn read_block(
        &mut self,
        block: usize,
    ) -> PolarsResult<RecordBatchT<Box<dyn Array>>> {
        self.read_dictionaries()?;
        let dictionaries = match self.dictionaries.as_ref() {
            Some(dictionaries) => dictionaries,
            None => {
                return Err(PolarsError::ComputeError(
                    "IPC dictionaries were not loaded".into(),
                ))
            },
        };
        read_batch(
            &mut self.reader,
            dictionaries,
            &self.metadata,
            self.projection
                .as_ref()
                .map(|x| x.0.as_slice()),
            None,
            block,
            &mut self.message_scratch,
            &mut self.data_scratch,
        )
    }
}

impl<R: Read + Seek> Iterator for IpcBlockReader<R> {
    type Item = PolarsResult<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_block >= self.blocks_total() {
            return None;
        }
        let block = self.current_block;
        self.current_block += 1;
        self.read_at(block)
    }
}
