//! # squire
//!
//! `squire` builds the reference inputs of the HyLoRD deconvolution tool
//! from per-cell-type bedMethyl files. Samples are ingested into an on-disk
//! store, aligned onto a shared coordinate grid and scored locus by locus
//! for differences in methylation between cell types.
//!
//! Every stage streams its tables in bounded chunks, so inputs larger than
//! memory are fine as long as the coordinate index fits.
//!
//! ## Structure
//!
//! * [`data_structs`]: locus keys and their collation, bedMethyl records,
//!   column layout of the stored tables.
//! * [`io`]: bedMethyl parsing and validation, chunked Arrow IPC tables,
//!   TSV exports and the threshold report.
//! * [`store`]: the store directory, its manifest and block indices.
//! * [`tools`]: ingestion, coordinate index, merge, statistics and the
//!   `create`/`add` pipelines.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use squire::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = SquireConfig::default().with_chunk_size(50_000);
//!     let files = vec![PathBuf::from("liver.bed"), PathBuf::from("blood.bed")];
//!     let store = create_store(Path::new("run.squire"), &files, false, &config, |_| {})?;
//!
//!     for count in threshold_counts(&store, &[1e-5, 1e-10], &config)? {
//!         println!("{}", count.format(false));
//!     }
//!     export_cpg_list(&store, Path::new("cpgs.tsv"), 1e-10, &config)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data_structs;
pub mod error;
pub mod exports;
pub mod io;
pub mod prelude;
pub mod store;
pub mod tools;
pub mod utils;
