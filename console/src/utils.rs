use std::path::PathBuf;

use clap::{ArgAction, Args};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use squire::prelude::*;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub(crate) struct UtilsArgs {
    #[arg(
        short = 'd',
        long = "store",
        required = true,
        help = "Path to the SQUIRE store directory."
    )]
    pub store: PathBuf,

    #[arg(
        long,
        default_value_t = false,
        help = "Display progress bar (Disable if you need clean pipeline logs)."
    )]
    pub progress: bool,

    #[arg(
        long,
        help = "Number of worker threads for statistical testing. Defaults to \
                the number of available cores minus one."
    )]
    pub threads: Option<usize>,

    #[arg(
        long = "chunk-size",
        default_value_t = DEFAULT_CHUNK_SIZE,
        help = "Number of rows held in memory by every streaming stage."
    )]
    pub chunk_size: usize,

    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase logging verbosity (-v info, -vv debug, -vvv trace)."
    )]
    pub verbose: u8,
}

impl UtilsArgs {
    /// Initializes logging. `RUST_LOG` directives override the verbosity
    /// flag.
    pub fn setup(&self) -> anyhow::Result<()> {
        let level = match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let mut builder = pretty_env_logger::formatted_builder();
        builder.filter_level(level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        builder.try_init()?;
        Ok(())
    }

    pub fn config(&self) -> SquireConfig {
        SquireConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_n_workers(self.threads.unwrap_or(0))
            .normalized()
    }
}

pub fn init_pbar(total: usize) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>2.green}/{len:2} {msg}")?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("Processing...");
    Ok(progress_bar)
}
