use std::io::stdout;
use std::path::PathBuf;

use clap::Args;
use console::style;
use squire::prelude::*;

use crate::utils::UtilsArgs;

#[derive(Args, Debug, Clone)]
pub(crate) struct ReferenceArgs {
    #[arg(help = "File path to write the reference matrix to.")]
    out_path: PathBuf,

    #[arg(
        short = 'o',
        long,
        default_value_t = false,
        help = "Replace the output file if it already exists."
    )]
    overwrite: bool,
}

impl ReferenceArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let store = Store::open(&utils.store)?;
        make_viable_path(&self.out_path, self.overwrite)?;
        let rows = export_reference_matrix(&store, &self.out_path, &utils.config())?;
        eprintln!(
            "Wrote {} loci to {}",
            rows,
            style(self.out_path.display()).green()
        );
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct CpgListArgs {
    #[arg(help = "File path to write the CpG list to.")]
    out_path: PathBuf,

    #[arg(
        short = 't',
        long,
        default_value_t = 1e-10,
        help = "Loci with a p-value below this threshold are written."
    )]
    threshold: f64,

    #[arg(
        short = 'o',
        long,
        default_value_t = false,
        help = "Replace the output file if it already exists."
    )]
    overwrite: bool,
}

impl CpgListArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let store = Store::open(&utils.store)?;
        make_viable_path(&self.out_path, self.overwrite)?;
        let rows = export_cpg_list(&store, &self.out_path, self.threshold, &utils.config())?;
        eprintln!(
            "Wrote {} loci to {}",
            rows,
            style(self.out_path.display()).green()
        );
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ReportArgs {
    #[arg(
        short = 't',
        long,
        value_delimiter = ',',
        num_args = 1..,
        default_values_t = vec![1e-1, 1e-2, 1e-5, 1e-10, 1e-20],
        help = "Comma separated list of p-value thresholds to report on."
    )]
    thresholds: Vec<f64>,

    #[arg(
        long,
        default_value_t = false,
        help = "Print machine-parsable `threshold:count` lines."
    )]
    machine: bool,
}

impl ReportArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let store = Store::open(&utils.store)?;
        let counts = threshold_counts(&store, &self.thresholds, &utils.config())?;
        write_threshold_report(&mut stdout().lock(), &counts, self.machine)
    }
}
