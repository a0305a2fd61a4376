mod build;
mod export;
pub mod utils;

use build::{AddArgs, CreateArgs};
use clap::{Parser, Subcommand};
use export::{CpgListArgs, ReferenceArgs, ReportArgs};
use utils::UtilsArgs;
use wild::ArgsOs;

#[derive(Parser, Debug)]
#[command(
    name = "squire",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = "A utility to generate inputs for HyLoRD",
    long_about = None,)]
struct Cli {
    #[command(subcommand)]
    command: MainMenu,
}

#[derive(Subcommand, Debug)]
enum MainMenu {
    /// Initialise the store from bedMethyl files and compute p-values.
    Create {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  CreateArgs,
    },

    /// Add bedMethyl files to an existing store and recompute p-values.
    Add {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  AddArgs,
    },

    /// Generate the reference matrix from an existing store.
    Reference {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  ReferenceArgs,
    },

    /// Generate a CpG list of loci that differ significantly between cell
    /// types.
    #[command(name = "cpglist")]
    CpgList {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  CpgListArgs,
    },

    /// Report CpG list length for different threshold values.
    Report {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  ReportArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let args: ArgsOs = wild::args_os();
    let cli = Cli::parse_from(args);

    match cli.command {
        MainMenu::Create { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Add { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Reference { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::CpgList { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Report { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
    }
    Ok(())
}
