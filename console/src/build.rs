use std::path::PathBuf;

use clap::Args;
use console::style;
use indicatif::ProgressBar;
use itertools::Itertools;
use squire::prelude::*;

use crate::utils::{init_pbar, UtilsArgs};

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub(crate) struct InputArgs {
    #[arg(
        short = 'b',
        long = "bedmethyl-list",
        value_delimiter = ',',
        num_args = 1..,
        help = "Comma separated list of paths to bedMethyl files."
    )]
    bedmethyl_list: Option<Vec<PathBuf>>,

    #[arg(
        short = 'f',
        long = "file",
        help = "Path to a file containing a newline-separated list of bedMethyl files."
    )]
    file: Option<PathBuf>,
}

impl InputArgs {
    fn resolve(&self) -> anyhow::Result<Vec<PathBuf>> {
        match (&self.bedmethyl_list, &self.file) {
            (Some(list), _) => Ok(list.clone()),
            (None, Some(file)) => read_file_of_files(file),
            (None, None) => Err(anyhow::anyhow!("No bedMethyl files were given")),
        }
    }
}

fn stage_bar(utils: &UtilsArgs) -> anyhow::Result<ProgressBar> {
    if utils.progress {
        init_pbar(4)
    }
    else {
        Ok(ProgressBar::hidden())
    }
}

fn stage_message(stage: PipelineStage) -> String {
    let label = match stage {
        PipelineStage::Ingest => "Ingesting bedMethyl files",
        PipelineStage::Index => "Building coordinate index",
        PipelineStage::Merge => "Merging samples",
        PipelineStage::Stats => "Computing p-values",
    };
    format!("{}", style(label).blue())
}

/// Tracks the stage bar: the previous stage is done once the next starts.
fn on_stage(progress_bar: &ProgressBar) -> impl FnMut(PipelineStage) + '_ {
    let mut started = false;
    move |stage| {
        if started {
            progress_bar.inc(1);
        }
        started = true;
        progress_bar.set_message(stage_message(stage));
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct CreateArgs {
    #[clap(flatten)]
    inputs: InputArgs,

    #[arg(
        short = 'o',
        long,
        default_value_t = false,
        help = "Replace the store if it already exists."
    )]
    overwrite: bool,
}

impl CreateArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let files = self.inputs.resolve()?;
        let progress_bar = stage_bar(utils)?;
        let store = create_store(
            &utils.store,
            &files,
            self.overwrite,
            &utils.config(),
            on_stage(&progress_bar),
        )?;
        progress_bar.inc(1);
        progress_bar.finish_with_message("Done");

        eprintln!(
            "Created {} from {} samples: {}",
            style(utils.store.display()).green(),
            files.len(),
            store
                .manifest()
                .samples
                .iter()
                .map(|entry| entry.id())
                .join(", ")
        );
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct AddArgs {
    #[clap(flatten)]
    inputs: InputArgs,
}

impl AddArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let files = self.inputs.resolve()?;
        let progress_bar = stage_bar(utils)?;
        let store = add_samples(
            &utils.store,
            &files,
            &utils.config(),
            on_stage(&progress_bar),
        )?;
        progress_bar.inc(1);
        progress_bar.finish_with_message("Done");

        eprintln!(
            "Added {} samples to {} ({} in total)",
            files.len(),
            style(utils.store.display()).green(),
            store.manifest().samples.len()
        );
        Ok(())
    }
}
