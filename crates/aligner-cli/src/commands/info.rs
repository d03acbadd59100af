use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use aligner_core::io::load_channels_from_paths;

use crate::summary::print_stack_summary;

#[derive(Args)]
pub struct InfoArgs {
    /// Input images
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let stack = load_channels_from_paths(&args.inputs).context("Failed to load input images")?;
    print_stack_summary(&stack);
    Ok(())
}
