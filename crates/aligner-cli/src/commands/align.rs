use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::{open_session, StackArgs};
use crate::summary::print_alignment_summary;

#[derive(Args)]
pub struct AlignArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Output TIFF (default: <first input>_manual_aligned.tif next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));

    pb.set_message("Loading channels...");
    let mut session = open_session(&args.stack)?;

    let output = match &args.output {
        Some(path) => path.clone(),
        None => {
            let dir = args.stack.inputs[0]
                .parent()
                .map(PathBuf::from)
                .unwrap_or_default();
            dir.join(session.default_output_name())
        }
    };

    pb.set_message(format!("Transforming and saving {} channels...", session.channel_count()));
    session
        .save_aligned(&output)
        .with_context(|| format!("Failed to save {}", output.display()))?;
    pb.finish_and_clear();

    print_alignment_summary(&session, &output);
    println!("{}", session.status());
    Ok(())
}
