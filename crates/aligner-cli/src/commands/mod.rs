pub mod align;
pub mod config;
pub mod info;
pub mod preview;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use aligner_core::channel::TransformState;
use aligner_core::config::AlignerConfig;
use aligner_core::session::AlignSession;
use aligner_core::transform::Resample;

#[derive(Clone, Copy, ValueEnum)]
pub enum ResampleArg {
    Nearest,
    Bilinear,
    Bicubic,
}

impl From<ResampleArg> for Resample {
    fn from(arg: ResampleArg) -> Self {
        match arg {
            ResampleArg::Nearest => Resample::Nearest,
            ResampleArg::Bilinear => Resample::Bilinear,
            ResampleArg::Bicubic => Resample::Bicubic,
        }
    }
}

/// Inputs and per-channel transforms shared by `align` and `preview`.
#[derive(Args)]
pub struct StackArgs {
    /// Input images: several single-channel files, or one multi-page/multi-band file
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Alignment file (TOML) with per-channel offsets
    #[arg(long)]
    pub transforms: Option<PathBuf>,

    /// Channel transform as CHANNEL:DX:DY[:ANGLE] (1-based channel, may repeat)
    #[arg(long = "set", value_name = "C:DX:DY[:ANGLE]")]
    pub set: Vec<String>,

    /// Reference channel (1-based)
    #[arg(long)]
    pub reference: Option<usize>,

    /// Resampling filter (overrides the settings file)
    #[arg(long, value_enum)]
    pub resample: Option<ResampleArg>,
}

/// Per-channel offsets as stored in an alignment file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AlignmentFile {
    /// Reference channel (1-based)
    #[serde(default)]
    pub reference: Option<usize>,
    #[serde(default)]
    pub channels: Vec<ChannelTransform>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelTransform {
    /// 1-based channel number
    pub channel: usize,
    #[serde(flatten)]
    pub transform: TransformState,
}

impl AlignmentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alignment file {}", path.display()))?;
        toml::from_str(&contents).context("Invalid alignment file")
    }
}

pub fn load_config(path: Option<&Path>) -> Result<AlignerConfig> {
    match path {
        Some(path) => AlignerConfig::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(AlignerConfig::default()),
    }
}

/// Parse `C:DX:DY[:ANGLE]`.
fn parse_set(arg: &str) -> Result<(usize, TransformState)> {
    let parts: Vec<&str> = arg.split(':').map(str::trim).collect();
    if !(3..=4).contains(&parts.len()) {
        bail!("Expected CHANNEL:DX:DY[:ANGLE], got '{arg}'");
    }
    let channel: usize = parts[0]
        .parse()
        .with_context(|| format!("Bad channel number in '{arg}'"))?;
    let mut values = [0.0f64; 3];
    for (slot, text) in values.iter_mut().zip(&parts[1..]) {
        *slot = text
            .parse()
            .with_context(|| format!("Bad number '{text}' in '{arg}'"))?;
    }
    Ok((channel, TransformState::new(values[0], values[1], values[2])))
}

fn to_index(channel: usize, total: usize) -> Result<usize> {
    if channel == 0 || channel > total {
        bail!("Channel {channel} out of range (stack has {total} channels)");
    }
    Ok(channel - 1)
}

/// Load the stack and apply reference, alignment file and `--set` overrides.
pub fn open_session(args: &StackArgs) -> Result<AlignSession> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(resample) = args.resample {
        config.resample = resample.into();
    }

    let mut session = AlignSession::new(config);
    session
        .load(&args.inputs)
        .context("Failed to load input images")?;
    let total = session.channel_count();

    let file = match &args.transforms {
        Some(path) => AlignmentFile::load(path)?,
        None => AlignmentFile::default(),
    };
    if let Some(reference) = args.reference.or(file.reference) {
        session.set_reference(to_index(reference, total)?)?;
    }
    for entry in &file.channels {
        session.set_transform(to_index(entry.channel, total)?, entry.transform)?;
    }
    for arg in &args.set {
        let (channel, state) = parse_set(arg)?;
        session.set_transform(to_index(channel, total)?, state)?;
    }
    tracing::debug!(
        channels = total,
        reference = session.reference() + 1,
        resample = %session.resample(),
        "Session ready"
    );
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_arg_with_and_without_angle() {
        let (c, s) = parse_set("2:1.5:-3").unwrap();
        assert_eq!(c, 2);
        assert_eq!(s, TransformState::new(1.5, -3.0, 0.0));
        let (_, s) = parse_set("3: 0 : 0 : 0.25").unwrap();
        assert_eq!(s.angle_deg, 0.25);
        assert!(parse_set("2:1").is_err());
        assert!(parse_set("x:1:2").is_err());
    }

    #[test]
    fn alignment_file_parses() {
        let file: AlignmentFile = toml::from_str(
            r#"
            reference = 1
            [[channels]]
            channel = 2
            dx = 1.0
            dy = -1.0
            "#,
        )
        .unwrap();
        assert_eq!(file.reference, Some(1));
        assert_eq!(file.channels[0].transform, TransformState::new(1.0, -1.0, 0.0));
    }
}
