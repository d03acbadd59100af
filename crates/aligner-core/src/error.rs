use std::path::PathBuf;

use thiserror::Error;

/// Why a save destination was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// The destination is one of the loaded source files.
    SourcePath,
    /// Something already exists at the destination.
    AlreadyExists,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourcePath => write!(f, "original images are never overwritten"),
            Self::AlreadyExists => write!(f, "file already exists"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AlignerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("All channels must have the same dimensions (expected {expected_width}x{expected_height}, got {width}x{height})")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Provide at least two channels to align (got {0})")]
    NotEnoughChannels(usize),

    #[error("No input paths provided")]
    NoInputs,

    #[error("Refusing to save to {path}: {kind}")]
    SaveConflict { path: PathBuf, kind: ConflictKind },

    #[error("Failed to write {path}: {reason}")]
    SaveIo { path: PathBuf, reason: String },

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Region ({x},{y} {width}x{height}) is empty or out of range")]
    InvalidRegion {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("Channel index {index} out of range (total: {total})")]
    ChannelIndexOutOfRange { index: usize, total: usize },

    #[error("No channels loaded")]
    NoChannels,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GPU error: {0}")]
    GpuError(String),
}

pub type Result<T> = std::result::Result<T, AlignerError>;
