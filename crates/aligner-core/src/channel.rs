use std::path::PathBuf;

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{AlignerError, Result};
use crate::io::metadata::{MetadataDirectory, SaveOptions};

/// Storage format of a channel's samples, kept so exports round-trip the source depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    U16,
    U32,
    F32,
}

impl SampleFormat {
    /// Round and clamp a resampled value into the representable range.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            Self::U8 => value.round().clamp(0.0, u8::MAX as f32),
            Self::U16 => value.round().clamp(0.0, u16::MAX as f32),
            Self::U32 => value.round().clamp(0.0, u32::MAX as f32),
            Self::F32 => value,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8 => write!(f, "8-bit"),
            Self::U16 => write!(f, "16-bit"),
            Self::U32 => write!(f, "32-bit integer"),
            Self::F32 => write!(f, "32-bit float"),
        }
    }
}

/// An axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of a `width` x `height` image.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// A single-band image. Samples keep their original numeric range
/// (0..255 for 8-bit, 0..65535 for 16-bit, raw values for float).
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    pub format: SampleFormat,
}

impl Channel {
    pub fn new(data: Array2<f32>, format: SampleFormat) -> Self {
        Self { data, format }
    }

    pub fn zeros(width: usize, height: usize, format: SampleFormat) -> Self {
        Self::new(Array2::zeros((height, width)), format)
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// `(width, height)`
    pub fn size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
            gray.get_pixel(col as u32, row as u32).0[0] as f32
        });
        Self::new(data, SampleFormat::U8)
    }

    /// Clamp samples into 8 bits without any contrast mapping.
    pub fn to_gray(&self) -> GrayImage {
        let (w, h) = self.size();
        ImageBuffer::from_fn(w as u32, h as u32, |col, row| {
            let v = self.data[[row as usize, col as usize]];
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Minimum and maximum finite sample, or `None` for an empty or all-NaN channel.
    pub fn extrema(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Crop `region`; parts of the region outside the channel are zero.
    pub fn crop(&self, region: Region) -> Channel {
        let mut out = Array2::<f32>::zeros((region.height, region.width));
        let x1 = region.right().min(self.width());
        let y1 = region.bottom().min(self.height());
        if region.x < x1 && region.y < y1 {
            let src = self.data.slice(s![region.y..y1, region.x..x1]);
            out.slice_mut(s![..y1 - region.y, ..x1 - region.x])
                .assign(&src);
        }
        Channel::new(out, self.format)
    }
}

/// Accumulated translation and rotation of one channel.
///
/// `dx`/`dy` are in source pixels; positive values move the content right/down.
/// `angle_deg` rotates about the image center, positive is clockwise on screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    #[serde(default)]
    pub angle_deg: f64,
}

impl TransformState {
    pub fn new(dx: f64, dy: f64, angle_deg: f64) -> Self {
        Self { dx, dy, angle_deg }
    }

    pub fn is_identity(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.angle_deg == 0.0
    }

    /// Translation scaled by `factor`; rotation is scale-invariant.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            dx: self.dx * factor,
            dy: self.dy * factor,
            angle_deg: self.angle_deg,
        }
    }
}

/// The channels of one load operation plus what is needed to write them back.
#[derive(Clone, Debug)]
pub struct ChannelStack {
    pub channels: Vec<Channel>,
    pub source_paths: Vec<PathBuf>,
    pub metadata: Option<MetadataDirectory>,
    pub save_options: SaveOptions,
}

impl ChannelStack {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// `(width, height)` shared by every channel.
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.channels.first().map(Channel::size)
    }

    /// Fail unless the stack can be aligned (two or more channels).
    pub fn ensure_alignable(&self) -> Result<()> {
        if self.channels.len() < 2 {
            return Err(AlignerError::NotEnoughChannels(self.channels.len()));
        }
        Ok(())
    }
}

/// Fail unless every channel has the dimensions of the first.
pub fn ensure_same_size(channels: &[Channel]) -> Result<()> {
    let Some(first) = channels.first() else {
        return Ok(());
    };
    let (expected_width, expected_height) = first.size();
    for channel in &channels[1..] {
        let (width, height) = channel.size();
        if (width, height) != (expected_width, expected_height) {
            return Err(AlignerError::DimensionMismatch {
                expected_width,
                expected_height,
                width,
                height,
            });
        }
    }
    Ok(())
}
