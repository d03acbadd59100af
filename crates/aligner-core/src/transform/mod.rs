pub mod sample;

use std::str::FromStr;

use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use crate::channel::Region;
use crate::channel::{Channel, TransformState};
use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{AlignerError, Result};

pub use sample::{sample_bicubic, sample_bilinear, sample_nearest};

/// Interpolation used when warping a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

impl Resample {
    pub const ALL: [Resample; 3] = [Resample::Nearest, Resample::Bilinear, Resample::Bicubic];

    /// Sample `data` at the continuous position `(sx, sy)`.
    #[inline]
    pub fn sample(self, data: &Array2<f32>, sx: f64, sy: f64) -> f32 {
        match self {
            Self::Nearest => sample_nearest(data, sx, sy),
            Self::Bilinear => sample_bilinear(data, sx, sy),
            Self::Bicubic => sample_bicubic(data, sx, sy),
        }
    }
}

impl std::fmt::Display for Resample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Bicubic => write!(f, "bicubic"),
        }
    }
}

impl FromStr for Resample {
    type Err = AlignerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            "bicubic" => Ok(Self::Bicubic),
            other => Err(AlignerError::Config(format!(
                "unknown resample method '{other}' (expected nearest, bilinear or bicubic)"
            ))),
        }
    }
}

/// Inverse mapping from output coordinates to source coordinates:
/// `sx = a0*x + a1*y + a2`, `sy = b0*x + b1*y + b2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

impl Affine {
    /// Inverse map for `state` on a `width` x `height` image: rotate about
    /// `(width/2, height/2)`, then translate by `(dx, dy)`.
    pub fn for_state(state: &TransformState, width: usize, height: usize) -> Self {
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let (sin, cos) = state.angle_deg.to_radians().sin_cos();
        let px = cx + state.dx;
        let py = cy + state.dy;
        Self {
            a0: cos,
            a1: sin,
            a2: cx - cos * px - sin * py,
            b0: -sin,
            b1: cos,
            b2: cy + sin * px - cos * py,
        }
    }

    /// Map for rendering only the output window starting at `(x0, y0)`,
    /// addressed in window-local coordinates.
    pub fn for_crop(state: &TransformState, width: usize, height: usize, x0: f64, y0: f64) -> Self {
        Self::for_state(state, width, height).offset(x0, y0)
    }

    /// Shift the output origin by `(x0, y0)`.
    pub fn offset(&self, x0: f64, y0: f64) -> Self {
        Self {
            a2: self.a2 + self.a0 * x0 + self.a1 * y0,
            b2: self.b2 + self.b0 * x0 + self.b1 * y0,
            ..*self
        }
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a0 * x + self.a1 * y + self.a2,
            self.b0 * x + self.b1 * y + self.b2,
        )
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [self.a0, self.a1, self.a2, self.b0, self.b1, self.b2]
    }
}

/// Apply `state` to the whole channel. Output has the input's size and format;
/// uncovered pixels are zero.
pub fn apply_transform(channel: &Channel, state: &TransformState, resample: Resample) -> Channel {
    if state.is_identity() {
        return channel.clone();
    }
    let (w, h) = channel.size();
    let m = Affine::for_state(state, w, h);
    warp_region(channel, &m, Region::full(w, h), resample)
}

/// Apply `state` but only produce the output pixels inside `region`.
///
/// The result equals the same window cropped out of [`apply_transform`].
#[instrument(skip(channel), fields(w = channel.width(), h = channel.height()))]
pub fn apply_transform_region(
    channel: &Channel,
    state: &TransformState,
    region: Region,
    resample: Resample,
) -> Result<Channel> {
    let (w, h) = channel.size();
    if region.is_empty() || !region.fits_within(w, h) {
        return Err(AlignerError::InvalidRegion {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        });
    }
    if state.is_identity() {
        return Ok(channel.crop(region));
    }
    let m = Affine::for_state(state, w, h);
    debug!(?region, "Warping region");
    Ok(warp_region(channel, &m, region, resample))
}

/// Evaluate `m` at the pixel centers of `region` (absolute output coordinates).
fn warp_region(channel: &Channel, m: &Affine, region: Region, resample: Resample) -> Channel {
    let src = &channel.data;
    let format = channel.format;
    let mut out = Array2::<f32>::zeros((region.height, region.width));

    let fill_row = |row: usize, mut out_row: ArrayViewMut1<f32>| {
        let oy = (region.y + row) as f64 + 0.5;
        for (col, v) in out_row.iter_mut().enumerate() {
            let ox = (region.x + col) as f64 + 0.5;
            let (sx, sy) = m.apply(ox, oy);
            *v = format.quantize(resample.sample(src, sx, sy));
        }
    };

    if region.width * region.height >= PARALLEL_PIXEL_THRESHOLD {
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out_row)| fill_row(row, out_row));
    } else {
        out.axis_iter_mut(Axis(0))
            .enumerate()
            .for_each(|(row, out_row)| fill_row(row, out_row));
    }

    Channel::new(out, format)
}
