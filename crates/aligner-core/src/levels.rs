use image::GrayImage;
use ndarray::Axis;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, SampleFormat};
use crate::consts::{BRIGHTNESS_EPSILON, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{AlignerError, Result};

/// Sample interval mapped onto 0..255 for display.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayRange {
    pub min: f32,
    pub max: f32,
}

impl DisplayRange {
    /// `None` unless both ends are finite and `max > min`.
    pub fn new(min: f32, max: f32) -> Option<Self> {
        (min.is_finite() && max.is_finite() && max > min).then_some(Self { min, max })
    }

    /// Like [`DisplayRange::new`] but reports the bad input.
    pub fn validated(min: f32, max: f32) -> Result<Self> {
        Self::new(min, max).ok_or_else(|| {
            AlignerError::Config(format!("display range needs min < max (got {min}..{max})"))
        })
    }

    /// Map one sample: at or below `min` is 0, at or above `max` is 255.
    #[inline]
    pub fn map(&self, value: f32) -> u8 {
        if value <= self.min {
            0
        } else if value >= self.max {
            255
        } else {
            (((value - self.min) as f64 * 255.0) / (self.max - self.min) as f64) as u8
        }
    }
}

/// How channel samples become 8-bit display values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DisplayLevels {
    /// Stretch each channel's own min..max to 0..255.
    #[default]
    Auto,
    /// Use the same fixed range for every channel.
    Manual(DisplayRange),
}

impl DisplayLevels {
    /// Manual levels for a valid `min < max`, auto levels otherwise.
    pub fn from_bounds(min: f32, max: f32) -> Self {
        match DisplayRange::new(min, max) {
            Some(range) => Self::Manual(range),
            None => Self::Auto,
        }
    }
}

/// Nominal value range implied by a channel's storage format.
/// Float channels use their extrema, widened by one when flat.
pub fn infer_bit_depth_range(channel: &Channel) -> (f32, f32) {
    match channel.format {
        SampleFormat::U8 => (0.0, 255.0),
        SampleFormat::U16 | SampleFormat::U32 => (0.0, 65535.0),
        SampleFormat::F32 => match channel.extrema() {
            Some((lo, hi)) if hi > lo => (lo, hi),
            Some((lo, _)) => (lo, lo + 1.0),
            None => (0.0, 1.0),
        },
    }
}

/// The channel's own extrema, or `None` when it is flat.
pub fn auto_display_range(channel: &Channel) -> Option<DisplayRange> {
    channel
        .extrema()
        .and_then(|(lo, hi)| DisplayRange::new(lo, hi))
}

/// Map `channel` into an 8-bit image through `range`.
pub fn map_display(channel: &Channel, range: &DisplayRange) -> GrayImage {
    map_pixels(channel, |v| range.map(v))
}

/// Convert a channel to 8-bit display gray under `levels`.
///
/// `cached_auto` replaces the per-call extrema scan in auto mode. A flat
/// channel in auto mode maps through its nominal format range, giving a
/// uniform image.
pub fn to_display_gray(
    channel: &Channel,
    levels: &DisplayLevels,
    cached_auto: Option<DisplayRange>,
) -> GrayImage {
    let range = match levels {
        DisplayLevels::Manual(range) => *range,
        DisplayLevels::Auto => match cached_auto.or_else(|| auto_display_range(channel)) {
            Some(range) => range,
            None => {
                let (lo, hi) = infer_bit_depth_range(channel);
                DisplayRange { min: lo, max: hi }
            }
        },
    };
    map_display(channel, &range)
}

/// Scale display values by `factor` in place. Factors within
/// [`BRIGHTNESS_EPSILON`] of 1.0 leave the image untouched.
pub fn apply_brightness(gray: &mut GrayImage, factor: f64) {
    if (factor - 1.0).abs() <= BRIGHTNESS_EPSILON {
        return;
    }
    let scale = |v: &mut u8| *v = (*v as f64 * factor).round().clamp(0.0, 255.0) as u8;
    let buf: &mut [u8] = gray;
    if buf.len() >= PARALLEL_PIXEL_THRESHOLD {
        buf.par_iter_mut().for_each(scale);
    } else {
        buf.iter_mut().for_each(scale);
    }
}

/// Levels followed by brightness.
pub fn apply_display_levels(
    channel: &Channel,
    levels: &DisplayLevels,
    brightness: f64,
    cached_auto: Option<DisplayRange>,
) -> GrayImage {
    let mut gray = to_display_gray(channel, levels, cached_auto);
    apply_brightness(&mut gray, brightness);
    gray
}

fn map_pixels<F>(channel: &Channel, f: F) -> GrayImage
where
    F: Fn(f32) -> u8 + Sync,
{
    let (w, h) = channel.size();
    let mut gray = GrayImage::new(w as u32, h as u32);
    if w == 0 || h == 0 {
        return gray;
    }
    let buf: &mut [u8] = &mut gray;
    let fill = |(dst, src): (&mut [u8], ndarray::ArrayView1<f32>)| {
        for (d, &v) in dst.iter_mut().zip(src.iter()) {
            *d = f(v);
        }
    };
    if w * h >= PARALLEL_PIXEL_THRESHOLD {
        buf.par_chunks_mut(w)
            .zip(channel.data.axis_iter(Axis(0)).into_par_iter())
            .for_each(fill);
    } else {
        buf.chunks_mut(w)
            .zip(channel.data.axis_iter(Axis(0)))
            .for_each(fill);
    }
    gray
}
