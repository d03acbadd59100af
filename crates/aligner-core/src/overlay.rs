use image::{GrayImage, Rgb, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{AlignerError, Result};

/// How overlay opacity is spread over the active channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaMode {
    /// Same opacity everywhere.
    #[default]
    Constant,
    /// Opacity weighted by the active channel's brightness.
    Intensity,
}

/// Neutral gray RGB copy of a display image.
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}

/// Tint a display image with `color`: each component is `v/255 * c`.
pub fn tint(gray: &GrayImage, color: [u8; 3]) -> RgbImage {
    let scale = |v: u8, c: u8| ((v as u32 * c as u32 + 127) / 255) as u8;
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([scale(v, color[0]), scale(v, color[1]), scale(v, color[2])])
    })
}

/// Per-pixel alpha for the active channel.
pub fn overlay_alpha(active: &GrayImage, opacity: f64, mode: AlphaMode) -> GrayImage {
    let opacity = opacity.clamp(0.0, 1.0);
    match mode {
        AlphaMode::Constant => {
            let a = (opacity * 255.0) as u8;
            GrayImage::from_pixel(active.width(), active.height(), image::Luma([a]))
        }
        AlphaMode::Intensity => {
            let mut alpha = active.clone();
            for p in alpha.pixels_mut() {
                p.0[0] = (p.0[0] as f64 * opacity) as u8;
            }
            alpha
        }
    }
}

/// Composite `overlay` over `base` in place with per-pixel `alpha`.
///
/// All three images must share dimensions.
pub fn blend_over(base: &mut RgbImage, overlay: &RgbImage, alpha: &GrayImage) -> Result<()> {
    for (w, h) in [overlay.dimensions(), alpha.dimensions()] {
        if (w, h) != base.dimensions() {
            return Err(AlignerError::DimensionMismatch {
                expected_width: base.width() as usize,
                expected_height: base.height() as usize,
                width: w as usize,
                height: h as usize,
            });
        }
    }

    let blend = |(px, (ov, a)): (&mut [u8], (&[u8], &u8))| {
        let a = *a as u32;
        for (b, o) in px.iter_mut().zip(ov) {
            *b = ((*o as u32 * a + *b as u32 * (255 - a) + 127) / 255) as u8;
        }
    };
    let base_buf: &mut [u8] = base;
    let overlay_buf: &[u8] = overlay;
    let alpha_buf: &[u8] = alpha;
    if alpha_buf.len() >= PARALLEL_PIXEL_THRESHOLD {
        base_buf
            .par_chunks_mut(3)
            .zip(overlay_buf.par_chunks(3).zip(alpha_buf.par_iter()))
            .for_each(blend);
    } else {
        base_buf
            .chunks_mut(3)
            .zip(overlay_buf.chunks(3).zip(alpha_buf.iter()))
            .for_each(blend);
    }
    Ok(())
}

/// Reference in neutral gray with the active channel tinted by `color` over it.
pub fn compose_overlay(
    reference: &GrayImage,
    active: &GrayImage,
    opacity: f64,
    mode: AlphaMode,
    color: [u8; 3],
) -> Result<RgbImage> {
    let mut base = gray_to_rgb(reference);
    compose_onto(&mut base, active, opacity, mode, color)?;
    Ok(base)
}

/// Blend the tinted `active` onto a prepared RGB `base`.
pub fn compose_onto(
    base: &mut RgbImage,
    active: &GrayImage,
    opacity: f64,
    mode: AlphaMode,
    color: [u8; 3],
) -> Result<()> {
    let tinted = tint(active, color);
    let alpha = overlay_alpha(active, opacity, mode);
    blend_over(base, &tinted, &alpha)
}
