//! Reduced-resolution working copies and the caches built on top of them.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::Array2;
use tracing::debug;

use crate::channel::{Channel, TransformState};
use crate::consts::{
    CACHE_KEY_DECIMALS, MIN_SCALE, PREVIEW_BUDGET_FLOOR_MEGAPIXELS, PREVIEW_REUSE_THRESHOLD,
};
use crate::levels::{apply_display_levels, auto_display_range, DisplayLevels};
use crate::overlay::gray_to_rgb;
use crate::transform::Resample;

/// Pixel budget for a megapixel setting, floored at
/// [`PREVIEW_BUDGET_FLOOR_MEGAPIXELS`].
pub fn preview_budget_pixels(megapixels: f64) -> f64 {
    megapixels.max(PREVIEW_BUDGET_FLOOR_MEGAPIXELS) * 1_000_000.0
}

/// Downsampling factor that keeps the longest edge within `max_dim` and the
/// area within `budget_pixels`. Never above 1.0, never below [`MIN_SCALE`].
pub fn compute_preview_scale(size: (usize, usize), budget_pixels: f64, max_dim: u32) -> f64 {
    let (w, h) = size;
    if w == 0 || h == 0 {
        return 1.0;
    }
    let longest = w.max(h) as f64;
    let scale_dim = (max_dim as f64 / longest).min(1.0);
    let scale_area = (budget_pixels / (w as f64 * h as f64)).sqrt().min(1.0);
    scale_dim.min(scale_area).min(1.0).max(MIN_SCALE)
}

/// Whether a preview at `scale` can use the source channels unchanged.
pub fn reuses_source(scale: f64) -> bool {
    scale >= PREVIEW_REUSE_THRESHOLD
}

/// Bilinear downsample to `max(floor(w*scale), 1)` x `max(floor(h*scale), 1)`.
pub fn downsample(channel: &Channel, scale: f64) -> Channel {
    let (w, h) = channel.size();
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);
    let src: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
            Luma([channel.data[[y as usize, x as usize]]])
        });
    let resized = imageops::resize(&src, new_w, new_h, FilterType::Triangle);
    let data = Array2::from_shape_fn((new_h as usize, new_w as usize), |(r, c)| {
        resized.get_pixel(c as u32, r as u32).0[0]
    });
    Channel::new(data, channel.format)
}

/// Working copies used by the cached preview path.
#[derive(Clone, Debug)]
pub struct PreviewChannels {
    pub scale: f64,
    /// Empty when the source channels are used directly.
    downsampled: Vec<Channel>,
}

impl PreviewChannels {
    pub fn build(channels: &[Channel], budget_pixels: f64, max_dim: u32) -> Self {
        let Some(first) = channels.first() else {
            return Self {
                scale: 1.0,
                downsampled: Vec::new(),
            };
        };
        let scale = compute_preview_scale(first.size(), budget_pixels, max_dim);
        if reuses_source(scale) {
            debug!("Preview uses source channels directly");
            return Self {
                scale,
                downsampled: Vec::new(),
            };
        }
        let downsampled: Vec<Channel> = channels.iter().map(|c| downsample(c, scale)).collect();
        debug!(
            scale,
            w = downsampled[0].width(),
            h = downsampled[0].height(),
            "Built preview channels"
        );
        Self { scale, downsampled }
    }

    pub fn is_shared(&self) -> bool {
        self.downsampled.is_empty()
    }

    /// Preview channels, borrowing `source` when no downsampling was needed.
    pub fn channels<'a>(&'a self, source: &'a [Channel]) -> &'a [Channel] {
        if self.is_shared() {
            source
        } else {
            &self.downsampled
        }
    }

    /// Translate a full-resolution transform into preview pixels.
    pub fn scaled_state(&self, state: &TransformState) -> TransformState {
        if reuses_source(self.scale) {
            *state
        } else {
            state.scaled(self.scale)
        }
    }

    /// Whole-percent preview scale, `None` at full resolution.
    pub fn percent(&self) -> Option<i64> {
        (!reuses_source(self.scale)).then(|| (self.scale * 100.0).round() as i64)
    }
}

/// Display grays and neutral RGB bases for every preview channel.
#[derive(Clone, Debug)]
pub struct DisplayEntry {
    pub version: u64,
    pub grays: Vec<GrayImage>,
    pub bases: Vec<RgbImage>,
}

impl DisplayEntry {
    pub fn build(
        version: u64,
        channels: &[Channel],
        levels: &DisplayLevels,
        brightness: f64,
    ) -> Self {
        let grays: Vec<GrayImage> = channels
            .iter()
            .map(|c| apply_display_levels(c, levels, brightness, auto_display_range(c)))
            .collect();
        let bases = grays.iter().map(gray_to_rgb).collect();
        Self {
            version,
            grays,
            bases,
        }
    }
}

/// Identity of a cached overlay. Float parameters are stored rounded to
/// [`CACHE_KEY_DECIMALS`] places.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OverlayKey {
    pub reference: usize,
    pub active: usize,
    pub dx: i64,
    pub dy: i64,
    pub angle: i64,
    pub opacity: i64,
    pub resample: Resample,
    pub version: u64,
}

fn round_key(value: f64) -> i64 {
    (value * 10f64.powi(CACHE_KEY_DECIMALS)).round() as i64
}

impl OverlayKey {
    pub fn new(
        reference: usize,
        active: usize,
        state: &TransformState,
        opacity: f64,
        resample: Resample,
        version: u64,
    ) -> Self {
        Self {
            reference,
            active,
            dx: round_key(state.dx),
            dy: round_key(state.dy),
            angle: round_key(state.angle_deg),
            opacity: round_key(opacity),
            resample,
            version,
        }
    }
}

/// Versioned display and overlay caches for the preview path.
#[derive(Debug, Default)]
pub struct PreviewCache {
    version: u64,
    display: Option<DisplayEntry>,
    overlay: Option<(OverlayKey, RgbImage)>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Drop everything derived from display settings or the channel set.
    pub fn invalidate(&mut self) {
        self.version += 1;
        self.display = None;
        self.overlay = None;
        debug!(version = self.version, "Preview cache invalidated");
    }

    /// The display entry for the current version, rebuilding it if needed.
    pub fn display(
        &mut self,
        channels: &[Channel],
        levels: &DisplayLevels,
        brightness: f64,
    ) -> &DisplayEntry {
        let version = self.version;
        let fresh = matches!(
            &self.display,
            Some(entry) if entry.version == version && entry.grays.len() == channels.len()
        );
        if !fresh {
            debug!(version, channels = channels.len(), "Rebuilding display cache");
            self.overlay = None;
            self.display = None;
        }
        self.display
            .get_or_insert_with(|| DisplayEntry::build(version, channels, levels, brightness))
    }

    pub fn overlay(&self, key: &OverlayKey) -> Option<&RgbImage> {
        match &self.overlay {
            Some((cached, image)) if cached == key => Some(image),
            _ => None,
        }
    }

    pub fn store_overlay(&mut self, key: OverlayKey, image: RgbImage) {
        self.overlay = Some((key, image));
    }
}
