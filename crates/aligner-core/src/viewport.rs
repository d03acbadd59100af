//! Mapping of an image onto a bounded, scrollable canvas.
//!
//! The same resolver serves the cached preview path and the full-resolution
//! path: both compute a [`ViewLayout`] for their base image, then a
//! [`ViewportGeometry`] for the current scroll origin, and finally the
//! [`Region`] of base pixels to render and where to place it.

use crate::channel::Region;
use crate::consts::{MIN_SCALE, ZOOM_MAX, ZOOM_MIN};

/// Largest scale (at most 1.0) that fits the image into the canvas, floored
/// at [`MIN_SCALE`]. Degenerate sizes give 1.0.
pub fn compute_fit_scale(image: (usize, usize), canvas: (usize, usize)) -> f64 {
    let (iw, ih) = image;
    let (cw, ch) = canvas;
    if iw == 0 || ih == 0 || cw == 0 || ch == 0 {
        return 1.0;
    }
    let scale = (cw as f64 / iw as f64).min(ch as f64 / ih as f64).min(1.0);
    scale.max(MIN_SCALE)
}

/// Clamp a scroll start fraction to `[0, max(0, 1 - canvas/scroll)]`.
/// A non-finite fraction starts at 0.
pub fn clamp_scroll_fraction(value: f64, scroll: f64, canvas: f64) -> f64 {
    if !value.is_finite() || !(scroll > 0.0) {
        return 0.0;
    }
    let max_start = (1.0 - canvas / scroll).max(0.0);
    value.clamp(0.0, max_start)
}

/// Fraction that centers the canvas over a larger scroll area.
pub fn center_scroll_fraction(scroll: f64, canvas: f64) -> f64 {
    if scroll <= canvas || scroll <= 0.0 {
        return 0.0;
    }
    ((scroll - canvas) / 2.0).max(0.0) / scroll
}

/// Move a scroll fraction by `delta_px` canvas pixels, staying in bounds.
/// Unchanged when the content already fits.
pub fn pan_fraction(start: f64, delta_px: f64, scroll: f64, canvas: f64) -> f64 {
    if scroll <= canvas || scroll <= 0.0 {
        return start;
    }
    clamp_scroll_fraction(start + delta_px / scroll, scroll, canvas)
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() {
        return 1.0;
    }
    zoom.clamp(ZOOM_MIN, ZOOM_MAX)
}

/// Scale, displayed size and scroll area for one image on one canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewLayout {
    pub scale: f64,
    pub display_width: usize,
    pub display_height: usize,
    pub canvas_width: usize,
    pub canvas_height: usize,
    pub scroll_width: usize,
    pub scroll_height: usize,
}

/// Effective scale is fit x zoom, floored at [`MIN_SCALE`]. The scroll area
/// is never smaller than the canvas.
pub fn resolve_layout(image: (usize, usize), canvas: (usize, usize), zoom: f64) -> ViewLayout {
    let canvas_width = canvas.0.max(1);
    let canvas_height = canvas.1.max(1);
    let fit = compute_fit_scale(image, (canvas_width, canvas_height));
    let scale = (fit * clamp_zoom(zoom)).max(MIN_SCALE);
    let display_width = displayed_len(image.0, scale);
    let display_height = displayed_len(image.1, scale);
    ViewLayout {
        scale,
        display_width,
        display_height,
        canvas_width,
        canvas_height,
        scroll_width: canvas_width.max(display_width),
        scroll_height: canvas_height.max(display_height),
    }
}

impl ViewLayout {
    /// Scroll fractions that center the view.
    pub fn centered_fractions(&self) -> (f64, f64) {
        (
            center_scroll_fraction(self.scroll_width as f64, self.canvas_width as f64),
            center_scroll_fraction(self.scroll_height as f64, self.canvas_height as f64),
        )
    }

    /// Clamp stored fractions against this layout.
    pub fn clamp_fractions(&self, fx: f64, fy: f64) -> (f64, f64) {
        (
            clamp_scroll_fraction(fx, self.scroll_width as f64, self.canvas_width as f64),
            clamp_scroll_fraction(fy, self.scroll_height as f64, self.canvas_height as f64),
        )
    }

    /// Scroll-area pixel at the top-left of the canvas.
    pub fn origin(&self, fx: f64, fy: f64) -> (f64, f64) {
        (fx * self.scroll_width as f64, fy * self.scroll_height as f64)
    }
}

#[inline]
fn displayed_len(len: usize, scale: f64) -> usize {
    ((len as f64 * scale) as usize).max(1)
}

/// Visible part of a displayed image for one scroll origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportGeometry {
    pub display_width: usize,
    pub display_height: usize,
    /// Centering offsets when the image is smaller than the scroll area.
    pub offset_x: usize,
    pub offset_y: usize,
    /// Visible rectangle in displayed-image coordinates.
    pub vis_x0: f64,
    pub vis_y0: f64,
    pub vis_x1: f64,
    pub vis_y1: f64,
}

/// Intersect the canvas window at `origin` with the displayed image.
/// `None` when nothing is visible.
pub fn viewport_geometry(
    base_size: (usize, usize),
    scale: f64,
    canvas: (usize, usize),
    scroll: (usize, usize),
    origin: (f64, f64),
) -> Option<ViewportGeometry> {
    let display_width = displayed_len(base_size.0, scale);
    let display_height = displayed_len(base_size.1, scale);
    let offset_x = scroll.0.saturating_sub(display_width) / 2;
    let offset_y = scroll.1.saturating_sub(display_height) / 2;

    let img_x0 = origin.0 - offset_x as f64;
    let img_y0 = origin.1 - offset_y as f64;
    let img_x1 = img_x0 + canvas.0 as f64;
    let img_y1 = img_y0 + canvas.1 as f64;

    let vis_x0 = img_x0.max(0.0);
    let vis_y0 = img_y0.max(0.0);
    let vis_x1 = img_x1.min(display_width as f64);
    let vis_y1 = img_y1.min(display_height as f64);

    if vis_x1 <= vis_x0 || vis_y1 <= vis_y0 {
        return None;
    }
    Some(ViewportGeometry {
        display_width,
        display_height,
        offset_x,
        offset_y,
        vis_x0,
        vis_y0,
        vis_x1,
        vis_y1,
    })
}

impl ViewportGeometry {
    /// Base-image pixels covering the visible rectangle, rounded outward.
    pub fn source_rect(&self, scale: f64, base_size: (usize, usize)) -> Region {
        let (bw, bh) = base_size;
        let x0 = ((self.vis_x0 / scale) as usize).min(bw.saturating_sub(1));
        let y0 = ((self.vis_y0 / scale) as usize).min(bh.saturating_sub(1));
        let x1 = ((self.vis_x1 / scale).ceil() as usize).min(bw);
        let y1 = ((self.vis_y1 / scale).ceil() as usize).min(bh);
        Region::new(x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1))
    }

    /// Size of the rendered bitmap in canvas pixels.
    pub fn visible_size(&self) -> (u32, u32) {
        (
            ((self.vis_x1 - self.vis_x0) as u32).max(1),
            ((self.vis_y1 - self.vis_y0) as u32).max(1),
        )
    }

    /// Top-left of the rendered bitmap in scroll-area coordinates.
    pub fn placement(&self) -> (i64, i64) {
        (
            (self.offset_x as f64 + self.vis_x0) as i64,
            (self.offset_y as f64 + self.vis_y0) as i64,
        )
    }
}
