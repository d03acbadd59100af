//! The two render paths: cached preview overlay and full-resolution viewport.

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use tracing::debug;

use crate::channel::{Channel, Region, TransformState};
use crate::compute::{transform_region_with_fallback, transform_with_fallback, TransformBackend};
use crate::error::{AlignerError, Result};
use crate::levels::{apply_display_levels, DisplayLevels, DisplayRange};
use crate::overlay::{compose_onto, compose_overlay, AlphaMode};
use crate::preview::{OverlayKey, PreviewCache, PreviewChannels};
use crate::scheduler::RenderQuality;
use crate::transform::{apply_transform, Resample};
use crate::viewport::{resolve_layout, viewport_geometry, ViewLayout};

/// Where the canvas should sit over the scroll area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScrollRequest {
    /// Center the view (after load or a scale-affecting rebuild).
    Center,
    /// Keep the given start fractions, clamped to the new layout.
    Keep(f64, f64),
}

/// Everything a render needs besides the pixel sources.
#[derive(Clone, Copy)]
pub struct RenderRequest<'a> {
    pub reference: usize,
    pub active: usize,
    /// Full-resolution transform of the active channel.
    pub state: TransformState,
    pub levels: DisplayLevels,
    pub brightness: f64,
    pub opacity: f64,
    pub alpha_mode: AlphaMode,
    pub accent: [u8; 3],
    /// Filter for settled renders.
    pub resample: Resample,
    pub quality: RenderQuality,
    pub canvas: (usize, usize),
    pub zoom: f64,
    pub scroll: ScrollRequest,
    /// Accelerated backend, when enabled.
    pub backend: Option<&'a dyn TransformBackend>,
}

/// A rendered window plus the layout it was placed in.
#[derive(Clone, Debug)]
pub struct RenderedView {
    /// Visible bitmap, `None` when nothing of the image is on screen.
    pub image: Option<RgbImage>,
    /// Top-left of `image` in scroll-area coordinates.
    pub pos_x: i64,
    pub pos_y: i64,
    pub layout: ViewLayout,
    /// Scroll start fractions actually used.
    pub fractions: (f64, f64),
}

fn check_indices(total: usize, request: &RenderRequest<'_>) -> Result<()> {
    if total == 0 {
        return Err(AlignerError::NoChannels);
    }
    for index in [request.reference, request.active] {
        if index >= total {
            return Err(AlignerError::ChannelIndexOutOfRange { index, total });
        }
    }
    Ok(())
}

/// Warp an 8-bit display image.
fn warp_display(
    gray: &GrayImage,
    state: &TransformState,
    resample: Resample,
    backend: Option<&dyn TransformBackend>,
) -> GrayImage {
    if state.is_identity() {
        return gray.clone();
    }
    let channel = Channel::from_gray(gray);
    let moved = match backend {
        Some(backend) => transform_with_fallback(backend, &channel, state, resample),
        None => apply_transform(&channel, state, resample),
    };
    moved.to_gray()
}

fn fit_to(image: RgbImage, size: (u32, u32), filter: FilterType) -> RgbImage {
    if image.dimensions() == size {
        image
    } else {
        imageops::resize(&image, size.0, size.1, filter)
    }
}

/// Place `base_size` content on the canvas and resolve the visible window.
fn place(
    base_size: (usize, usize),
    request: &RenderRequest<'_>,
) -> (ViewLayout, (f64, f64), Option<crate::viewport::ViewportGeometry>) {
    let layout = resolve_layout(base_size, request.canvas, request.zoom);
    let fractions = match request.scroll {
        ScrollRequest::Center => layout.centered_fractions(),
        ScrollRequest::Keep(fx, fy) => layout.clamp_fractions(fx, fy),
    };
    let origin = layout.origin(fractions.0, fractions.1);
    let geometry = viewport_geometry(
        base_size,
        layout.scale,
        (layout.canvas_width, layout.canvas_height),
        (layout.scroll_width, layout.scroll_height),
        origin,
    );
    (layout, fractions, geometry)
}

/// Render from the cached preview overlay.
///
/// The overlay (reference base plus moved, tinted active channel at preview
/// resolution) is rebuilt only when its [`OverlayKey`] changes; each call then
/// crops and scales the visible part.
pub fn render_preview(
    cache: &mut PreviewCache,
    preview: &PreviewChannels,
    source: &[Channel],
    request: &RenderRequest<'_>,
) -> Result<RenderedView> {
    check_indices(source.len(), request)?;
    let started = Instant::now();
    let channels = preview.channels(source);
    let resample = request.quality.resample(request.resample);
    let key = OverlayKey::new(
        request.reference,
        request.active,
        &request.state,
        request.opacity,
        resample,
        cache.version(),
    );

    if cache.overlay(&key).is_none() {
        let entry = cache.display(channels, &request.levels, request.brightness);
        let mut composed = entry.bases[request.reference].clone();
        let moved = warp_display(
            &entry.grays[request.active],
            &preview.scaled_state(&request.state),
            resample,
            request.backend,
        );
        compose_onto(
            &mut composed,
            &moved,
            request.opacity,
            request.alpha_mode,
            request.accent,
        )?;
        cache.store_overlay(key, composed);
    }
    let Some(overlay) = cache.overlay(&key) else {
        return Err(AlignerError::NoChannels);
    };

    let base_size = (overlay.width() as usize, overlay.height() as usize);
    let (layout, fractions, geometry) = place(base_size, request);
    let Some(geometry) = geometry else {
        return Ok(RenderedView {
            image: None,
            pos_x: 0,
            pos_y: 0,
            layout,
            fractions,
        });
    };

    let rect = geometry.source_rect(layout.scale, base_size);
    let crop = imageops::crop_imm(
        overlay,
        rect.x as u32,
        rect.y as u32,
        rect.width as u32,
        rect.height as u32,
    )
    .to_image();
    let image = fit_to(crop, geometry.visible_size(), request.quality.view_filter());
    let (pos_x, pos_y) = geometry.placement();
    debug!(
        quality = ?request.quality,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Rendered preview view"
    );
    Ok(RenderedView {
        image: Some(image),
        pos_x,
        pos_y,
        layout,
        fractions,
    })
}

/// Render the visible window straight from the full-resolution channels.
///
/// Only the visible source rectangle is transformed, so the pixels match the
/// same window of a full export. `auto_ranges` holds per-channel auto levels
/// computed over the whole channel.
pub fn render_full_resolution(
    source: &[Channel],
    auto_ranges: &[Option<DisplayRange>],
    request: &RenderRequest<'_>,
) -> Result<RenderedView> {
    check_indices(source.len(), request)?;
    let started = Instant::now();
    let base_size = source[request.reference].size();
    let (layout, fractions, geometry) = place(base_size, request);
    let Some(geometry) = geometry else {
        return Ok(RenderedView {
            image: None,
            pos_x: 0,
            pos_y: 0,
            layout,
            fractions,
        });
    };

    let region: Region = geometry.source_rect(layout.scale, base_size);
    let range_for = |index: usize| match request.levels {
        DisplayLevels::Manual(range) => Some(range),
        DisplayLevels::Auto => auto_ranges.get(index).copied().flatten(),
    };

    let reference_crop = source[request.reference].crop(region);
    let reference_gray = apply_display_levels(
        &reference_crop,
        &request.levels,
        request.brightness,
        range_for(request.reference),
    );

    let resample = request.quality.resample(request.resample);
    let active = &source[request.active];
    let active_crop = match request.backend {
        Some(backend) => {
            transform_region_with_fallback(backend, active, &request.state, region, resample)?
        }
        None => crate::transform::apply_transform_region(active, &request.state, region, resample)?,
    };
    let active_gray = apply_display_levels(
        &active_crop,
        &request.levels,
        request.brightness,
        range_for(request.active),
    );

    let composed = compose_overlay(
        &reference_gray,
        &active_gray,
        request.opacity,
        request.alpha_mode,
        request.accent,
    )?;
    let image = fit_to(composed, geometry.visible_size(), request.quality.view_filter());
    let (pos_x, pos_y) = geometry.placement();
    debug!(
        ?region,
        quality = ?request.quality,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Rendered full-resolution view"
    );
    Ok(RenderedView {
        image: Some(image),
        pos_x,
        pos_y,
        layout,
        fractions,
    })
}
