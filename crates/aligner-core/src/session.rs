//! Control-thread state of one alignment session and the operations the
//! interactive surface drives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::channel::{ensure_same_size, Channel, ChannelStack, TransformState};
use crate::compute::{create_backend, TransformBackend};
use crate::config::{AlignerConfig, Modifier};
use crate::consts::{
    BRIGHTNESS_MAX, BRIGHTNESS_MIN, OPACITY_MAX, OPACITY_MIN, PAN_FAST_MULTIPLIER,
    PAN_STEP_FRACTION, PAN_STEP_MIN, PREVIEW_MEGAPIXELS_MAX, PREVIEW_MEGAPIXELS_MIN, ZOOM_STEP,
};
use crate::error::{AlignerError, Result};
use crate::io::{add_alignment_tag, check_output_path, load_channels_from_paths, save_channels};
use crate::levels::{auto_display_range, infer_bit_depth_range, DisplayLevels, DisplayRange};
use crate::overlay::AlphaMode;
use crate::preview::{preview_budget_pixels, PreviewCache, PreviewChannels};
use crate::render::{
    render_full_resolution, render_preview, RenderRequest, RenderedView, ScrollRequest,
};
use crate::scheduler::{RenderQuality, RenderScheduler};
use crate::transform::{apply_transform, Resample};
use crate::viewport::{clamp_zoom, pan_fraction, ViewLayout};

/// Output name used when nothing is loaded.
const FALLBACK_OUTPUT_NAME: &str = "manual_aligned.tif";

pub struct AlignSession {
    config: AlignerConfig,
    backend: Arc<dyn TransformBackend>,

    stack: Option<ChannelStack>,
    transforms: Vec<TransformState>,
    reference: usize,
    active: usize,

    auto_levels: bool,
    manual_bounds: (f32, f32),
    brightness: f64,
    opacity: f64,
    alpha_mode: AlphaMode,
    resample: Resample,

    preview_megapixels: f64,
    megapixels_backup: Option<f64>,
    fast_preview: bool,
    full_resolution: bool,
    use_gpu: bool,
    preview: PreviewChannels,
    cache: PreviewCache,
    full_auto_ranges: Option<Vec<Option<DisplayRange>>>,

    zoom: f64,
    canvas: (usize, usize),
    fractions: (f64, f64),
    needs_center: bool,
    layout: Option<ViewLayout>,
    scheduler: RenderScheduler,
    pending: Option<RenderQuality>,

    last_save_path: Option<PathBuf>,
    status: String,
}

impl AlignSession {
    /// New session with the backend chosen by `config.device`.
    pub fn new(config: AlignerConfig) -> Self {
        let backend = create_backend(config.device);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: AlignerConfig, backend: Arc<dyn TransformBackend>) -> Self {
        let display = &config.display;
        let scheduler = RenderScheduler::new(Duration::from_millis(config.render_debounce_ms));
        let preview_megapixels = config
            .preview
            .megapixels
            .clamp(PREVIEW_MEGAPIXELS_MIN, PREVIEW_MEGAPIXELS_MAX);
        let mut session = Self {
            auto_levels: display.auto_levels,
            manual_bounds: display
                .valid_manual_range()
                .map_or((0.0, 255.0), |r| (r.min, r.max)),
            brightness: display.brightness.clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX),
            opacity: display.opacity.clamp(OPACITY_MIN, OPACITY_MAX),
            alpha_mode: display.alpha_mode,
            resample: config.resample,
            preview_megapixels,
            megapixels_backup: None,
            fast_preview: false,
            full_resolution: config.preview.full_resolution,
            use_gpu: false,
            preview: PreviewChannels::build(&[], 0.0, config.preview.max_dimension),
            cache: PreviewCache::new(),
            full_auto_ranges: None,
            zoom: 1.0,
            canvas: (1, 1),
            fractions: (0.0, 0.0),
            needs_center: true,
            layout: None,
            scheduler,
            pending: None,
            last_save_path: None,
            status: "Ready".to_string(),
            stack: None,
            transforms: Vec::new(),
            reference: 0,
            active: 0,
            backend,
            config,
        };
        if session.config.preview.fast {
            session.set_fast_preview(true);
        }
        session
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load `paths`. On failure the current state is left untouched.
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        let stack = load_channels_from_paths(paths)?;
        self.load_stack(stack)
    }

    /// Install an already decoded stack.
    pub fn load_stack(&mut self, stack: ChannelStack) -> Result<()> {
        stack.ensure_alignable()?;
        ensure_same_size(&stack.channels)?;

        self.manual_bounds = match self.config.display.valid_manual_range() {
            Some(range) => (range.min, range.max),
            None => infer_bit_depth_range(&stack.channels[0]),
        };
        self.transforms = vec![TransformState::default(); stack.len()];
        self.reference = 0;
        self.active = 1;
        self.last_save_path = None;
        self.full_auto_ranges = None;
        self.stack = Some(stack);
        self.rebuild_preview();
        self.refresh();
        self.status = self.with_preview_suffix("Images loaded. Use arrow keys to align.");
        Ok(())
    }

    pub fn has_channels(&self) -> bool {
        self.stack.is_some()
    }

    pub fn channel_count(&self) -> usize {
        self.stack.as_ref().map_or(0, ChannelStack::len)
    }

    pub fn stack(&self) -> Option<&ChannelStack> {
        self.stack.as_ref()
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Channel selection
    // -----------------------------------------------------------------------

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn active(&self) -> usize {
        self.active
    }

    fn check_index(&self, index: usize) -> Result<usize> {
        let total = self.channel_count();
        if total == 0 {
            return Err(AlignerError::NoChannels);
        }
        if index >= total {
            return Err(AlignerError::ChannelIndexOutOfRange { index, total });
        }
        Ok(total)
    }

    /// Pick reference and active together. An active equal to the reference
    /// moves to the next channel.
    pub fn set_channels(&mut self, reference: usize, active: usize) -> Result<()> {
        let total = self.check_index(reference)?;
        self.check_index(active)?;
        self.reference = reference;
        self.active = if active == reference {
            (reference + 1) % total
        } else {
            active
        };
        self.refresh();
        self.status = self.with_preview_suffix("Reference or active channel updated.");
        Ok(())
    }

    pub fn set_reference(&mut self, reference: usize) -> Result<()> {
        self.set_channels(reference, self.active)
    }

    pub fn set_active(&mut self, active: usize) -> Result<()> {
        self.set_channels(self.reference, active)
    }

    /// Advance the active channel, skipping the reference.
    pub fn cycle_active(&mut self) {
        let total = self.channel_count();
        if total == 0 {
            return;
        }
        self.active = (self.active + 1) % total;
        if self.active == self.reference {
            self.active = (self.active + 1) % total;
        }
        self.refresh();
        self.update_status_for_active();
    }

    // -----------------------------------------------------------------------
    // Transforms
    // -----------------------------------------------------------------------

    pub fn transforms(&self) -> &[TransformState] {
        &self.transforms
    }

    pub fn transform(&self, index: usize) -> Option<&TransformState> {
        self.transforms.get(index)
    }

    /// Replace the transform of channel `index`.
    pub fn set_transform(&mut self, index: usize, state: TransformState) -> Result<()> {
        self.check_index(index)?;
        self.transforms[index] = state;
        self.schedule_render();
        Ok(())
    }

    /// Nudge the active channel by `(dx, dy)` key steps.
    pub fn move_active(&mut self, dx: f64, dy: f64, modifier: Modifier) {
        if !self.has_channels() {
            return;
        }
        let step = self.config.keyboard.move_step(modifier);
        let state = &mut self.transforms[self.active];
        state.dx += dx * step;
        state.dy += dy * step;
        self.schedule_render();
        self.update_status_for_active();
    }

    /// Rotate the active channel by `direction` key steps (positive is clockwise).
    pub fn rotate_active(&mut self, direction: f64, modifier: Modifier) {
        if !self.has_channels() {
            return;
        }
        let step = self.config.keyboard.rotation_step_for(modifier);
        self.transforms[self.active].angle_deg += direction * step;
        self.schedule_render();
        self.update_status_for_active();
    }

    pub fn reset_active(&mut self) {
        if !self.has_channels() {
            return;
        }
        self.transforms[self.active] = TransformState::default();
        self.refresh();
        self.update_status_for_active();
    }

    pub fn reset_all(&mut self) {
        if !self.has_channels() {
            return;
        }
        self.transforms.fill(TransformState::default());
        self.refresh();
        self.status = self.with_preview_suffix("All transforms reset.");
    }

    // -----------------------------------------------------------------------
    // Display settings
    // -----------------------------------------------------------------------

    /// Effective levels: manual bounds only apply when valid.
    pub fn levels(&self) -> DisplayLevels {
        if self.auto_levels {
            DisplayLevels::Auto
        } else {
            DisplayLevels::from_bounds(self.manual_bounds.0, self.manual_bounds.1)
        }
    }

    pub fn manual_bounds(&self) -> (f32, f32) {
        self.manual_bounds
    }

    pub fn set_auto_levels(&mut self, auto: bool) {
        self.auto_levels = auto;
        self.on_display_adjustment();
    }

    pub fn set_display_range(&mut self, min: f32, max: f32) {
        self.manual_bounds = (min, max);
        self.on_display_adjustment();
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: f64) {
        self.brightness = brightness.clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX);
        self.on_display_adjustment();
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity.clamp(OPACITY_MIN, OPACITY_MAX);
        self.schedule_render();
    }

    pub fn set_alpha_mode(&mut self, mode: AlphaMode) {
        self.alpha_mode = mode;
        self.cache.invalidate();
        self.refresh();
    }

    pub fn resample(&self) -> Resample {
        self.resample
    }

    pub fn set_resample(&mut self, resample: Resample) {
        self.resample = resample;
        self.refresh();
    }

    fn on_display_adjustment(&mut self) {
        self.cache.invalidate();
        self.refresh();
    }

    // -----------------------------------------------------------------------
    // Preview settings
    // -----------------------------------------------------------------------

    pub fn preview_megapixels(&self) -> f64 {
        self.preview_megapixels
    }

    pub fn preview_scale(&self) -> f64 {
        self.preview.scale
    }

    /// Change the preview budget. Ignored (but remembered) while fast preview is on.
    pub fn set_preview_megapixels(&mut self, megapixels: f64) {
        let megapixels = megapixels.clamp(PREVIEW_MEGAPIXELS_MIN, PREVIEW_MEGAPIXELS_MAX);
        if self.fast_preview {
            self.megapixels_backup = Some(megapixels);
            return;
        }
        self.preview_megapixels = megapixels;
        self.rebuild_preview();
        self.refresh();
    }

    pub fn fast_preview(&self) -> bool {
        self.fast_preview
    }

    pub fn set_fast_preview(&mut self, enabled: bool) {
        if enabled == self.fast_preview {
            return;
        }
        self.fast_preview = enabled;
        if enabled {
            self.megapixels_backup = Some(self.preview_megapixels);
            self.preview_megapixels = self.config.preview.fast_megapixels;
        } else if let Some(backup) = self.megapixels_backup.take() {
            self.preview_megapixels = backup;
        }
        self.rebuild_preview();
        self.refresh();
    }

    pub fn full_resolution(&self) -> bool {
        self.full_resolution
    }

    pub fn set_full_resolution(&mut self, enabled: bool) {
        self.full_resolution = enabled;
        if enabled {
            self.status = "Full-res viewport enabled (preview may be slower).".to_string();
        }
        self.refresh();
    }

    pub fn gpu_available(&self) -> bool {
        self.backend.is_gpu()
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    /// Route interactive transforms through the accelerated backend.
    /// Refused when none is available.
    pub fn set_use_gpu(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.backend.is_gpu() {
            self.use_gpu = false;
            return Err(AlignerError::GpuError(
                "GPU preview unavailable: no accelerated backend could be initialized".into(),
            ));
        }
        self.use_gpu = enabled;
        self.refresh();
        Ok(())
    }

    fn rebuild_preview(&mut self) {
        let Some(stack) = &self.stack else {
            return;
        };
        let budget = preview_budget_pixels(self.preview_megapixels);
        self.preview =
            PreviewChannels::build(&stack.channels, budget, self.config.preview.max_dimension);
        self.cache.invalidate();
        self.needs_center = true;
    }

    // -----------------------------------------------------------------------
    // Zoom and scrolling
    // -----------------------------------------------------------------------

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = clamp_zoom(zoom);
        self.schedule_render();
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - ZOOM_STEP);
    }

    /// Back to fit-to-canvas and recentre.
    pub fn zoom_fit(&mut self) {
        self.needs_center = true;
        self.set_zoom(1.0);
    }

    /// One mouse-wheel notch; positive zooms in.
    pub fn zoom_wheel(&mut self, delta: i32) {
        match delta.signum() {
            1 => self.zoom_in(),
            -1 => self.zoom_out(),
            _ => {}
        }
    }

    pub fn canvas_size(&self) -> (usize, usize) {
        self.canvas
    }

    pub fn set_canvas_size(&mut self, width: usize, height: usize) {
        self.canvas = (width.max(1), height.max(1));
        self.refresh();
    }

    pub fn scroll_fractions(&self) -> (f64, f64) {
        self.fractions
    }

    /// Scrollbar positions reported by the display surface.
    pub fn set_scroll_fractions(&mut self, fx: f64, fy: f64) {
        self.fractions = (fx, fy);
        self.schedule_render();
    }

    /// Layout of the last render, if any.
    pub fn layout(&self) -> Option<&ViewLayout> {
        self.layout.as_ref()
    }

    /// Scroll by canvas pixels, clamped to the content.
    pub fn pan_by_pixels(&mut self, dx: i64, dy: i64) {
        let Some(layout) = self.layout else {
            return;
        };
        let (fx, fy) = self.fractions;
        self.fractions = (
            pan_fraction(fx, dx as f64, layout.scroll_width as f64, layout.canvas_width as f64),
            pan_fraction(fy, dy as f64, layout.scroll_height as f64, layout.canvas_height as f64),
        );
    }

    /// Keyboard pan by `(dx, dy)` steps of `max(20, 5% of canvas)`, tripled when `fast`.
    pub fn pan_key(&mut self, dx: i64, dy: i64, fast: bool) {
        let step = |len: usize| {
            let base = PAN_STEP_MIN.max((len as f64 * PAN_STEP_FRACTION) as i64);
            if fast {
                base * PAN_FAST_MULTIPLIER
            } else {
                base
            }
        };
        let (step_x, step_y) = (step(self.canvas.0), step(self.canvas.1));
        self.pan_by_pixels(dx * step_x, dy * step_y);
        self.schedule_render();
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Draft now, final after the debounce delay.
    fn schedule_render(&mut self) {
        self.pending = Some(RenderQuality::Draft);
        self.scheduler.request(Instant::now());
    }

    /// Immediate final render, dropping any armed one.
    fn refresh(&mut self) {
        self.scheduler.cancel();
        self.pending = Some(RenderQuality::Final);
    }

    /// The render the display surface should produce at `now`, if any.
    pub fn next_render(&mut self, now: Instant) -> Option<RenderQuality> {
        self.pending.take().or_else(|| self.scheduler.poll(now))
    }

    /// Whether a final render is armed.
    pub fn final_render_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    pub fn time_until_final_render(&self, now: Instant) -> Option<Duration> {
        self.scheduler.time_until_final(now)
    }

    /// Whole-channel auto ranges, computed once per loaded stack.
    fn full_auto_ranges(&mut self) -> &[Option<DisplayRange>] {
        let count = self.channel_count();
        let stale = self
            .full_auto_ranges
            .as_ref()
            .map_or(true, |ranges| ranges.len() != count);
        if stale {
            let ranges = self
                .stack
                .as_ref()
                .map(|s| s.channels.iter().map(auto_display_range).collect())
                .unwrap_or_default();
            debug!(channels = count, "Computed full-resolution auto ranges");
            self.full_auto_ranges = Some(ranges);
        }
        self.full_auto_ranges.as_deref().unwrap_or(&[])
    }

    /// Render the current view. `None` when nothing is loaded.
    pub fn render(&mut self, quality: RenderQuality) -> Result<Option<RenderedView>> {
        if self.stack.is_none() {
            return Ok(None);
        }
        self.zoom = clamp_zoom(self.zoom);
        let auto_ranges: Vec<Option<DisplayRange>> = if self.full_resolution {
            self.full_auto_ranges().to_vec()
        } else {
            Vec::new()
        };
        let Some(stack) = &self.stack else {
            return Ok(None);
        };

        let request = RenderRequest {
            reference: self.reference,
            active: self.active,
            state: self.transforms[self.active],
            levels: self.levels(),
            brightness: self.brightness,
            opacity: self.opacity,
            alpha_mode: self.alpha_mode,
            accent: self.config.display.accent_color,
            resample: self.resample,
            quality,
            canvas: self.canvas,
            zoom: self.zoom,
            scroll: if self.needs_center {
                ScrollRequest::Center
            } else {
                ScrollRequest::Keep(self.fractions.0, self.fractions.1)
            },
            backend: self.use_gpu.then_some(self.backend.as_ref()),
        };

        let view = if self.full_resolution {
            render_full_resolution(&stack.channels, &auto_ranges, &request)?
        } else {
            render_preview(&mut self.cache, &self.preview, &stack.channels, &request)?
        };
        self.layout = Some(view.layout);
        self.fractions = view.fractions;
        self.needs_center = false;
        Ok(Some(view))
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    /// Full-resolution channels with their transforms applied; the reference
    /// is copied untouched.
    pub fn aligned_channels(&self) -> Result<Vec<Channel>> {
        let stack = self.stack.as_ref().ok_or(AlignerError::NoChannels)?;
        Ok(align_channels(
            &stack.channels,
            &self.transforms,
            self.reference,
            self.resample,
        ))
    }

    /// Write the aligned stack to `path`. Never overwrites a source or an
    /// existing file.
    pub fn save_aligned(&mut self, path: &Path) -> Result<()> {
        let stack = self.stack.as_ref().ok_or(AlignerError::NoChannels)?;
        check_output_path(path, &stack.source_paths)?;
        let channels = self.aligned_channels()?;
        let metadata = add_alignment_tag(stack.metadata.as_ref(), &self.config.alignment_tag);
        save_channels(&channels, path, Some(&metadata), &stack.save_options)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(path = %path.display(), "Saved aligned stack");
        self.status = format!("Saved aligned stack ({} tag): {name}", self.config.alignment_tag);
        self.last_save_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Suggested file name for the next save.
    pub fn default_output_name(&self) -> String {
        if let Some(name) = self.last_save_path.as_ref().and_then(|p| p.file_name()) {
            return name.to_string_lossy().into_owned();
        }
        match self
            .stack
            .as_ref()
            .and_then(|s| s.source_paths.first())
            .and_then(|p| p.file_stem())
        {
            Some(stem) => format!("{}_manual_aligned.tif", stem.to_string_lossy()),
            None => FALLBACK_OUTPUT_NAME.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self) -> &str {
        &self.status
    }

    /// `Active C<n> | dx=.. dy=.. angle=.. deg`, plus the preview suffix.
    pub fn status_line(&self) -> String {
        match self.transforms.get(self.active) {
            Some(state) => self.with_preview_suffix(&format!(
                "Active C{} | dx={:.2} dy={:.2} angle={:.2} deg",
                self.active + 1,
                state.dx,
                state.dy,
                state.angle_deg
            )),
            None => self.status.clone(),
        }
    }

    fn update_status_for_active(&mut self) {
        self.status = self.status_line();
    }

    fn with_preview_suffix(&self, message: &str) -> String {
        match self.preview.percent() {
            Some(percent) => format!("{message} Preview: {percent}% (export full res)."),
            None => message.to_string(),
        }
    }
}

/// Apply `transforms` to every channel except `reference`, which is copied.
pub fn align_channels(
    channels: &[Channel],
    transforms: &[TransformState],
    reference: usize,
    resample: Resample,
) -> Vec<Channel> {
    channels
        .par_iter()
        .enumerate()
        .map(|(idx, channel)| {
            match transforms.get(idx) {
                Some(state) if idx != reference => apply_transform(channel, state, resample),
                _ => channel.clone(),
            }
        })
        .collect()
}
