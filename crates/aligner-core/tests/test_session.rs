#[allow(dead_code)]
mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use aligner_core::channel::{Channel, ChannelStack, SampleFormat, TransformState};
use aligner_core::compute::CpuBackend;
use aligner_core::config::{AlignerConfig, Modifier};
use aligner_core::error::{AlignerError, ConflictKind};
use aligner_core::io::metadata::TAG_IMAGE_DESCRIPTION;
use aligner_core::io::{load_channels_from_paths, MetadataDirectory, SaveOptions};
use aligner_core::levels::{DisplayLevels, DisplayRange};
use aligner_core::scheduler::RenderQuality;
use aligner_core::session::AlignSession;

use common::{pattern, ramp, write_single_page_files};

fn session() -> AlignSession {
    AlignSession::with_backend(AlignerConfig::default(), Arc::new(CpuBackend))
}

fn stack_of(channels: Vec<Channel>) -> ChannelStack {
    ChannelStack {
        source_paths: vec![PathBuf::from("/data/run/stack.tif")],
        channels,
        metadata: None,
        save_options: SaveOptions::default(),
    }
}

fn loaded(n: usize) -> AlignSession {
    let mut s = session();
    s.load_stack(stack_of((0..n).map(|_| pattern(40, 30)).collect()))
        .unwrap();
    s
}

/// Drain the render queue at `now`.
fn drain(s: &mut AlignSession, now: Instant) -> Vec<RenderQuality> {
    std::iter::from_fn(|| s.next_render(now)).collect()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_empty_session_renders_nothing() {
    let mut s = session();
    assert!(!s.has_channels());
    assert_eq!(s.status(), "Ready");
    assert!(s.render(RenderQuality::Final).unwrap().is_none());
    assert!(matches!(s.aligned_channels(), Err(AlignerError::NoChannels)));
}

#[test]
fn test_load_resets_selection_and_transforms() {
    let mut s = loaded(3);
    s.move_active(1.0, 0.0, Modifier::None);
    s.load_stack(stack_of(vec![pattern(40, 30), pattern(40, 30)]))
        .unwrap();
    assert_eq!((s.reference(), s.active()), (0, 1));
    assert_eq!(s.transforms(), &[TransformState::default(); 2]);
    assert_eq!(s.status(), "Images loaded. Use arrow keys to align.");
    assert_eq!(drain(&mut s, Instant::now()), vec![RenderQuality::Final]);
}

#[test]
fn test_failed_load_keeps_previous_state() {
    let mut s = loaded(3);
    s.move_active(0.0, 1.0, Modifier::None);
    let err = s.load_stack(stack_of(vec![pattern(40, 30)])).unwrap_err();
    assert!(matches!(err, AlignerError::NotEnoughChannels(1)));
    assert_eq!(s.channel_count(), 3);
    assert_eq!(s.transform(1), Some(&TransformState::new(0.0, 1.0, 0.0)));
}

#[test]
fn test_load_sets_manual_bounds_from_bit_depth() {
    let mut s = session();
    s.load_stack(stack_of(vec![
        ramp(8, 8, SampleFormat::U16),
        ramp(8, 8, SampleFormat::U16),
    ]))
    .unwrap();
    assert_eq!(s.manual_bounds(), (0.0, 65535.0));
    s.set_auto_levels(false);
    assert!(matches!(s.levels(), DisplayLevels::Manual(r) if r.max == 65535.0));
}

#[test]
fn test_configured_manual_range_survives_load() {
    let mut config = AlignerConfig::default();
    config.display.auto_levels = false;
    config.display.manual_range = DisplayRange::new(100.0, 4000.0);
    let mut s = AlignSession::with_backend(config, Arc::new(CpuBackend));
    s.load_stack(stack_of(vec![
        ramp(8, 8, SampleFormat::U16),
        ramp(8, 8, SampleFormat::U16),
    ]))
    .unwrap();
    assert_eq!(s.manual_bounds(), (100.0, 4000.0));
    assert!(matches!(s.levels(), DisplayLevels::Manual(r) if r.min == 100.0));
}

// ---------------------------------------------------------------------------
// Channel selection
// ---------------------------------------------------------------------------

#[test]
fn test_active_equal_to_reference_moves_on() {
    let mut s = loaded(3);
    s.set_channels(2, 2).unwrap();
    assert_eq!((s.reference(), s.active()), (2, 0));
    assert_eq!(s.status(), "Reference or active channel updated.");
    assert!(matches!(
        s.set_active(3),
        Err(AlignerError::ChannelIndexOutOfRange { index: 3, total: 3 })
    ));
}

#[test]
fn test_cycle_skips_reference() {
    let mut s = loaded(3);
    s.set_reference(2).unwrap();
    assert_eq!(s.active(), 1);
    s.cycle_active();
    assert_eq!(s.active(), 0);
    s.cycle_active();
    assert_eq!(s.active(), 1);
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

#[test]
fn test_nudges_update_active_transform_and_status() {
    let mut s = loaded(2);
    s.move_active(1.0, 0.0, Modifier::Coarse);
    s.move_active(0.0, -1.0, Modifier::Fine);
    s.rotate_active(-1.0, Modifier::None);
    let state = *s.transform(1).unwrap();
    assert_eq!((state.dx, state.dy), (10.0, -0.5));
    assert!((state.angle_deg + 0.1).abs() < 1e-12);
    assert_eq!(s.status(), "Active C2 | dx=10.00 dy=-0.50 angle=-0.10 deg");
    assert_eq!(s.transform(0), Some(&TransformState::default()));
}

#[test]
fn test_nudge_renders_draft_then_final() {
    let mut s = loaded(2);
    let t0 = Instant::now();
    drain(&mut s, t0);
    s.move_active(1.0, 0.0, Modifier::None);
    assert_eq!(s.next_render(Instant::now()), Some(RenderQuality::Draft));
    assert!(s.final_render_armed());
    assert_eq!(s.next_render(Instant::now() + Duration::from_secs(5)), Some(RenderQuality::Final));
    assert!(!s.final_render_armed());
}

#[test]
fn test_reset_all_clears_every_transform() {
    let mut s = loaded(3);
    s.move_active(1.0, 1.0, Modifier::None);
    s.cycle_active();
    s.rotate_active(1.0, Modifier::Coarse);
    s.reset_active();
    assert_eq!(s.transform(2), Some(&TransformState::default()));
    assert_ne!(s.transform(1), Some(&TransformState::default()));
    s.reset_all();
    assert!(s.transforms().iter().all(TransformState::is_identity));
    assert_eq!(s.status(), "All transforms reset.");
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[test]
fn test_display_settings_are_clamped() {
    let mut s = loaded(2);
    s.set_brightness(9.0);
    assert_eq!(s.brightness(), 2.5);
    s.set_opacity(0.0);
    assert_eq!(s.opacity(), 0.05);
}

#[test]
fn test_fast_preview_restores_budget() {
    let mut s = loaded(2);
    s.set_preview_megapixels(3.0);
    s.set_fast_preview(true);
    assert_eq!(s.preview_megapixels(), 0.5);
    s.set_preview_megapixels(4.0);
    assert_eq!(s.preview_megapixels(), 0.5);
    s.set_fast_preview(false);
    assert_eq!(s.preview_megapixels(), 4.0);
}

#[test]
fn test_gpu_refused_without_accelerated_backend() {
    let mut s = loaded(2);
    assert!(!s.gpu_available());
    assert!(matches!(s.set_use_gpu(true), Err(AlignerError::GpuError(_))));
    assert!(!s.use_gpu());
    assert!(s.set_use_gpu(false).is_ok());
}

#[test]
fn test_status_mentions_reduced_preview() {
    let mut config = AlignerConfig::default();
    config.preview.max_dimension = 100;
    let mut s = AlignSession::with_backend(config, Arc::new(CpuBackend));
    s.load_stack(stack_of(vec![pattern(400, 400), pattern(400, 400)]))
        .unwrap();
    assert!((s.preview_scale() - 0.25).abs() < 1e-12);
    assert_eq!(
        s.status(),
        "Images loaded. Use arrow keys to align. Preview: 25% (export full res)."
    );
}

// ---------------------------------------------------------------------------
// Viewport
// ---------------------------------------------------------------------------

#[test]
fn test_render_fills_canvas_and_centers() {
    let mut s = loaded(2);
    s.set_canvas_size(80, 60);
    let view = s.render(RenderQuality::Final).unwrap().unwrap();
    assert_eq!(view.image.unwrap().dimensions(), (40, 30));
    assert_eq!((view.pos_x, view.pos_y), (20, 15));
}

#[test]
fn test_full_resolution_view_matches_preview_geometry() {
    let mut s = loaded(2);
    s.set_canvas_size(20, 20);
    let preview = s.render(RenderQuality::Final).unwrap().unwrap();
    s.set_full_resolution(true);
    let full = s.render(RenderQuality::Final).unwrap().unwrap();
    assert_eq!(preview.layout, full.layout);
    assert_eq!(
        preview.image.unwrap().dimensions(),
        full.image.unwrap().dimensions()
    );
}

#[test]
fn test_zoom_limits_and_fit() {
    let mut s = loaded(2);
    for _ in 0..200 {
        s.zoom_in();
    }
    assert_eq!(s.zoom(), 32.0);
    s.zoom_wheel(-1);
    assert_eq!(s.zoom(), 31.75);
    s.zoom_fit();
    assert_eq!(s.zoom(), 1.0);
}

#[test]
fn test_keyboard_pan_moves_scroll_fraction() {
    let mut s = loaded(2);
    s.set_canvas_size(20, 15);
    s.set_zoom(4.0);
    s.render(RenderQuality::Final).unwrap();
    // 40x30 at 0.5 fit x 4 zoom = 80x60 on a 20x15 canvas.
    let (fx, fy) = s.scroll_fractions();
    assert!((fx - 0.375).abs() < 1e-12);
    assert!((fy - 0.375).abs() < 1e-12);

    s.pan_key(1, 0, false);
    let (fx2, fy2) = s.scroll_fractions();
    assert!((fx2 - 0.625).abs() < 1e-12);
    assert_eq!(fy2, fy);

    s.pan_key(1, 0, true);
    assert!((s.scroll_fractions().0 - 0.75).abs() < 1e-12);
}

#[test]
fn test_non_finite_scroll_fractions_fall_back_to_origin() {
    let mut s = loaded(2);
    s.set_canvas_size(20, 15);
    s.set_zoom(4.0);
    s.render(RenderQuality::Final).unwrap();

    s.set_scroll_fractions(f64::NAN, f64::INFINITY);
    let view = s.render(RenderQuality::Final).unwrap().unwrap();
    assert_eq!(view.fractions, (0.0, 0.0));
    assert_eq!(s.scroll_fractions(), (0.0, 0.0));
    assert!(view.image.is_some());
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[test]
fn test_aligned_channels_leave_reference_untouched() {
    let mut s = loaded(2);
    s.set_channels(1, 0).unwrap();
    s.move_active(1.0, 1.0, Modifier::None);
    s.cycle_active();
    let out = s.aligned_channels().unwrap();
    assert_eq!(s.active(), 0);
    assert_eq!(out[1], pattern(40, 30));
    assert_ne!(out[0], pattern(40, 30));
}

#[test]
fn test_save_writes_tagged_stack_and_remembers_name() {
    let dir = TempDir::new().unwrap();
    let paths = write_single_page_files(dir.path(), &[pattern(10, 10), pattern(10, 10)]);
    let mut s = session();
    s.load(&paths).unwrap();
    assert_eq!(s.default_output_name(), "c1_manual_aligned.tif");

    s.move_active(1.0, 0.0, Modifier::None);
    let out = dir.path().join("result.tif");
    s.save_aligned(&out).unwrap();
    assert_eq!(s.status(), "Saved aligned stack (Manual Aligned tag): result.tif");
    assert_eq!(s.default_output_name(), "result.tif");

    let saved = load_channels_from_paths(&[&out]).unwrap();
    assert_eq!(saved.len(), 2);
    let description = saved.metadata.as_ref().and_then(|m| m.description());
    assert_eq!(description, Some("Manual Aligned"));
}

#[test]
fn test_save_keeps_non_ascii_description_and_adds_marker() {
    let dir = TempDir::new().unwrap();
    let mut metadata = MetadataDirectory::new();
    metadata.set(TAG_IMAGE_DESCRIPTION, "Pixel size 0.1 \u{b5}m");
    let mut stack = stack_of(vec![pattern(10, 10), pattern(10, 10)]);
    stack.metadata = Some(metadata);
    let mut s = session();
    s.load_stack(stack).unwrap();

    let out = dir.path().join("aligned.tif");
    s.save_aligned(&out).unwrap();
    let saved = load_channels_from_paths(&[&out]).unwrap();
    let description = saved.metadata.as_ref().and_then(|m| m.description());
    assert_eq!(description, Some("Pixel size 0.1 um | Manual Aligned"));
}

#[test]
fn test_save_refuses_source_and_existing_paths() {
    let dir = TempDir::new().unwrap();
    let paths = write_single_page_files(dir.path(), &[pattern(6, 6), pattern(6, 6)]);
    let mut s = session();
    s.load(&paths).unwrap();

    let before = std::fs::read(&paths[0]).unwrap();
    let err = s.save_aligned(&paths[0]).unwrap_err();
    assert!(matches!(
        err,
        AlignerError::SaveConflict {
            kind: ConflictKind::SourcePath,
            ..
        }
    ));
    assert_eq!(std::fs::read(&paths[0]).unwrap(), before);

    let out = dir.path().join("once.tif");
    s.save_aligned(&out).unwrap();
    assert!(matches!(
        s.save_aligned(&out),
        Err(AlignerError::SaveConflict {
            kind: ConflictKind::AlreadyExists,
            ..
        })
    ));
}

#[test]
fn test_default_output_name_without_inputs() {
    assert_eq!(session().default_output_name(), "manual_aligned.tif");
}
