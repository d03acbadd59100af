use image::{GrayImage, Luma, RgbImage};

use aligner_core::consts::ACCENT_COLOR;
use aligner_core::error::AlignerError;
use aligner_core::overlay::{blend_over, compose_overlay, overlay_alpha, AlphaMode};

fn flat(w: u32, h: u32, v: u8) -> GrayImage {
    GrayImage::from_pixel(w, h, Luma([v]))
}

// ---------------------------------------------------------------------------
// Alpha
// ---------------------------------------------------------------------------

#[test]
fn test_constant_alpha_ignores_content() {
    let active = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
    let alpha = overlay_alpha(&active, 0.5, AlphaMode::Constant);
    assert_eq!(alpha.as_raw(), &vec![127, 127]);
}

#[test]
fn test_intensity_alpha_follows_brightness() {
    let active = GrayImage::from_raw(3, 1, vec![0, 100, 255]).unwrap();
    let alpha = overlay_alpha(&active, 0.5, AlphaMode::Intensity);
    assert_eq!(alpha.as_raw(), &vec![0, 50, 127]);
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

#[test]
fn test_full_opacity_shows_tinted_active() {
    let (reference, active) = (flat(2, 2, 30), flat(2, 2, 255));
    let out =
        compose_overlay(&reference, &active, 1.0, AlphaMode::Constant, ACCENT_COLOR).unwrap();
    assert!(out.pixels().all(|p| p.0 == ACCENT_COLOR));
}

#[test]
fn test_black_active_darkens_reference_by_opacity() {
    let (reference, active) = (flat(1, 1, 200), flat(1, 1, 0));
    let out =
        compose_overlay(&reference, &active, 0.5, AlphaMode::Constant, ACCENT_COLOR).unwrap();
    // alpha 127: (0*127 + 200*128 + 127) / 255 = 100
    assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100]);
}

#[test]
fn test_intensity_mode_leaves_dark_active_transparent() {
    let out =
        compose_overlay(&flat(1, 1, 77), &flat(1, 1, 0), 1.0, AlphaMode::Intensity, ACCENT_COLOR)
            .unwrap();
    assert_eq!(out.get_pixel(0, 0).0, [77, 77, 77]);
}

#[test]
fn test_blend_rejects_mismatched_sizes() {
    let mut base = RgbImage::new(2, 2);
    let err = blend_over(&mut base, &RgbImage::new(3, 2), &flat(2, 2, 255)).unwrap_err();
    assert!(matches!(err, AlignerError::DimensionMismatch { width: 3, .. }));
}

#[test]
fn test_large_blend_matches_small_formula() {
    let reference = flat(300, 300, 120);
    let active = flat(300, 300, 255);
    let out = compose_overlay(&reference, &active, 0.5, AlphaMode::Constant, [255, 0, 0]).unwrap();
    // r: (255*127 + 120*128 + 127) / 255 = 187, g/b: (120*128 + 127) / 255 = 60
    assert_eq!(out.get_pixel(150, 150).0, [187, 60, 60]);
    assert_eq!(out.get_pixel(0, 299).0, [187, 60, 60]);
}
