#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;

use aligner_core::channel::{Channel, Region, SampleFormat, TransformState};
use aligner_core::compute::{transform_region_with_fallback, CpuBackend, TransformBackend};
use aligner_core::error::AlignerError;
use aligner_core::transform::{apply_transform, apply_transform_region, Affine, Resample};

use common::{channel_u8, dot, pattern, ramp};

// ---------------------------------------------------------------------------
// Identity and integer translation
// ---------------------------------------------------------------------------

#[test]
fn test_identity_is_exact_copy() {
    let channel = pattern(17, 11);
    for resample in Resample::ALL {
        let out = apply_transform(&channel, &TransformState::default(), resample);
        assert_eq!(out, channel, "identity changed pixels with {resample}");
    }
}

#[test]
fn test_integer_translation_moves_pixels() {
    let channel = channel_u8(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]]);
    let state = TransformState::new(1.0, -1.0, 0.0);
    let out = apply_transform(&channel, &state, Resample::Nearest);

    // Content moves right by one and up by one; uncovered pixels are zero.
    assert_eq!(out.data[[0, 2]], 5.0);
    assert_eq!(out.data[[0, 1]], 4.0);
    assert_eq!(out.data[[1, 1]], 7.0);
    assert_eq!(out.data[[2, 0]], 0.0);
    assert_eq!(out.data[[0, 0]], 0.0);
    assert_eq!(out.format, SampleFormat::U8);
}

#[test]
fn test_integer_translation_is_exact_for_every_filter() {
    let channel = ramp(8, 6, SampleFormat::U16);
    let state = TransformState::new(2.0, 1.0, 0.0);
    for resample in Resample::ALL {
        let out = apply_transform(&channel, &state, resample);
        for r in 1..6 {
            for c in 2..8 {
                assert_eq!(
                    out.data[[r, c]],
                    channel.data[[r - 1, c - 2]],
                    "{resample} at ({r},{c})"
                );
            }
        }
    }
}

#[test]
fn test_translation_out_of_frame_is_black() {
    let channel = pattern(5, 5);
    let out = apply_transform(&channel, &TransformState::new(10.0, 0.0, 0.0), Resample::Bilinear);
    assert!(out.data.iter().all(|&v| v == 0.0));
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

#[test]
fn test_quarter_turn_is_clockwise() {
    let channel = ramp(4, 4, SampleFormat::U8);
    let out = apply_transform(&channel, &TransformState::new(0.0, 0.0, 90.0), Resample::Nearest);
    for r in 0..4 {
        for c in 0..4 {
            assert_eq!(out.data[[r, c]], channel.data[[3 - c, r]], "at ({r},{c})");
        }
    }
}

#[test]
fn test_rotation_keeps_center_pixel() {
    let channel = dot(9, 9, 4, 4, 200.0, SampleFormat::U8);
    for angle in [7.5, -33.0, 180.0] {
        let state = TransformState::new(0.0, 0.0, angle);
        let out = apply_transform(&channel, &state, Resample::Nearest);
        assert_eq!(out.data[[4, 4]], 200.0, "center moved at {angle} deg");
    }
}

#[test]
fn test_integer_output_is_quantized() {
    let channel = channel_u8(&[&[0, 255], &[255, 0]]);
    let out = apply_transform(&channel, &TransformState::new(0.3, 0.2, 11.0), Resample::Bicubic);
    assert!(out
        .data
        .iter()
        .all(|&v| v.fract() == 0.0 && (0.0..=255.0).contains(&v)));
}

#[test]
fn test_float_output_is_not_quantized() {
    let channel = Channel::new(ramp(4, 4, SampleFormat::F32).data * 0.1, SampleFormat::F32);
    let out = apply_transform(&channel, &TransformState::new(0.5, 0.0, 0.0), Resample::Bilinear);
    assert_abs_diff_eq!(out.data[[1, 2]], 0.55, epsilon = 1e-5);
}

// ---------------------------------------------------------------------------
// Region transforms
// ---------------------------------------------------------------------------

#[test]
fn test_region_matches_crop_of_full_transform() {
    let states = [
        TransformState::new(3.25, -2.5, 12.0),
        TransformState::new(-4.0, 1.0, 0.0),
        TransformState::new(0.0, 0.0, -37.5),
        TransformState::new(1.5, 2.75, 180.0),
        TransformState::new(-0.4, -6.6, 90.0),
    ];
    // Even and odd sizes.
    for (w, h) in [(40, 30), (33, 21)] {
        let channel = pattern(w, h);
        let regions = [
            Region::new(7, 5, 19, 13),
            Region::new(0, 0, 5, 4),
            Region::new(w - 6, h - 3, 6, 3),
            Region::new(0, h - 1, w, 1),
            Region::new(w - 1, 0, 1, h),
            Region::new(w / 2, h / 2, 1, 1),
            Region::full(w, h),
        ];
        for state in &states {
            for resample in Resample::ALL {
                let full = apply_transform(&channel, state, resample);
                for region in regions {
                    let part = apply_transform_region(&channel, state, region, resample).unwrap();
                    assert_eq!(
                        part,
                        full.crop(region),
                        "{w}x{h} {state:?} {region:?} with {resample}"
                    );
                }
            }
        }
    }
}

#[test]
fn test_region_identity_is_crop() {
    let channel = ramp(6, 6, SampleFormat::U8);
    let region = Region::new(2, 1, 3, 4);
    let part =
        apply_transform_region(&channel, &TransformState::default(), region, Resample::Bicubic)
            .unwrap();
    assert_eq!(part.size(), (3, 4));
    assert_eq!(part.data[[0, 0]], channel.data[[1, 2]]);
}

#[test]
fn test_region_out_of_bounds_is_rejected() {
    let channel = ramp(6, 6, SampleFormat::U8);
    let state = TransformState::new(1.0, 0.0, 0.0);
    for region in [Region::new(4, 0, 3, 2), Region::new(0, 0, 0, 2)] {
        let err = apply_transform_region(&channel, &state, region, Resample::Nearest).unwrap_err();
        assert!(matches!(err, AlignerError::InvalidRegion { .. }));
    }
}

#[test]
fn test_cpu_backend_region_matches_transform() {
    let channel = pattern(32, 24);
    let state = TransformState::new(-1.5, 2.0, -4.0);
    let region = Region::new(3, 4, 10, 9);
    let backend = CpuBackend;
    assert_eq!(backend.name(), "CPU");
    let via_backend =
        transform_region_with_fallback(&backend, &channel, &state, region, Resample::Bilinear)
            .unwrap();
    let direct = apply_transform_region(&channel, &state, region, Resample::Bilinear).unwrap();
    assert_eq!(via_backend, direct);
}

// ---------------------------------------------------------------------------
// Affine coefficients
// ---------------------------------------------------------------------------

#[test]
fn test_crop_map_matches_offset_evaluation() {
    let state = TransformState::new(2.5, -1.25, 17.0);
    let full = Affine::for_state(&state, 64, 48);
    let crop = Affine::for_crop(&state, 64, 48, 10.0, 6.0);
    let (ax, ay) = full.apply(10.0 + 3.5, 6.0 + 2.5);
    let (bx, by) = crop.apply(3.5, 2.5);
    assert_abs_diff_eq!(ax, bx, epsilon = 1e-9);
    assert_abs_diff_eq!(ay, by, epsilon = 1e-9);
}

#[test]
fn test_zero_state_map_is_identity() {
    let m = Affine::for_state(&TransformState::default(), 10, 10);
    let id = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    for (a, b) in m.coefficients().iter().zip(id.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn test_resample_parses_names() {
    assert_eq!("Bicubic".parse::<Resample>().unwrap(), Resample::Bicubic);
    assert_eq!(Resample::default(), Resample::Bilinear);
    assert!("lanczos".parse::<Resample>().is_err());
}
