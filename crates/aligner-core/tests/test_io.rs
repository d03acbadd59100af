#[allow(dead_code)]
mod common;

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array2;
use tempfile::TempDir;

use aligner_core::channel::{Channel, SampleFormat};
use aligner_core::error::{AlignerError, ConflictKind};
use aligner_core::io::metadata::TAG_IMAGE_DESCRIPTION;
use aligner_core::io::{
    add_alignment_tag, check_output_path, load_channels_from_paths, save_channels, Compression,
    MetadataDirectory, Resolution, ResolutionUnit, SaveOptions,
};

use common::{pattern, ramp, write_single_page_files, write_stack};

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_load_separate_files() {
    let dir = TempDir::new().unwrap();
    let channels = [pattern(12, 8), ramp(12, 8, SampleFormat::U8)];
    let paths = write_single_page_files(dir.path(), &channels);
    let stack = load_channels_from_paths(&paths).unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack.dimensions(), Some((12, 8)));
    assert_eq!(stack.channels[0], pattern(12, 8));
    assert_eq!(stack.source_paths, paths);
}

#[test]
fn test_load_multipage_stack_keeps_formats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tif");
    let float = Channel::new(Array2::from_elem((5, 7), 0.25), SampleFormat::F32);
    write_stack(&path, &[ramp(7, 5, SampleFormat::U16), float.clone()], None);

    let stack = load_channels_from_paths(&[&path]).unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack.channels[0].format, SampleFormat::U16);
    assert_eq!(stack.channels[0].data[[4, 6]], 34.0);
    assert_eq!(stack.channels[1], float);
}

#[test]
fn test_load_single_rgb_file_splits_bands() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rgb.png");
    RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])).save(&path).unwrap();

    let stack = load_channels_from_paths(&[&path]).unwrap();
    assert_eq!(stack.len(), 3);
    assert_eq!(stack.channels[0].data[[0, 0]], 10.0);
    assert_eq!(stack.channels[2].data[[2, 3]], 30.0);
}

#[test]
fn test_load_color_files_collapse_to_luminance() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])).save(&a).unwrap();
    GrayImage::from_pixel(4, 4, Luma([7])).save(&b).unwrap();

    let stack = load_channels_from_paths(&[&a, &b]).unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack.channels[0].data[[1, 1]], 100.0);
    assert_eq!(stack.channels[1].data[[1, 1]], 7.0);
}

#[test]
fn test_load_needs_two_channels() {
    let dir = TempDir::new().unwrap();
    let paths = write_single_page_files(dir.path(), &[pattern(6, 6)]);
    let err = load_channels_from_paths(&paths).unwrap_err();
    assert!(matches!(err, AlignerError::NotEnoughChannels(1)));

    let none: [&str; 0] = [];
    assert!(matches!(load_channels_from_paths(&none), Err(AlignerError::NoInputs)));
}

#[test]
fn test_load_rejects_mismatched_dimensions() {
    let dir = TempDir::new().unwrap();
    let paths = write_single_page_files(dir.path(), &[pattern(6, 6), pattern(7, 6)]);
    let err = load_channels_from_paths(&paths).unwrap_err();
    assert!(matches!(
        err,
        AlignerError::DimensionMismatch {
            expected_width: 6,
            width: 7,
            ..
        }
    ));
}

#[test]
fn test_load_missing_file_names_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.tif");
    let other = dir.path().join("other.tif");
    match load_channels_from_paths(&[&missing, &other]) {
        Err(AlignerError::Load { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected load error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Metadata and save options
// ---------------------------------------------------------------------------

#[test]
fn test_alignment_tag_rules() {
    let tagged = add_alignment_tag(None, "Manual Aligned");
    assert_eq!(tagged.description(), Some("Manual Aligned"));

    let mut source = MetadataDirectory::new();
    source.set(TAG_IMAGE_DESCRIPTION, "Night run 3");
    source.set(305, "Capture 2.1");
    let tagged = add_alignment_tag(Some(&source), "Manual Aligned");
    assert_eq!(tagged.description(), Some("Night run 3 | Manual Aligned"));
    assert_eq!(tagged.get(305), Some("Capture 2.1"));

    let again = add_alignment_tag(Some(&tagged), "manual aligned");
    assert_eq!(again, tagged);
}

#[test]
fn test_metadata_and_options_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tagged.tif");
    let mut metadata = MetadataDirectory::new();
    metadata.set(TAG_IMAGE_DESCRIPTION, "Sample | Manual Aligned");
    metadata.set(271, "Lab scope");
    let options = SaveOptions {
        resolution: Some(Resolution::uniform(300, ResolutionUnit::Centimeter)),
        compression: Compression::Lzw,
        icc_profile: Some(vec![1, 2, 3, 4, 5]),
    };
    let channels = [pattern(9, 9), ramp(9, 9, SampleFormat::U8)];
    save_channels(&channels, &path, Some(&metadata), &options).unwrap();

    let stack = load_channels_from_paths(&[&path]).unwrap();
    assert_eq!(stack.channels, channels.to_vec());
    assert_eq!(stack.metadata, Some(metadata));
    assert_eq!(stack.save_options, options);
}

#[test]
fn test_non_ascii_tags_are_transliterated_on_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("micro.tif");
    let mut source = MetadataDirectory::new();
    source.set(TAG_IMAGE_DESCRIPTION, "Pixel size 0.1 \u{b5}m");
    source.set(33432, "\u{a9} Imaging Core");
    let metadata = add_alignment_tag(Some(&source), "Manual Aligned");

    let channels = [pattern(6, 6), pattern(6, 6)];
    save_channels(&channels, &path, Some(&metadata), &SaveOptions::default()).unwrap();

    let stack = load_channels_from_paths(&[&path]).unwrap();
    assert_eq!(stack.len(), 2);
    let saved = stack.metadata.unwrap();
    assert_eq!(saved.description(), Some("Pixel size 0.1 um | Manual Aligned"));
    assert_eq!(saved.get(33432), Some("(c) Imaging Core"));
}

// ---------------------------------------------------------------------------
// Save guards
// ---------------------------------------------------------------------------

#[test]
fn test_output_may_not_be_a_source() {
    let dir = TempDir::new().unwrap();
    let paths = write_single_page_files(dir.path(), &[pattern(4, 4), pattern(4, 4)]);
    let sneaky = dir.path().join("sub").join("..").join("c1.tif");
    let err = check_output_path(&sneaky, &paths).unwrap_err();
    assert!(matches!(
        err,
        AlignerError::SaveConflict {
            kind: ConflictKind::SourcePath,
            ..
        }
    ));
}

#[test]
fn test_output_may_not_exist() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("taken.tif");
    std::fs::write(&existing, b"x").unwrap();
    let err = check_output_path(&existing, &[]).unwrap_err();
    assert!(matches!(
        err,
        AlignerError::SaveConflict {
            kind: ConflictKind::AlreadyExists,
            ..
        }
    ));
    assert!(check_output_path(&dir.path().join("fresh.tif"), &[]).is_ok());
}

#[test]
fn test_save_never_replaces_an_existing_file() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("keep.tif");
    std::fs::write(&existing, b"original bytes").unwrap();

    let err = save_channels(&[pattern(4, 4)], &existing, None, &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        AlignerError::SaveConflict {
            kind: ConflictKind::AlreadyExists,
            ..
        }
    ));
    assert_eq!(std::fs::read(&existing).unwrap(), b"original bytes");
}

#[test]
fn test_failed_save_reports_path_and_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing-dir").join("out.tif");
    let err = save_channels(&[pattern(4, 4)], &path, None, &SaveOptions::default()).unwrap_err();
    assert!(matches!(err, AlignerError::SaveIo { .. }));
    assert!(!path.exists());
}

#[test]
fn test_save_needs_channels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.tif");
    assert!(matches!(
        save_channels(&[], &path, None, &SaveOptions::default()),
        Err(AlignerError::NoChannels)
    ));
}

#[test]
fn test_compression_names() {
    assert_eq!("ZIP".parse::<Compression>().unwrap(), Compression::Deflate);
    assert_eq!(Compression::PackBits.to_string(), "packbits");
    assert!("jpeg".parse::<Compression>().is_err());
}
