use std::path::{Path, PathBuf};

use ndarray::Array2;

use aligner_core::channel::{Channel, SampleFormat};
use aligner_core::io::{save_channels, MetadataDirectory, SaveOptions};

/// 8-bit channel built from row-major rows.
pub fn channel_u8(rows: &[&[u8]]) -> Channel {
    let h = rows.len();
    let w = rows[0].len();
    let data = Array2::from_shape_fn((h, w), |(r, c)| rows[r][c] as f32);
    Channel::new(data, SampleFormat::U8)
}

/// Channel whose value at `(r, c)` is `r * w + c`.
pub fn ramp(w: usize, h: usize, format: SampleFormat) -> Channel {
    Channel::new(
        Array2::from_shape_fn((h, w), |(r, c)| (r * w + c) as f32),
        format,
    )
}

/// Smooth, non-symmetric test pattern in 0..=255.
pub fn pattern(w: usize, h: usize) -> Channel {
    Channel::new(
        Array2::from_shape_fn((h, w), |(r, c)| {
            let v = 128.0 + 60.0 * ((c as f32) * 0.3).sin() + 50.0 * ((r as f32) * 0.17).cos();
            v.round().clamp(0.0, 255.0)
        }),
        SampleFormat::U8,
    )
}

/// Single bright pixel on black.
pub fn dot(w: usize, h: usize, x: usize, y: usize, value: f32, format: SampleFormat) -> Channel {
    let mut channel = Channel::zeros(w, h, format);
    channel.data[[y, x]] = value;
    channel
}

/// Write each channel to its own single-page TIFF under `dir`.
pub fn write_single_page_files(dir: &Path, channels: &[Channel]) -> Vec<PathBuf> {
    channels
        .iter()
        .enumerate()
        .map(|(idx, channel)| {
            let path = dir.join(format!("c{}.tif", idx + 1));
            save_channels(
                std::slice::from_ref(channel),
                &path,
                None,
                &SaveOptions::default(),
            )
            .expect("write test channel");
            path
        })
        .collect()
}

/// Write `channels` as one multi-page TIFF.
pub fn write_stack(
    path: &Path,
    channels: &[Channel],
    metadata: Option<&MetadataDirectory>,
) -> PathBuf {
    save_channels(channels, path, metadata, &SaveOptions::default()).expect("write test stack");
    path.to_path_buf()
}
