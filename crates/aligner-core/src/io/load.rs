use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageDecoder, ImageReader};
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tracing::{debug, info};

use crate::channel::{ensure_same_size, Channel, ChannelStack, SampleFormat};
use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::{AlignerError, Result};

use super::metadata::{read_metadata, read_save_options, MetadataDirectory, SaveOptions};

/// One decoded page, split into bands.
struct Page {
    bands: Vec<Channel>,
}

/// Everything read from a single file.
struct DecodedFile {
    pages: Vec<Page>,
    metadata: Option<MetadataDirectory>,
    options: SaveOptions,
}

/// Load an alignable stack.
///
/// Several paths give one channel per file (multi-band files collapse to
/// one band). A single multi-page file gives one channel per page, a single
/// multi-band file one channel per band. Fewer than two channels or
/// differing dimensions fail.
pub fn load_channels_from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<ChannelStack> {
    if paths.is_empty() {
        return Err(AlignerError::NoInputs);
    }
    let source_paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();

    let (channels, metadata, save_options) = if source_paths.len() > 1 {
        let mut channels = Vec::with_capacity(source_paths.len());
        let mut metadata = None;
        let mut save_options = SaveOptions::default();
        for (idx, path) in source_paths.iter().enumerate() {
            let decoded = decode_file(path)?;
            if idx == 0 {
                metadata = decoded.metadata;
                save_options = decoded.options;
            }
            let page = decoded.pages.into_iter().next().ok_or_else(|| AlignerError::Load {
                path: path.clone(),
                reason: "file contains no images".into(),
            })?;
            channels.push(collapse_bands(page.bands));
        }
        (channels, metadata, save_options)
    } else {
        let path = &source_paths[0];
        let decoded = decode_file(path)?;
        let channels = if decoded.pages.len() > 1 {
            let mut channels = Vec::with_capacity(decoded.pages.len());
            for (idx, page) in decoded.pages.into_iter().enumerate() {
                if page.bands.len() != 1 {
                    return Err(AlignerError::Load {
                        path: path.clone(),
                        reason: format!(
                            "page {} has {} bands; multi-page stacks must be single-band",
                            idx + 1,
                            page.bands.len()
                        ),
                    });
                }
                channels.extend(page.bands);
            }
            channels
        } else {
            decoded
                .pages
                .into_iter()
                .next()
                .map(|page| page.bands)
                .unwrap_or_default()
        };
        (channels, decoded.metadata, decoded.options)
    };

    ensure_same_size(&channels)?;
    let stack = ChannelStack {
        channels,
        source_paths,
        metadata,
        save_options,
    };
    stack.ensure_alignable()?;
    if let Some((w, h)) = stack.dimensions() {
        info!(
            channels = stack.len(),
            width = w,
            height = h,
            format = %stack.channels[0].format,
            "Loaded channel stack"
        );
    }
    Ok(stack)
}

/// Whether the file starts with a TIFF byte-order mark.
fn is_tiff(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    if file.read(&mut magic)? < 4 {
        return Ok(false);
    }
    Ok(matches!(&magic, b"II*\0" | b"MM\0*"))
}

fn decode_file(path: &Path) -> Result<DecodedFile> {
    let load_error = |reason: String| AlignerError::Load {
        path: path.to_path_buf(),
        reason,
    };
    let tiff = is_tiff(path).map_err(|e| load_error(e.to_string()))?;
    let decoded = if tiff {
        decode_tiff(path)
    } else {
        decode_generic(path)
    };
    let decoded = decoded.map_err(|e| match e {
        AlignerError::Load { .. } => e,
        other => load_error(other.to_string()),
    })?;
    debug!(
        path = %path.display(),
        pages = decoded.pages.len(),
        bands = decoded.pages.first().map_or(0, |p| p.bands.len()),
        "Decoded image file"
    );
    Ok(decoded)
}

fn decode_tiff(path: &Path) -> Result<DecodedFile> {
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());
    let metadata = read_metadata(&mut decoder);
    let options = read_save_options(&mut decoder);

    let mut pages = Vec::new();
    loop {
        pages.push(read_tiff_page(&mut decoder)?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(DecodedFile {
        pages,
        metadata,
        options,
    })
}

fn read_tiff_page<R: Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Page> {
    let (bits, band_count) = match decoder.colortype()? {
        tiff::ColorType::Gray(b) => (b, 1),
        tiff::ColorType::GrayA(b) => (b, 2),
        tiff::ColorType::RGB(b) => (b, 3),
        tiff::ColorType::RGBA(b) => (b, 4),
        other => {
            return Err(AlignerError::UnsupportedFormat(format!(
                "TIFF color type {other:?}"
            )))
        }
    };
    if !matches!(bits, 8 | 16 | 32) {
        return Err(AlignerError::UnsupportedFormat(format!(
            "{bits}-bit TIFF samples"
        )));
    }
    let (w, h) = decoder.dimensions()?;
    let (width, height) = (w as usize, h as usize);

    let bands = match decoder.read_image()? {
        DecodingResult::U8(buf) => {
            split_bands(&buf, (width, height), band_count, SampleFormat::U8)
        }
        DecodingResult::U16(buf) => {
            split_bands(&buf, (width, height), band_count, SampleFormat::U16)
        }
        DecodingResult::U32(buf) => {
            let wide: Vec<f32> = buf.iter().map(|&v| v as f32).collect();
            split_bands(&wide, (width, height), band_count, SampleFormat::U32)
        }
        DecodingResult::F32(buf) => {
            split_bands(&buf, (width, height), band_count, SampleFormat::F32)
        }
        _ => {
            return Err(AlignerError::UnsupportedFormat(
                "TIFF samples must be 8/16/32-bit unsigned or 32-bit float".into(),
            ))
        }
    }?;
    Ok(Page { bands })
}

fn decode_generic(path: &Path) -> Result<DecodedFile> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let icc_profile = decoder.icc_profile().ok().flatten();
    let image = DynamicImage::from_decoder(decoder)?;
    let (width, height) = (image.width() as usize, image.height() as usize);

    let size = (width, height);
    let bands = match &image {
        DynamicImage::ImageLuma8(buf) => split_bands(buf.as_raw(), size, 1, SampleFormat::U8),
        DynamicImage::ImageLumaA8(buf) => split_bands(buf.as_raw(), size, 2, SampleFormat::U8),
        DynamicImage::ImageRgb8(buf) => split_bands(buf.as_raw(), size, 3, SampleFormat::U8),
        DynamicImage::ImageRgba8(buf) => split_bands(buf.as_raw(), size, 4, SampleFormat::U8),
        DynamicImage::ImageLuma16(buf) => split_bands(buf.as_raw(), size, 1, SampleFormat::U16),
        DynamicImage::ImageLumaA16(buf) => split_bands(buf.as_raw(), size, 2, SampleFormat::U16),
        DynamicImage::ImageRgb16(buf) => split_bands(buf.as_raw(), size, 3, SampleFormat::U16),
        DynamicImage::ImageRgba16(buf) => split_bands(buf.as_raw(), size, 4, SampleFormat::U16),
        DynamicImage::ImageRgb32F(buf) => split_bands(buf.as_raw(), size, 3, SampleFormat::F32),
        DynamicImage::ImageRgba32F(buf) => split_bands(buf.as_raw(), size, 4, SampleFormat::F32),
        other => {
            let rgba = other.to_rgba8();
            split_bands(rgba.as_raw(), size, 4, SampleFormat::U8)
        }
    }?;

    Ok(DecodedFile {
        pages: vec![Page { bands }],
        metadata: None,
        options: SaveOptions {
            icc_profile,
            ..SaveOptions::default()
        },
    })
}

/// Deinterleave `raw` (pixel-major, `bands` samples per pixel) into channels.
fn split_bands<S: Copy + Into<f32>>(
    raw: &[S],
    (width, height): (usize, usize),
    bands: usize,
    format: SampleFormat,
) -> Result<Vec<Channel>> {
    if width == 0 || height == 0 {
        return Err(AlignerError::InvalidDimensions { width, height });
    }
    if raw.len() < width * height * bands {
        return Err(AlignerError::UnsupportedFormat(format!(
            "expected {} samples for {width}x{height}x{bands}, got {}",
            width * height * bands,
            raw.len()
        )));
    }
    Ok((0..bands)
        .map(|band| {
            let data = Array2::from_shape_fn((height, width), |(r, c)| {
                raw[(r * width + c) * bands + band].into()
            });
            Channel::new(data, format)
        })
        .collect())
}

/// Reduce a multi-band page to one channel: the gray band of gray-alpha,
/// BT.601 luminance of color.
fn collapse_bands(mut bands: Vec<Channel>) -> Channel {
    match bands.len() {
        0 | 1 | 2 => {
            bands.truncate(1);
            bands.pop().unwrap_or_else(|| Channel::zeros(1, 1, SampleFormat::U8))
        }
        _ => {
            let format = bands[0].format;
            let mut data = bands[0].data.mapv(|v| v * LUMINANCE_R);
            data.scaled_add(LUMINANCE_G, &bands[1].data);
            data.scaled_add(LUMINANCE_B, &bands[2].data);
            data.mapv_inplace(|v| format.quantize(v));
            Channel::new(data, format)
        }
    }
}
