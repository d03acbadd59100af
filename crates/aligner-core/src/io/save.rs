use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Seek, Write};
use std::path::{Component, Path, PathBuf};

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::compression::{
    Compression as TiffCompression, Deflate, Lzw, Packbits, Uncompressed,
};
use tiff::encoder::{DirectoryEncoder, Rational, TiffEncoder, TiffKindStandard, TiffValue};
use tiff::tags::{ResolutionUnit as TiffResolutionUnit, Tag};
use tracing::{info, warn};

use crate::channel::{Channel, SampleFormat};
use crate::consts::TIFF_TAG_ICC_PROFILE;
use crate::error::{AlignerError, ConflictKind, Result};

use super::metadata::{Compression, MetadataDirectory, ResolutionUnit, SaveOptions};

/// Absolute, lexically normalized form of `path`.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Refuse destinations that are a source file or already exist.
pub fn check_output_path(output: &Path, sources: &[PathBuf]) -> Result<()> {
    let target = normalize(output);
    if sources.iter().any(|src| normalize(src) == target) {
        return Err(AlignerError::SaveConflict {
            path: output.to_path_buf(),
            kind: ConflictKind::SourcePath,
        });
    }
    if output.exists() {
        return Err(AlignerError::SaveConflict {
            path: output.to_path_buf(),
            kind: ConflictKind::AlreadyExists,
        });
    }
    Ok(())
}

/// Write `channels` as one multi-page TIFF, one page per channel in its own
/// sample format. Every page carries `metadata` and the save options.
///
/// The file is created exclusively: an existing file at `path` is a
/// [`ConflictKind::AlreadyExists`] conflict and is never touched. A failed
/// write removes only the file this call created.
pub fn save_channels(
    channels: &[Channel],
    path: &Path,
    metadata: Option<&MetadataDirectory>,
    options: &SaveOptions,
) -> Result<()> {
    if channels.is_empty() {
        return Err(AlignerError::NoChannels);
    }
    let file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(AlignerError::SaveConflict {
                path: path.to_path_buf(),
                kind: ConflictKind::AlreadyExists,
            });
        }
        Err(e) => {
            return Err(AlignerError::SaveIo {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let mut writer = BufWriter::new(file);
    let result = write_stack(&mut writer, channels, metadata, options)
        .and_then(|()| writer.flush().map_err(AlignerError::from));
    drop(writer);

    match result {
        Ok(()) => {
            info!(
                path = %path.display(),
                pages = channels.len(),
                compression = %options.compression,
                "Saved channel stack"
            );
            Ok(())
        }
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(path) {
                warn!("Could not remove partial file {}: {remove_err}", path.display());
            }
            Err(AlignerError::SaveIo {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }
}

fn write_stack<W: Write + Seek>(
    writer: &mut W,
    channels: &[Channel],
    metadata: Option<&MetadataDirectory>,
    options: &SaveOptions,
) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    for channel in channels {
        let enc = &mut encoder;
        match options.compression {
            Compression::None => write_channel(enc, channel, Uncompressed, metadata, options)?,
            Compression::Lzw => write_channel(enc, channel, Lzw, metadata, options)?,
            Compression::Deflate => {
                write_channel(enc, channel, Deflate::default(), metadata, options)?
            }
            Compression::PackBits => write_channel(enc, channel, Packbits, metadata, options)?,
        }
    }
    Ok(())
}

fn write_channel<W: Write + Seek, D: TiffCompression>(
    encoder: &mut TiffEncoder<W>,
    channel: &Channel,
    compression: D,
    metadata: Option<&MetadataDirectory>,
    options: &SaveOptions,
) -> Result<()> {
    let (w, h) = channel.size();
    let page = Page {
        width: w as u32,
        height: h as u32,
        metadata,
        options,
    };
    match channel.format {
        SampleFormat::U8 => {
            let data: Vec<u8> = channel.data.iter().map(|&v| v.round() as u8).collect();
            write_page::<_, colortype::Gray8, _>(encoder, &page, compression, &data)
        }
        SampleFormat::U16 => {
            let data: Vec<u16> = channel.data.iter().map(|&v| v.round() as u16).collect();
            write_page::<_, colortype::Gray16, _>(encoder, &page, compression, &data)
        }
        SampleFormat::U32 => {
            let data: Vec<u32> = channel.data.iter().map(|&v| v.round() as u32).collect();
            write_page::<_, colortype::Gray32, _>(encoder, &page, compression, &data)
        }
        SampleFormat::F32 => {
            let data: Vec<f32> = channel.data.iter().copied().collect();
            write_page::<_, colortype::Gray32Float, _>(encoder, &page, compression, &data)
        }
    }
}

/// Per-page settings shared by every sample format.
struct Page<'a> {
    width: u32,
    height: u32,
    metadata: Option<&'a MetadataDirectory>,
    options: &'a SaveOptions,
}

fn write_page<W: Write + Seek, C: ColorType, D: TiffCompression>(
    encoder: &mut TiffEncoder<W>,
    page: &Page<'_>,
    compression: D,
    data: &[C::Inner],
) -> Result<()>
where
    [C::Inner]: TiffValue,
{
    let options = page.options;
    let mut image =
        encoder.new_image_with_compression::<C, D>(page.width, page.height, compression)?;
    write_tags(image.encoder(), page.metadata, options)?;
    if let Some(resolution) = options.resolution {
        image.x_resolution(Rational {
            n: resolution.x.0,
            d: resolution.x.1.max(1),
        });
        image.y_resolution(Rational {
            n: resolution.y.0,
            d: resolution.y.1.max(1),
        });
        image.resolution_unit(match resolution.unit {
            ResolutionUnit::None => TiffResolutionUnit::None,
            ResolutionUnit::Inch => TiffResolutionUnit::Inch,
            ResolutionUnit::Centimeter => TiffResolutionUnit::Centimeter,
        });
    }
    image.write_data(data)?;
    Ok(())
}

fn write_tags<W: Write + Seek>(
    directory: &mut DirectoryEncoder<'_, W, TiffKindStandard>,
    metadata: Option<&MetadataDirectory>,
    options: &SaveOptions,
) -> Result<()> {
    if let Some(metadata) = metadata {
        for (tag, value) in metadata.iter() {
            let ascii = ascii_tag_value(value);
            if ascii != value {
                warn!(tag, "Tag value is not plain ASCII, writing a transliterated copy");
            }
            directory.write_tag(Tag::from_u16_exhaustive(tag), ascii.as_str())?;
        }
    }
    if let Some(icc) = &options.icc_profile {
        directory.write_tag(Tag::Unknown(TIFF_TAG_ICC_PROFILE), icc.as_slice())?;
    }
    Ok(())
}

/// TIFF ASCII fields hold 7-bit text without NULs. Common symbols are
/// spelled out, anything else becomes `?`.
fn ascii_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\0' => {}
            c if c.is_ascii() => out.push(c),
            '\u{b5}' | '\u{3bc}' => out.push('u'),
            '\u{b0}' => out.push_str("deg"),
            '\u{a9}' => out.push_str("(c)"),
            '\u{ae}' => out.push_str("(R)"),
            '\u{b1}' => out.push_str("+/-"),
            '\u{d7}' => out.push('x'),
            '\u{b2}' => out.push('2'),
            '\u{b3}' => out.push('3'),
            '\u{c5}' | '\u{212b}' => out.push('A'),
            '\u{e5}' => out.push('a'),
            _ => out.push('?'),
        }
    }
    out
}
