use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tiff::decoder::ifd::Value;
use tiff::decoder::Decoder;
use tiff::tags::Tag;
use tracing::warn;

use crate::consts::{ALIGNMENT_TAG_SEPARATOR, TIFF_TAG_ICC_PROFILE};
use crate::error::AlignerError;

/// TIFF `ImageDescription`.
pub const TAG_IMAGE_DESCRIPTION: u16 = 270;

/// Descriptive ASCII tags carried from the source into exports.
pub const DESCRIPTIVE_TAGS: [(u16, &str); 10] = [
    (269, "DocumentName"),
    (TAG_IMAGE_DESCRIPTION, "ImageDescription"),
    (271, "Make"),
    (272, "Model"),
    (285, "PageName"),
    (305, "Software"),
    (306, "DateTime"),
    (315, "Artist"),
    (316, "HostComputer"),
    (33432, "Copyright"),
];

/// Human-readable name of a descriptive tag.
pub fn tag_name(tag: u16) -> Option<&'static str> {
    DESCRIPTIVE_TAGS
        .iter()
        .find(|(code, _)| *code == tag)
        .map(|(_, name)| *name)
}

/// Descriptive tags of a loaded image, keyed by tag number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataDirectory {
    entries: BTreeMap<u16, String>,
}

impl MetadataDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: u16) -> Option<&str> {
        self.entries.get(&tag).map(String::as_str)
    }

    pub fn set(&mut self, tag: u16, value: impl Into<String>) {
        self.entries.insert(tag, value.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.get(TAG_IMAGE_DESCRIPTION)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.entries.iter().map(|(tag, value)| (*tag, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Copy of `directory` whose description carries `marker`.
///
/// An empty description becomes the marker; one already containing it
/// (case-insensitive) is left alone; anything else gets ` | <marker>` appended.
pub fn add_alignment_tag(directory: Option<&MetadataDirectory>, marker: &str) -> MetadataDirectory {
    let mut out = directory.cloned().unwrap_or_default();
    match out.description() {
        Some(existing) if !existing.is_empty() => {
            if !existing.to_lowercase().contains(&marker.to_lowercase()) {
                let appended = format!("{existing}{ALIGNMENT_TAG_SEPARATOR}{marker}");
                out.set(TAG_IMAGE_DESCRIPTION, appended);
            }
        }
        _ => out.set(TAG_IMAGE_DESCRIPTION, marker),
    }
    out
}

/// TIFF compression scheme for exports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Lzw,
    Deflate,
    PackBits,
}

impl Compression {
    /// Map a TIFF `Compression` tag value; unknown schemes export uncompressed.
    pub fn from_tag(value: u16) -> Self {
        match value {
            5 => Self::Lzw,
            8 | 32946 => Self::Deflate,
            32773 => Self::PackBits,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Lzw => write!(f, "lzw"),
            Self::Deflate => write!(f, "deflate"),
            Self::PackBits => write!(f, "packbits"),
        }
    }
}

impl FromStr for Compression {
    type Err = AlignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Self::None),
            "lzw" => Ok(Self::Lzw),
            "deflate" | "zip" => Ok(Self::Deflate),
            "packbits" => Ok(Self::PackBits),
            other => Err(AlignerError::Config(format!(
                "unknown compression '{other}' (expected none, lzw, deflate or packbits)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionUnit {
    None,
    #[default]
    Inch,
    Centimeter,
}

impl ResolutionUnit {
    pub fn from_tag(value: u16) -> Self {
        match value {
            1 => Self::None,
            3 => Self::Centimeter,
            _ => Self::Inch,
        }
    }
}

/// Pixel density as TIFF rationals `(numerator, denominator)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub x: (u32, u32),
    pub y: (u32, u32),
    pub unit: ResolutionUnit,
}

impl Resolution {
    /// Whole-number DPI-style resolution.
    pub fn uniform(value: u32, unit: ResolutionUnit) -> Self {
        Self {
            x: (value, 1),
            y: (value, 1),
            unit,
        }
    }

    /// `(x, y)` as floating point, `None` for a zero denominator.
    pub fn as_f64(&self) -> Option<(f64, f64)> {
        let ratio = |(n, d): (u32, u32)| (d != 0).then(|| n as f64 / d as f64);
        Some((ratio(self.x)?, ratio(self.y)?))
    }
}

/// Auxiliary save parameters taken from the first source image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub resolution: Option<Resolution>,
    pub compression: Compression,
    pub icc_profile: Option<Vec<u8>>,
}

/// Descriptive tags of the decoder's current page. `None` when it has none.
pub fn read_metadata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<MetadataDirectory> {
    let mut directory = MetadataDirectory::new();
    for (code, name) in DESCRIPTIVE_TAGS {
        match decoder
            .find_tag(Tag::from_u16_exhaustive(code))
            .and_then(|value| value.map(Value::into_string).transpose())
        {
            Ok(Some(value)) => directory.set(code, value.trim_end_matches('\0')),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable TIFF tag {name}: {e}"),
        }
    }
    (!directory.is_empty()).then_some(directory)
}

fn rational(value: Option<Value>) -> Option<(u32, u32)> {
    match value? {
        Value::Rational(n, d) => Some((n, d)),
        other => other.into_u32().ok().map(|v| (v, 1)),
    }
}

/// Resolution, compression and ICC profile of the decoder's current page.
pub fn read_save_options<R: Read + Seek>(decoder: &mut Decoder<R>) -> SaveOptions {
    let x = rational(decoder.find_tag(Tag::XResolution).ok().flatten());
    let y = rational(decoder.find_tag(Tag::YResolution).ok().flatten());
    let unit = decoder
        .find_tag_unsigned::<u16>(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .map(ResolutionUnit::from_tag)
        .unwrap_or_default();
    let resolution = match (x, y) {
        (Some(x), Some(y)) => Some(Resolution { x, y, unit }),
        (Some(x), None) => Some(Resolution { x, y: x, unit }),
        _ => None,
    };

    let compression = decoder
        .find_tag_unsigned::<u16>(Tag::Compression)
        .ok()
        .flatten()
        .map(Compression::from_tag)
        .unwrap_or_default();

    let icc_profile = match decoder.find_tag(Tag::Unknown(TIFF_TAG_ICC_PROFILE)) {
        Ok(Some(value)) => match value.into_u8_vec() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Skipping unreadable ICC profile: {e}");
                None
            }
        },
        _ => None,
    };

    SaveOptions {
        resolution,
        compression,
        icc_profile,
    }
}
