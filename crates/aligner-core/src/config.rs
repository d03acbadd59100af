use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compute::DevicePreference;
use crate::consts::{
    ACCENT_COLOR, ALIGNMENT_TAG, DEFAULT_PREVIEW_MEGAPIXELS, FAST_PREVIEW_MEGAPIXELS,
    PREVIEW_MAX_DIM, RENDER_DEBOUNCE_MS,
};
use crate::error::{AlignerError, Result};
use crate::levels::DisplayRange;
use crate::overlay::AlphaMode;
use crate::transform::Resample;

/// Application settings, read from TOML. Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignerConfig {
    #[serde(default)]
    pub device: DevicePreference,
    /// Filter for settled renders and export.
    #[serde(default)]
    pub resample: Resample,
    #[serde(default = "default_debounce_ms")]
    pub render_debounce_ms: u64,
    /// Marker added to the image description of exports.
    #[serde(default = "default_alignment_tag")]
    pub alignment_tag: String,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

fn default_debounce_ms() -> u64 {
    RENDER_DEBOUNCE_MS
}

fn default_alignment_tag() -> String {
    ALIGNMENT_TAG.to_string()
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            device: DevicePreference::default(),
            resample: Resample::default(),
            render_debounce_ms: RENDER_DEBOUNCE_MS,
            alignment_tag: default_alignment_tag(),
            keyboard: KeyboardConfig::default(),
            display: DisplayConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

impl AlignerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AlignerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AlignerError::Config(e.to_string()))
    }
}

/// Modifier held while pressing a nudge key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Modifier {
    #[default]
    None,
    /// Shift: coarse steps.
    Coarse,
    /// Alt: fine steps.
    Fine,
}

/// Nudge step sizes. Zero values fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Translation per key press in source pixels.
    pub step: f64,
    pub coarse_multiplier: f64,
    pub fine_multiplier: f64,
    /// Rotation per key press in degrees.
    pub rotation_step: f64,
    pub rotation_coarse_factor: f64,
    pub rotation_fine_factor: f64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            step: 1.0,
            coarse_multiplier: 10.0,
            fine_multiplier: 0.5,
            rotation_step: 0.1,
            rotation_coarse_factor: 10.0,
            rotation_fine_factor: 0.2,
        }
    }
}

fn nonzero_or(value: f64, fallback: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        fallback
    } else {
        value
    }
}

impl KeyboardConfig {
    /// Translation for one key press under `modifier`.
    pub fn move_step(&self, modifier: Modifier) -> f64 {
        let defaults = Self::default();
        let step = nonzero_or(self.step, defaults.step);
        match modifier {
            Modifier::None => step,
            Modifier::Coarse => {
                step * nonzero_or(self.coarse_multiplier, defaults.coarse_multiplier)
            }
            Modifier::Fine => step * nonzero_or(self.fine_multiplier, defaults.fine_multiplier),
        }
    }

    /// Rotation in degrees for one key press under `modifier`.
    pub fn rotation_step_for(&self, modifier: Modifier) -> f64 {
        let defaults = Self::default();
        let step = nonzero_or(self.rotation_step, defaults.rotation_step);
        match modifier {
            Modifier::None => step,
            Modifier::Coarse => {
                step * nonzero_or(self.rotation_coarse_factor, defaults.rotation_coarse_factor)
            }
            Modifier::Fine => {
                step * nonzero_or(self.rotation_fine_factor, defaults.rotation_fine_factor)
            }
        }
    }
}

/// Initial display settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub opacity: f64,
    pub accent_color: [u8; 3],
    pub brightness: f64,
    pub auto_levels: bool,
    /// Manual window. Without a valid one the window follows the loaded
    /// stack's bit depth.
    pub manual_range: Option<DisplayRange>,
    pub alpha_mode: AlphaMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            opacity: 0.5,
            accent_color: ACCENT_COLOR,
            brightness: 1.0,
            auto_levels: true,
            manual_range: None,
            alpha_mode: AlphaMode::Constant,
        }
    }
}

impl DisplayConfig {
    /// The configured manual window, if it has `min < max`.
    pub fn valid_manual_range(&self) -> Option<DisplayRange> {
        self.manual_range.and_then(|r| DisplayRange::new(r.min, r.max))
    }
}

/// Preview downsampling settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Preview budget in megapixels.
    pub megapixels: f64,
    /// Budget forced while fast preview is on.
    pub fast_megapixels: f64,
    /// Longest preview edge in pixels.
    pub max_dimension: u32,
    pub fast: bool,
    pub full_resolution: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            megapixels: DEFAULT_PREVIEW_MEGAPIXELS,
            fast_megapixels: FAST_PREVIEW_MEGAPIXELS,
            max_dimension: PREVIEW_MAX_DIM,
            fast: false,
            full_resolution: false,
        }
    }
}
