/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Lower bound for any display or preview scale, so renders never collapse to zero size.
pub const MIN_SCALE: f64 = 0.05;

/// Smallest user zoom factor.
pub const ZOOM_MIN: f64 = 0.1;

/// Largest user zoom factor.
pub const ZOOM_MAX: f64 = 32.0;

/// Zoom increment for zoom in/out actions and wheel steps.
pub const ZOOM_STEP: f64 = 0.25;

/// Longest preview edge in pixels.
pub const PREVIEW_MAX_DIM: u32 = 1600;

/// Default preview budget in megapixels.
pub const DEFAULT_PREVIEW_MEGAPIXELS: f64 = 2.0;

/// Preview budget slider bounds in megapixels.
pub const PREVIEW_MEGAPIXELS_MIN: f64 = 0.4;
pub const PREVIEW_MEGAPIXELS_MAX: f64 = 6.0;

/// Budget forced while fast preview is on.
pub const FAST_PREVIEW_MEGAPIXELS: f64 = 0.5;

/// Floor applied to the megapixel budget before converting to pixels.
pub const PREVIEW_BUDGET_FLOOR_MEGAPIXELS: f64 = 0.1;

/// Preview scales at or above this reuse the source channels as-is.
pub const PREVIEW_REUSE_THRESHOLD: f64 = 0.999;

/// Decimal places kept when transform/opacity values go into cache keys.
pub const CACHE_KEY_DECIMALS: i32 = 4;

/// Delay between the last input event and the final-quality render.
pub const RENDER_DEBOUNCE_MS: u64 = 120;

/// Brightness multiplier bounds.
pub const BRIGHTNESS_MIN: f64 = 0.4;
pub const BRIGHTNESS_MAX: f64 = 2.5;

/// Brightness factors closer than this to 1.0 are skipped.
pub const BRIGHTNESS_EPSILON: f64 = 0.01;

/// Overlay opacity slider bounds.
pub const OPACITY_MIN: f64 = 0.05;
pub const OPACITY_MAX: f64 = 1.0;

/// Warm red used to tint the moving channel.
pub const ACCENT_COLOR: [u8; 3] = [240, 90, 90];

/// Marker appended to the image description of exported stacks.
pub const ALIGNMENT_TAG: &str = "Manual Aligned";

/// Separator placed between an existing description and the marker.
pub const ALIGNMENT_TAG_SEPARATOR: &str = " | ";

/// Private TIFF tag holding an embedded ICC profile.
pub const TIFF_TAG_ICC_PROFILE: u16 = 34675;

/// Minimum keyboard pan step in canvas pixels.
pub const PAN_STEP_MIN: i64 = 20;

/// Keyboard pan step as a fraction of the canvas size.
pub const PAN_STEP_FRACTION: f64 = 0.05;

/// Multiplier for fast keyboard panning.
pub const PAN_FAST_MULTIPLIER: i64 = 3;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;
