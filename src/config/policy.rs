//! Fixed segmentation policy
//!
//! The downstream classifier was trained on glyphs cut with exactly these
//! thresholds. They seed the configuration defaults and should only be
//! changed together with the classifier.

/// Detected regions narrower than this are noise
pub const MIN_GLYPH_WIDTH: i32 = 8;
/// Detected regions shorter than this are noise
pub const MIN_GLYPH_HEIGHT: i32 = 8;

/// Share of the dominant size bucket a bucket needs to be considered
pub const HISTOGRAM_CONSIDER_RATIO: f32 = 0.618;

/// Smallest horizontal gap probed while chaining seeds
pub const MIN_CHAR_GAP: i32 = 2;
/// Largest gap (and probe width) as a multiple of the average glyph width
pub const MAX_GAP_WIDTH_RATIO: f32 = 1.5;
/// Vertical slack of the seeding probe, as a divisor of the average height
pub const SEED_VERTICAL_SLACK_DIVISOR: i32 = 5;
/// Chains shorter than this never become lines
pub const MIN_LINE_CHARS: usize = 3;

/// Projection count below which a row or column is treated as noise
pub const NOISE_PIXEL_THRESHOLD: u32 = 2;
/// Morphological opening is undefined below this crop width
pub const MIN_OPENING_WIDTH: i32 = 2;
/// Refined glyphs shorter than this are rejected
pub const MIN_CHAR_HEIGHT: i32 = 4;
/// Radius of the square structuring element (1 => 3x3)
pub const OPENING_RADIUS: u8 = 1;

/// Probe window width as a multiple of the average glyph width
pub const PROBE_WIDTH_RATIO: f32 = 1.5;
/// Minimum room for another glyph, as a divisor of the average width
pub const MIN_ESTIMATE_WIDTH_DIVISOR: i32 = 3;
/// Rows added above and below the average rect when probing
pub const PROBE_VERTICAL_PAD: i32 = 2;
/// Gap kept between a glyph and the next probe
pub const CHAR_MARGIN: i32 = 1;

/// Stable-region detector defaults
pub const DETECTOR_MIN_AREA: u32 = 30;
pub const DETECTOR_MAX_AREA_RATIO: f32 = 0.05;
pub const DETECTOR_THRESHOLD_STEP: u8 = 8;
pub const DETECTOR_STABLE_LEVELS: usize = 2;
