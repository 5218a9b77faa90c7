//! Per-pixel difference computation between two equally-sized images.
//!
//! A pixel counts as differing only when the color distance between the two
//! images exceeds a perceptual threshold, which absorbs anti-aliasing and
//! sub-pixel font-rendering noise instead of flagging it as a regression.
//! The computation is deterministic (no sampling) and symmetric in its
//! two inputs.

use serde::Serialize;

use crate::config::{DEFAULT_HIGHLIGHT_COLOR, DEFAULT_PERCEPTUAL_THRESHOLD};
use crate::raster::RasterImage;

/// Maximum Euclidean distance between two RGBA pixels with channels in [0, 1]
const MAX_CHANNEL_DISTANCE: f64 = 2.0; // sqrt(4.0)

/// Result of diffing two normalized images
#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    /// Number of pixels whose distance exceeded the perceptual threshold
    pub diff_pixel_count: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// `diff_pixel_count / total_pixels`, always in `[0, 1]`
    pub diff_ratio: f64,

    /// Visual diff raster: matching pixels as faded grayscale of the first
    /// image, differing pixels in the highlight color
    #[serde(skip)]
    pub diff_image: RasterImage,
}

/// Error during diff computation
#[derive(Debug, Clone)]
pub enum DiffError {
    /// The two images do not share dimensions (normalize first)
    DimensionMismatch {
        a: (u32, u32),
        b: (u32, u32),
    },

    /// Image data was corrupt or unreadable by the time it reached the diff stage
    CorruptImage(String),
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffError::DimensionMismatch { a, b } => write!(
                f,
                "Dimension mismatch: {}x{} vs {}x{} (images must be normalized before diffing)",
                a.0, a.1, b.0, b.1
            ),
            DiffError::CorruptImage(msg) => write!(f, "Corrupt image: {}", msg),
        }
    }
}

impl std::error::Error for DiffError {}

/// Options controlling diff rendering and sensitivity
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Per-pixel color-distance tolerance in `[0, 1]`
    pub perceptual_threshold: f64,
    /// RGBA color used for differing pixels in the diff raster
    pub highlight_color: [u8; 4],
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            perceptual_threshold: DEFAULT_PERCEPTUAL_THRESHOLD,
            highlight_color: DEFAULT_HIGHLIGHT_COLOR,
        }
    }
}

impl DiffOptions {
    pub fn new(perceptual_threshold: f64) -> Self {
        Self {
            perceptual_threshold,
            ..Default::default()
        }
    }

    pub fn highlight_color(mut self, color: [u8; 4]) -> Self {
        self.highlight_color = color;
        self
    }
}

/// Normalized Euclidean distance between two RGBA pixels, in `[0, 1]`.
///
/// Symmetric and deterministic: depends only on the two pixel values.
pub fn pixel_distance(a: [u8; 4], b: [u8; 4]) -> f64 {
    let mut sum = 0.0f64;
    for c in 0..4 {
        let delta = (f64::from(a[c]) - f64::from(b[c])) / 255.0;
        sum += delta * delta;
    }
    sum.sqrt() / MAX_CHANNEL_DISTANCE
}

/// Diff two images with the default highlight color
pub fn diff(
    a: &RasterImage,
    b: &RasterImage,
    perceptual_threshold: f64,
) -> Result<DiffResult, DiffError> {
    diff_with_options(a, b, &DiffOptions::new(perceptual_threshold))
}

/// Diff two equally-sized images.
///
/// Precondition: `a` and `b` share dimensions; call
/// [`crate::normalize::normalize`] first otherwise.
pub fn diff_with_options(
    a: &RasterImage,
    b: &RasterImage,
    options: &DiffOptions,
) -> Result<DiffResult, DiffError> {
    if a.width() != b.width() || a.height() != b.height() {
        return Err(DiffError::DimensionMismatch {
            a: (a.width(), a.height()),
            b: (b.width(), b.height()),
        });
    }

    let total_pixels = a.pixel_count();
    let mut diff_pixel_count = 0u64;
    let mut diff_image = RasterImage::new(a.width(), a.height());

    for y in 0..a.height() {
        for x in 0..a.width() {
            let pa = a.get_pixel(x, y);
            let pb = b.get_pixel(x, y);
            if pixel_distance(pa, pb) > options.perceptual_threshold {
                diff_pixel_count += 1;
                diff_image.set_pixel(x, y, options.highlight_color);
            } else {
                diff_image.set_pixel(x, y, faded_grayscale(pa));
            }
        }
    }

    let diff_ratio = if total_pixels == 0 {
        0.0
    } else {
        diff_pixel_count as f64 / total_pixels as f64
    };

    Ok(DiffResult {
        diff_pixel_count,
        total_pixels,
        diff_ratio,
        diff_image,
    })
}

/// Faded grayscale rendering of a matching pixel, so diff highlights stand
/// out against recognizable page structure.
fn faded_grayscale(pixel: [u8; 4]) -> [u8; 4] {
    // Rec. 601 luma weights
    let luma = 0.299 * f64::from(pixel[0])
        + 0.587 * f64::from(pixel[1])
        + 0.114 * f64::from(pixel[2]);
    let faded = (luma * 0.3 + 255.0 * 0.7) as u8;
    [faded, faded, faded, 255]
}
