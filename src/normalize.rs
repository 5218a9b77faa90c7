//! Region normalization: cropping captures to requested bounds and padding
//! mismatched-size pairs onto a common canvas.
//!
//! Padding never scales. Scaling would blend pixels and corrupt the
//! pixel-diff semantics, so the smaller image is extended at the bottom/right
//! edge with a solid fill color, anchored at the top-left origin.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::raster::RasterImage;

/// A rectangular area in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@({},{})", self.width, self.height, self.x, self.y)
    }
}

/// Crop an image to the given bounds, clamped to the source dimensions.
///
/// The clamp guarantees no out-of-range reads. Bounds that clamp to an empty
/// rectangle (origin past the image edge, or zero-size to begin with) are a
/// `ConfigError`.
pub fn crop_to_bounds(image: &RasterImage, bounds: &Bounds) -> Result<RasterImage, ConfigError> {
    let x = bounds.x.min(image.width());
    let y = bounds.y.min(image.height());
    let width = bounds.width.min(image.width().saturating_sub(x));
    let height = bounds.height.min(image.height().saturating_sub(y));

    if width == 0 || height == 0 {
        return Err(ConfigError(format!(
            "bounds {} clamp to an empty region within a {}x{} image",
            bounds,
            image.width(),
            image.height()
        )));
    }

    let mut out = RasterImage::new(width, height);
    for py in 0..height {
        for px in 0..width {
            out.set_pixel(px, py, image.get_pixel(x + px, y + py));
        }
    }
    Ok(out)
}

/// Pad an image onto a canvas of at least the given size, anchored top-left.
///
/// Returns a clone when the image already fills the canvas.
pub fn pad_to_canvas(image: &RasterImage, width: u32, height: u32, fill: [u8; 4]) -> RasterImage {
    let width = width.max(image.width());
    let height = height.max(image.height());
    if width == image.width() && height == image.height() {
        return image.clone();
    }

    let mut out = RasterImage::with_color(width, height, fill);
    for py in 0..image.height() {
        for px in 0..image.width() {
            out.set_pixel(px, py, image.get_pixel(px, py));
        }
    }
    out
}

/// Bring two images onto a common canvas sized to the larger of each
/// dimension. The returned pair always has identical dimensions.
pub fn normalize(
    a: &RasterImage,
    b: &RasterImage,
    fill: [u8; 4],
) -> (RasterImage, RasterImage) {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    (
        pad_to_canvas(a, width, height, fill),
        pad_to_canvas(b, width, height, fill),
    )
}
