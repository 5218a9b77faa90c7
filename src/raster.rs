//! Raster image type backing every stage of the comparison pipeline.
//!
//! A [`RasterImage`] is an immutable-by-convention RGBA buffer: captures are
//! created once, and every transform (crop, pad, diff) produces a new image.
//! The drawing helpers exist for building test fixtures programmatically.

use image::{ImageBuffer, RgbaImage};
use std::io::Cursor;

/// Raw RGBA raster with pixel access and PNG round-tripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// Width in pixels
    width: u32,
    /// Height in pixels
    height: u32,
    /// RGBA pixel buffer (row-major, 4 bytes per pixel)
    buffer: Vec<u8>,
}

/// Error decoding or encoding raster data
#[derive(Debug, Clone)]
pub struct RasterError(pub String);

impl std::fmt::Display for RasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Raster error: {}", self.0)
    }
}

impl std::error::Error for RasterError {}

impl RasterImage {
    /// Create a new image with the given dimensions, initialized to transparent black
    pub fn new(width: u32, height: u32) -> Self {
        let buffer = vec![0u8; (width as usize) * (height as usize) * 4];
        Self {
            width,
            height,
            buffer,
        }
    }

    /// Create an image filled with a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut img = Self::new(width, height);
        img.fill(color);
        img
    }

    /// Decode an image from PNG (or any format the `image` crate recognizes)
    pub fn from_png_bytes(data: &[u8]) -> Result<Self, RasterError> {
        let img = image::load_from_memory(data)
            .map_err(|e| RasterError(format!("failed to decode image: {}", e)))?;
        let rgba = img.to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            buffer: rgba.into_raw(),
        })
    }

    /// Build an image from a raw RGBA buffer
    pub fn from_raw_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RasterError> {
        let expected = (width as usize) * (height as usize) * 4;
        if data.len() != expected {
            return Err(RasterError(format!(
                "buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            buffer: data,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total pixel count
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Fill the entire image with a color
    pub fn fill(&mut self, color: [u8; 4]) {
        for chunk in self.buffer.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle, clipped to the image
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
        for py in y..(y.saturating_add(h)).min(self.height) {
            for px in x..(x.saturating_add(w)).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Get the color of a pixel; out-of-range reads return transparent black
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0, 0];
        }
        let idx = ((y as usize * self.width as usize) + x as usize) * 4;
        [
            self.buffer[idx],
            self.buffer[idx + 1],
            self.buffer[idx + 2],
            self.buffer[idx + 3],
        ]
    }

    /// Set the color of a pixel; out-of-range writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y as usize * self.width as usize) + x as usize) * 4;
        self.buffer[idx..idx + 4].copy_from_slice(&color);
    }

    /// Get the raw RGBA buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Convert to an `image` crate buffer
    pub fn to_image(&self) -> RgbaImage {
        ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .expect("buffer length matches dimensions")
    }

    /// Encode the image as PNG bytes
    pub fn to_png(&self) -> Result<Vec<u8>, RasterError> {
        let img = self.to_image();
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| RasterError(format!("failed to encode PNG: {}", e)))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_new() {
        let img = RasterImage::new(100, 50);
        assert_eq!(img.width(), 100);
        assert_eq!(img.height(), 50);
        assert_eq!(img.pixel_count(), 5000);
        assert_eq!(img.get_pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(99, 49), [0, 0, 0, 0]);
    }

    #[test]
    fn test_raster_fill() {
        let mut img = RasterImage::new(10, 10);
        img.fill([255, 128, 64, 255]);
        assert_eq!(img.get_pixel(0, 0), [255, 128, 64, 255]);
        assert_eq!(img.get_pixel(9, 9), [255, 128, 64, 255]);
    }

    #[test]
    fn test_raster_draw_rect_clipped() {
        let mut img = RasterImage::with_color(20, 20, [0, 0, 0, 255]);
        img.draw_rect(15, 15, 10, 10, [255, 0, 0, 255]);

        assert_eq!(img.get_pixel(14, 14), [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(15, 15), [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(19, 19), [255, 0, 0, 255]);
        // Out-of-range read past the clipped edge
        assert_eq!(img.get_pixel(20, 20), [0, 0, 0, 0]);
    }

    #[test]
    fn test_raster_out_of_range_set_ignored() {
        let mut img = RasterImage::new(5, 5);
        img.set_pixel(10, 10, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(4, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn test_raster_png_roundtrip() {
        let mut img = RasterImage::with_color(32, 32, [100, 150, 200, 255]);
        img.draw_rect(8, 8, 16, 16, [255, 0, 0, 255]);

        let png = img.to_png().unwrap();
        // PNG magic bytes
        assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);

        let decoded = RasterImage::from_png_bytes(&png).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_raster_from_raw_size_mismatch() {
        let result = RasterImage::from_raw_rgba(10, 10, vec![0u8; 100]);
        assert!(result.is_err());
    }
}
