//! Decoded frame buffers.
//!
//! - `Frame`: dense pixel buffer produced by a frame source. Value type; once a
//!   source hands it out, the source no longer references it.
//! - `PixelLayout`: channel layout of the buffer. Every source normalizes to
//!   packed RGB before handing frames to the pump.
//!
//! Frames are consumed by annotation and publish, then dropped. Raw pixel
//! content is never written to logs; `Debug` only shows geometry.

use anyhow::{anyhow, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Channel layout of a frame buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 8-bit R, G, B.
    Rgb24,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb24 => 3,
        }
    }
}

/// One decoded image from a video source.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    layout: PixelLayout,
    /// Per-source capture counter, starting at 1.
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a packed RGB buffer. Fails when the length does not match the geometry.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            layout: PixelLayout::Rgb24,
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    /// A frame filled with a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * 3);
        for _ in 0..pixel_count {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
            layout: PixelLayout::Rgb24,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn from_rgb_image(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            layout: PixelLayout::Rgb24,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Convert into an `image` buffer, keeping sequence metadata out of band.
    pub fn into_rgb_image(self) -> Result<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Copy capture metadata from the frame this one was derived from.
    pub(crate) fn inherit_from(mut self, other: &Frame) -> Self {
        self.sequence = other.sequence;
        self.captured_at = other.captured_at;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB value at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.layout.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        let px = self.data.get(offset..offset + channels)?;
        Some([px[0], px[1], px[2]])
    }

    /// Set the pixel at (x, y); writes outside the frame are ignored.
    pub(crate) fn put_pixel(&mut self, x: i64, y: i64, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let channels = self.layout.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        self.data[offset..offset + channels].copy_from_slice(&rgb);
    }

    /// Fill the inclusive rectangle, clipped to the frame.
    pub(crate) fn fill_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, rgb: [u8; 3]) {
        let x1 = x1.max(0);
        let y1 = y1.max(0);
        let x2 = x2.min(self.width as i64 - 1);
        let y2 = y2.min(self.height as i64 - 1);
        if x1 > x2 || y1 > y2 {
            return;
        }
        let channels = self.layout.channels();
        let stride = self.width as usize * channels;
        for y in y1..=y2 {
            let row = y as usize * stride;
            for x in x1..=x2 {
                let offset = row + x as usize * channels;
                self.data[offset..offset + channels].copy_from_slice(&rgb);
            }
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn every_constructor_yields_packed_rgb() -> Result<()> {
        let from_raw = Frame::from_rgb(vec![0u8; 12], 2, 2)?;
        let from_image = Frame::from_rgb_image(image::RgbImage::new(2, 2));
        for frame in [from_raw, from_image, Frame::filled(2, 2, [1, 2, 3])] {
            assert_eq!(frame.layout(), PixelLayout::Rgb24);
            assert_eq!(frame.pixels().len(), 4 * frame.layout().channels());
        }
        Ok(())
    }

    #[test]
    fn pixel_access_is_bounds_checked() -> Result<()> {
        let frame = Frame::from_rgb((0u8..12).collect(), 2, 2)?;
        assert_eq!(frame.pixel(1, 1), Some([9, 10, 11]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
        Ok(())
    }

    #[test]
    fn fill_rect_clips_to_frame() {
        let mut frame = Frame::filled(4, 4, [0, 0, 0]);
        frame.fill_rect(-5, -5, 1, 1, [255, 0, 0]);
        assert_eq!(frame.pixel(0, 0), Some([255, 0, 0]));
        assert_eq!(frame.pixel(1, 1), Some([255, 0, 0]));
        assert_eq!(frame.pixel(2, 2), Some([0, 0, 0]));

        frame.fill_rect(10, 10, 20, 20, [0, 255, 0]);
        assert!(frame.pixels().chunks(3).all(|px| px[1] == 0));
    }

    #[test]
    fn debug_does_not_dump_pixels() {
        let frame = Frame::filled(2, 1, [7, 7, 7]);
        let rendered = format!("{frame:?}");
        assert!(rendered.contains("width: 2"));
        assert!(!rendered.contains("data"));
    }

    #[test]
    fn image_round_trip_keeps_geometry() -> Result<()> {
        let frame = Frame::filled(3, 2, [1, 2, 3]);
        let image = frame.into_rgb_image()?;
        assert_eq!(image.dimensions(), (3, 2));
        let back = Frame::from_rgb_image(image);
        assert_eq!(back.pixel(2, 1), Some([1, 2, 3]));
        Ok(())
    }
}
