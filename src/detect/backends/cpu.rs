use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// CPU backend for flame-coloured regions.
///
/// Marks pixels that are bright red-orange and reports one box around all of
/// them once enough of the frame matches. No model file is needed, which makes
/// this the default when nothing else is configured.
pub struct CpuBackend {
    label: String,
    min_fraction: f32,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            label: "Fire".to_string(),
            min_fraction: 0.001,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Fraction of frame pixels that must look like flame before a box is reported.
    pub fn with_min_fraction(mut self, min_fraction: f32) -> Self {
        self.min_fraction = min_fraction.clamp(0.0, 1.0);
        self
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn is_flame(rgb: &[u8]) -> bool {
    let (r, g, b) = (rgb[0], rgb[1], rgb[2]);
    r > 200 && (80..=200).contains(&g) && b < 90
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let width = frame.width as usize;
        if frame.is_empty() || width == 0 {
            return Ok(Vec::new());
        }

        let mut hits = 0usize;
        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        for (index, rgb) in frame.pixels().chunks_exact(3).enumerate() {
            if !is_flame(rgb) {
                continue;
            }
            let (x, y) = (index % width, index / width);
            hits += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let total = width * frame.height as usize;
        if hits == 0 || (hits as f32) < self.min_fraction * total as f32 {
            return Ok(Vec::new());
        }

        let area = (max_x - min_x + 1) * (max_y - min_y + 1);
        let density = hits as f32 / area as f32;
        Ok(vec![BoundingBox::new(
            min_x as i32,
            min_y as i32,
            max_x as i32,
            max_y as i32,
            self.label.clone(),
        )
        .with_confidence(density)])
    }
}
