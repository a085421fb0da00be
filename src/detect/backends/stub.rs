use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// Stub backend for testing. Returns the same boxes for every frame.
#[derive(Default)]
pub struct StubBackend {
    boxes: Vec<BoundingBox>,
    calls: u64,
}

impl StubBackend {
    /// A backend that never detects anything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes, calls: 0 }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>> {
        self.calls += 1;
        Ok(self.boxes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_repeats_fixed_boxes() -> Result<()> {
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        let mut empty = StubBackend::new();
        assert!(empty.detect(&frame)?.is_empty());

        let fire = BoundingBox::new(1, 1, 4, 4, "Fire").with_confidence(0.7);
        let mut backend = StubBackend::with_boxes(vec![fire.clone()]);
        assert_eq!(backend.detect(&frame)?, vec![fire.clone()]);
        assert_eq!(backend.detect(&frame)?, vec![fire]);
        assert_eq!(backend.calls(), 2);
        Ok(())
    }
}
