/// One detection in pixel coordinates of the frame it came from.
///
/// Boxes have no identity; each detector call produces a fresh list.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    /// Class name, e.g. "Fire".
    pub label: String,
    /// Detector confidence in 0..=1, when the backend reports one.
    pub confidence: Option<f32>,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, label: impl Into<String>) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            label: label.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Text drawn above the box: `"Fire"` or `"Fire 0.87"`.
    pub fn caption(&self) -> String {
        match self.confidence {
            Some(confidence) => format!("{} {:.2}", self.label, confidence),
            None => self.label.clone(),
        }
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0) as f32;
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0) as f32;
        let intersection = ix * iy;
        let union = (self.width() * self.height()) as f32
            + (other.width() * other.height()) as f32
            - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalized() {
        let b = BoundingBox::new(50, 40, 10, 5, "Fire");
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (10, 5, 50, 40));
        assert_eq!((b.width(), b.height()), (40, 35));
    }

    #[test]
    fn caption_includes_confidence_when_known() {
        let b = BoundingBox::new(0, 0, 1, 1, "Fire");
        assert_eq!(b.caption(), "Fire");
        assert_eq!(b.with_confidence(0.873).caption(), "Fire 0.87");
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::new(0, 0, 10, 10, "Fire");
        let b = BoundingBox::new(20, 20, 30, 30, "Fire");
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&a), 1.0);

        let half = BoundingBox::new(5, 0, 15, 10, "Fire");
        assert!((a.iou(&half) - 1.0 / 3.0).abs() < 1e-6);
    }
}
