use crate::annotate::{font, label_text_color, Annotator};
use crate::detect::BoundingBox;
use crate::frame::Frame;

/// Draws outlines and captions directly into the pixel buffer.
#[derive(Clone, Debug)]
pub struct ManualAnnotator {
    color: [u8; 3],
    thickness: u32,
    text_scale: u32,
    padding: u32,
}

impl ManualAnnotator {
    pub fn new(color: [u8; 3], thickness: u32) -> Self {
        Self {
            color,
            thickness: thickness.max(1),
            text_scale: 2,
            padding: 3,
        }
    }

    fn draw_box(&self, frame: &mut Frame, bbox: &BoundingBox) {
        let (x1, x2) = (i64::from(bbox.x1.min(bbox.x2)), i64::from(bbox.x1.max(bbox.x2)));
        let (y1, y2) = (i64::from(bbox.y1.min(bbox.y2)), i64::from(bbox.y1.max(bbox.y2)));
        if x2 < 0 || y2 < 0 || x1 >= i64::from(frame.width) || y1 >= i64::from(frame.height) {
            return;
        }

        let t = i64::from(self.thickness) - 1;
        frame.fill_rect(x1, y1, x2, y1 + t, self.color);
        frame.fill_rect(x1, y2 - t, x2, y2, self.color);
        frame.fill_rect(x1, y1, x1 + t, y2, self.color);
        frame.fill_rect(x2 - t, y1, x2, y2, self.color);

        let caption = bbox.caption();
        let pad = i64::from(self.padding);
        let label_w = i64::from(font::text_width(&caption, self.text_scale)) + 2 * pad;
        let label_h = i64::from(font::text_height(self.text_scale)) + 2 * pad;
        // Sits on the top edge; slides down inside the box when there is no room above.
        let top = (y1 - label_h).max(0);
        frame.fill_rect(x1, top, x1 + label_w - 1, top + label_h - 1, self.color);
        font::draw_text(
            frame,
            x1 + pad,
            top + pad,
            &caption,
            self.text_scale,
            label_text_color(self.color),
        );
    }
}

impl Annotator for ManualAnnotator {
    fn annotate(&self, mut frame: Frame, boxes: &[BoundingBox]) -> Frame {
        for bbox in boxes {
            self.draw_box(&mut frame, bbox);
        }
        frame
    }
}
