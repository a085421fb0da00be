//! YOLOv8 output decoding.
//!
//! A detection head emits `[1, 4 + classes, anchors]` (or the transposed
//! `[1, anchors, 4 + classes]`). Each anchor carries a centre/size box in model
//! input pixels followed by one score per class.

use anyhow::{bail, Result};

use crate::detect::result::BoundingBox;

const CXYWH: usize = 4;

/// Parameters for turning raw head output into frame-space boxes.
#[derive(Clone, Debug)]
pub struct DecodeParams {
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub confidence_threshold: f32,
    pub labels: Vec<String>,
}

/// Decode a flat YOLOv8 output tensor of the given shape.
pub fn decode_predictions(
    output: &[f32],
    shape: &[usize],
    params: &DecodeParams,
) -> Result<Vec<BoundingBox>> {
    let (rows, cols) = match shape {
        [1, rows, cols] => (*rows, *cols),
        [rows, cols] => (*rows, *cols),
        other => bail!("unexpected detection head shape {:?}", other),
    };
    if output.len() != rows * cols {
        bail!(
            "detection head holds {} values, shape {:?} needs {}",
            output.len(),
            shape,
            rows * cols
        );
    }
    // Anchors outnumber channels in every real export.
    let transposed = rows > cols;
    let (channels, anchors) = if transposed { (cols, rows) } else { (rows, cols) };
    if channels <= CXYWH {
        bail!("detection head has no class scores ({} channels)", channels);
    }
    let value = |channel: usize, anchor: usize| {
        if transposed {
            output[anchor * channels + channel]
        } else {
            output[channel * anchors + anchor]
        }
    };

    let sx = params.frame_width as f32 / params.input_size as f32;
    let sy = params.frame_height as f32 / params.input_size as f32;
    let max_x = params.frame_width.saturating_sub(1) as f32;
    let max_y = params.frame_height.saturating_sub(1) as f32;

    let mut boxes = Vec::new();
    for anchor in 0..anchors {
        let Some((class, score)) = (CXYWH..channels)
            .map(|channel| (channel - CXYWH, value(channel, anchor)))
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
        else {
            continue;
        };
        if !score.is_finite() || score < params.confidence_threshold {
            continue;
        }

        let cx = value(0, anchor) * sx;
        let cy = value(1, anchor) * sy;
        let w = value(2, anchor) * sx;
        let h = value(3, anchor) * sy;
        let x1 = (cx - w / 2.0).clamp(0.0, max_x);
        let y1 = (cy - h / 2.0).clamp(0.0, max_y);
        let x2 = (cx + w / 2.0).clamp(0.0, max_x);
        let y2 = (cy + h / 2.0).clamp(0.0, max_y);

        let label = params
            .labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class));
        boxes.push(
            BoundingBox::new(
                x1.round() as i32,
                y1.round() as i32,
                x2.round() as i32,
                y2.round() as i32,
                label,
            )
            .with_confidence(score),
        );
    }
    Ok(boxes)
}

/// Greedy non-maximum suppression, highest confidence first.
///
/// Boxes of different labels never suppress each other.
pub fn non_max_suppression(boxes: &mut Vec<BoundingBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| {
        b.confidence
            .unwrap_or(0.0)
            .total_cmp(&a.confidence.unwrap_or(0.0))
    });

    let mut kept = 0;
    for index in 0..boxes.len() {
        let suppressed = (0..kept).any(|prev| {
            boxes[prev].label == boxes[index].label
                && boxes[prev].iou(&boxes[index]) > iou_threshold
        });
        if !suppressed {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            input_size: 100,
            frame_width: 200,
            frame_height: 100,
            confidence_threshold: 0.25,
            labels: vec!["Fire".to_string()],
        }
    }

    #[test]
    fn decodes_channel_major_head_into_frame_space() -> Result<()> {
        // Two anchors, one class: [cx, cy, w, h, score] per anchor, channel-major.
        let output = [
            50.0, 10.0, // cx
            50.0, 10.0, // cy
            20.0, 4.0, // w
            10.0, 4.0, // h
            0.9, 0.1, // Fire
        ];
        let boxes = decode_predictions(&output, &[1, 5, 2], &params())?;

        assert_eq!(boxes.len(), 1);
        let fire = &boxes[0];
        assert_eq!((fire.x1, fire.y1, fire.x2, fire.y2), (80, 45, 120, 55));
        assert_eq!(fire.label, "Fire");
        assert_eq!(fire.confidence, Some(0.9));
        Ok(())
    }

    #[test]
    fn transposed_head_and_unknown_classes() -> Result<()> {
        let mut params = params();
        params.labels.clear();
        // Eight anchors by five channels; only the first scores.
        let mut output = vec![0.0f32; 8 * 5];
        output[..5].copy_from_slice(&[10.0, 10.0, 10.0, 10.0, 0.5]);
        let boxes = decode_predictions(&output, &[1, 8, 5], &params)?;

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "class 0");
        assert_eq!((boxes[0].x1, boxes[0].x2), (10, 30));
        Ok(())
    }

    #[test]
    fn boxes_are_clamped_to_the_frame() -> Result<()> {
        let output = [0.0, 0.0, 400.0, 400.0, 0.8];
        let boxes = decode_predictions(&output, &[1, 5, 1], &params())?;
        let b = &boxes[0];
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (0, 0, 199, 99));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shapes() {
        assert!(decode_predictions(&[0.0; 4], &[1, 5, 1], &params()).is_err());
        assert!(decode_predictions(&[0.0; 4], &[1, 4, 1], &params()).is_err());
        assert!(decode_predictions(&[0.0; 4], &[4], &params()).is_err());
    }

    #[test]
    fn nms_keeps_strongest_of_overlapping_boxes() {
        let mut boxes = vec![
            BoundingBox::new(0, 0, 10, 10, "Fire").with_confidence(0.6),
            BoundingBox::new(1, 1, 11, 11, "Fire").with_confidence(0.9),
            BoundingBox::new(50, 50, 60, 60, "Fire").with_confidence(0.4),
            BoundingBox::new(0, 0, 10, 10, "Smoke").with_confidence(0.5),
        ];
        non_max_suppression(&mut boxes, 0.45);

        let kept: Vec<_> = boxes
            .iter()
            .map(|b| (b.label.as_str(), b.confidence))
            .collect();
        assert_eq!(
            kept,
            vec![("Fire", Some(0.9)), ("Smoke", Some(0.5)), ("Fire", Some(0.4))]
        );
    }
}
