#![cfg(feature = "annotate-imageproc")]

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::annotate::{font, label_text_color, Annotator};
use crate::detect::BoundingBox;
use crate::frame::Frame;

const BITMAP_SCALE: u32 = 2;
const PADDING: i32 = 3;

/// Draws boxes with `imageproc` primitives and captions with a TrueType font.
///
/// Without a font file the captions fall back to the built-in bitmap font.
pub struct ImageprocAnnotator {
    color: [u8; 3],
    thickness: u32,
    font: Option<FontVec>,
    scale: PxScale,
}

impl ImageprocAnnotator {
    pub fn new(color: [u8; 3], thickness: u32, font_path: Option<&Path>) -> Result<Self> {
        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("read font {}", path.display()))?;
                Some(
                    FontVec::try_from_vec(bytes)
                        .with_context(|| format!("parse font {}", path.display()))?,
                )
            }
            None => None,
        };
        Ok(Self {
            color,
            thickness: thickness.max(1),
            font,
            scale: PxScale::from(16.0),
        })
    }

    fn caption_size(&self, caption: &str) -> (i32, i32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(self.scale, font, caption);
                (w as i32, h as i32)
            }
            None => (
                font::text_width(caption, BITMAP_SCALE) as i32,
                font::text_height(BITMAP_SCALE) as i32,
            ),
        }
    }
}

impl Annotator for ImageprocAnnotator {
    fn annotate(&self, frame: Frame, boxes: &[BoundingBox]) -> Frame {
        if boxes.is_empty() {
            return frame;
        }
        let Some(mut canvas) = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        else {
            return frame;
        };
        let color = Rgb(self.color);
        let text_color = Rgb(label_text_color(self.color));
        let mut bitmap_captions = Vec::new();

        for bbox in boxes {
            let (x1, x2) = (bbox.x1.min(bbox.x2), bbox.x1.max(bbox.x2));
            let (y1, y2) = (bbox.y1.min(bbox.y2), bbox.y1.max(bbox.y2));
            if x2 < 0 || y2 < 0 || x1 >= frame.width as i32 || y1 >= frame.height as i32 {
                continue;
            }

            for inset in 0..self.thickness as i32 {
                let w = x2 - x1 + 1 - 2 * inset;
                let h = y2 - y1 + 1 - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            let caption = bbox.caption();
            let (text_w, text_h) = self.caption_size(&caption);
            let label_w = (text_w + 2 * PADDING).max(1);
            let label_h = (text_h + 2 * PADDING).max(1);
            let top = (y1 - label_h).max(0);
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(x1, top).of_size(label_w as u32, label_h as u32),
                color,
            );
            match &self.font {
                Some(font) => draw_text_mut(
                    &mut canvas,
                    text_color,
                    x1 + PADDING,
                    top + PADDING,
                    self.scale,
                    font,
                    &caption,
                ),
                None => bitmap_captions.push((x1 + PADDING, top + PADDING, caption)),
            }
        }

        let mut out = Frame::from_rgb_image(canvas).inherit_from(&frame);
        for (x, y, caption) in bitmap_captions {
            font::draw_text(
                &mut out,
                i64::from(x),
                i64::from(y),
                &caption,
                BITMAP_SCALE,
                text_color.0,
            );
        }
        out
    }
}
