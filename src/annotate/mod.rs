//! Box and caption overlay.
//!
//! Two interchangeable strategies draw the same layout: an outline around each
//! box and a filled caption tab on its top edge. The tab's top is clamped to
//! the first row of the frame, so boxes touching the top edge keep a readable
//! caption inside the box.

mod font;
#[cfg(feature = "annotate-imageproc")]
mod primitives;
mod manual;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::BoundingBox;
use crate::frame::Frame;

#[cfg(feature = "annotate-imageproc")]
pub use primitives::ImageprocAnnotator;
pub use manual::ManualAnnotator;

/// Draws detections onto a frame.
///
/// The frame is consumed and returned; an empty box list returns it untouched.
pub trait Annotator: Send + Sync {
    fn annotate(&self, frame: Frame, boxes: &[BoundingBox]) -> Frame;
}

/// Annotator strategy selected by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotatorStyle {
    /// Built-in drawing, no extra dependencies.
    Manual,
    /// `imageproc` primitives with an optional TrueType caption font.
    Imageproc,
}

impl FromStr for AnnotatorStyle {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "imageproc" => Ok(Self::Imageproc),
            other => Err(anyhow!(
                "unknown annotator style '{}' (expected manual or imageproc)",
                other
            )),
        }
    }
}

impl fmt::Display for AnnotatorStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Imageproc => write!(f, "imageproc"),
        }
    }
}

/// Resolved annotator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotatorSettings {
    pub style: AnnotatorStyle,
    pub font_path: Option<PathBuf>,
    pub box_color: [u8; 3],
    pub thickness: u32,
}

impl Default for AnnotatorSettings {
    fn default() -> Self {
        Self {
            style: AnnotatorStyle::Manual,
            font_path: None,
            box_color: [0xDC, 0x4D, 0x01],
            thickness: 2,
        }
    }
}

/// Build the configured strategy.
pub fn build_annotator(settings: &AnnotatorSettings) -> Result<Arc<dyn Annotator>> {
    match settings.style {
        AnnotatorStyle::Manual => Ok(Arc::new(ManualAnnotator::new(
            settings.box_color,
            settings.thickness,
        ))),
        #[cfg(feature = "annotate-imageproc")]
        AnnotatorStyle::Imageproc => Ok(Arc::new(ImageprocAnnotator::new(
            settings.box_color,
            settings.thickness,
            settings.font_path.as_deref(),
        )?)),
        #[cfg(not(feature = "annotate-imageproc"))]
        AnnotatorStyle::Imageproc => Err(anyhow!(
            "annotator 'imageproc' is not compiled in (enable feature annotate-imageproc)"
        )),
    }
}

/// Parse `#RRGGBB` (the `#` is optional).
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("colour must look like #RRGGBB, got '{}'", value));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|e| anyhow!("invalid colour '{}': {}", value, e))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Black or white, whichever reads better on `background`.
pub(crate) fn label_text_color(background: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = background.map(f32::from);
    let luminance = 0.299 * r + 0.587 * g + 0.114 * b;
    if luminance > 150.0 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_styles_case_insensitively() -> Result<()> {
        assert_eq!("Manual".parse::<AnnotatorStyle>()?, AnnotatorStyle::Manual);
        assert_eq!(" imageproc ".parse::<AnnotatorStyle>()?, AnnotatorStyle::Imageproc);
        assert!("opencv".parse::<AnnotatorStyle>().is_err());
        assert_eq!(AnnotatorStyle::Imageproc.to_string(), "imageproc");
        Ok(())
    }

    #[test]
    fn parses_hex_colours() -> Result<()> {
        assert_eq!(parse_hex_color("#DC4D01")?, [0xDC, 0x4D, 0x01]);
        assert_eq!(parse_hex_color("ffa500")?, [0xFF, 0xA5, 0x00]);
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
        Ok(())
    }

    #[test]
    fn caption_colour_contrasts_with_background() {
        assert_eq!(label_text_color([0xDC, 0x4D, 0x01]), [255, 255, 255]);
        assert_eq!(label_text_color([0xFF, 0xA5, 0x00]), [0, 0, 0]);
        assert_eq!(label_text_color([255, 255, 255]), [0, 0, 0]);
    }

    #[test]
    fn default_strategy_is_manual() -> Result<()> {
        let annotator = build_annotator(&AnnotatorSettings::default())?;
        let frame = Frame::filled(8, 8, [1, 2, 3]);
        let out = annotator.annotate(frame, &[]);
        assert_eq!(out.pixel(0, 0), Some([1, 2, 3]));
        Ok(())
    }
}
