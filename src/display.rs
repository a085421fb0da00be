//! Display sink intake.
//!
//! The sink is the UI surface; the pump only needs to hand it ready frames and
//! to clear it on reset. Frames are scaled to fit the sink's area before they
//! are published.

use std::sync::{Arc, Mutex, PoisonError};

use image::imageops::{self, FilterType};

use crate::frame::Frame;

/// Target area of the display surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayArea {
    pub width: u32,
    pub height: u32,
}

impl DisplayArea {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for DisplayArea {
    fn default() -> Self {
        Self::new(700, 400)
    }
}

/// Receives annotated frames.
pub trait DisplaySink: Send {
    /// Show a frame. Replaces whatever was shown before.
    fn publish(&mut self, frame: Frame);

    /// Drop the last frame and show the idle placeholder.
    fn clear(&mut self);

    /// Area frames should be scaled into, or `None` to publish at source size.
    fn area(&self) -> Option<DisplayArea> {
        None
    }
}

/// Largest size with the frame's aspect ratio that fits inside `area`.
///
/// Both dimensions are at least one pixel.
pub fn fit_within(width: u32, height: u32, area: DisplayArea) -> (u32, u32) {
    if width == 0 || height == 0 || area.width == 0 || area.height == 0 {
        return (area.width.max(1), area.height.max(1));
    }
    let scale = f64::min(
        f64::from(area.width) / f64::from(width),
        f64::from(area.height) / f64::from(height),
    );
    let w = (f64::from(width) * scale).round().clamp(1.0, f64::from(area.width));
    let h = (f64::from(height) * scale).round().clamp(1.0, f64::from(area.height));
    (w as u32, h as u32)
}

/// Scale a frame to fit `area`, preserving aspect ratio.
pub fn scale_to_fit(frame: Frame, area: DisplayArea) -> Frame {
    if frame.is_empty() {
        return frame;
    }
    let (w, h) = fit_within(frame.width, frame.height, area);
    if (w, h) == (frame.width, frame.height) {
        return frame;
    }
    let Some(image) = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
    else {
        return frame;
    };
    let resized = imageops::resize(&image, w, h, FilterType::Triangle);
    Frame::from_rgb_image(resized).inherit_from(&frame)
}

#[derive(Debug, Default)]
struct LatestState {
    frame: Option<Frame>,
    published: u64,
    cleared: u64,
}

/// In-memory sink that keeps the most recent frame.
///
/// Clones share state, so a UI thread can poll what the pump published.
#[derive(Clone, Debug)]
pub struct LatestFrameSink {
    state: Arc<Mutex<LatestState>>,
    area: Option<DisplayArea>,
}

impl LatestFrameSink {
    pub fn new(area: Option<DisplayArea>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LatestState::default())),
            area,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LatestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The frame currently on display.
    pub fn latest(&self) -> Option<Frame> {
        self.lock().frame.clone()
    }

    /// True when the idle placeholder is showing.
    pub fn is_idle(&self) -> bool {
        self.lock().frame.is_none()
    }

    pub fn published(&self) -> u64 {
        self.lock().published
    }

    pub fn cleared(&self) -> u64 {
        self.lock().cleared
    }
}

impl Default for LatestFrameSink {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DisplaySink for LatestFrameSink {
    fn publish(&mut self, frame: Frame) {
        let mut state = self.lock();
        state.frame = Some(frame);
        state.published += 1;
    }

    fn clear(&mut self) {
        let mut state = self.lock();
        state.frame = None;
        state.cleared += 1;
    }

    fn area(&self) -> Option<DisplayArea> {
        self.area
    }
}
