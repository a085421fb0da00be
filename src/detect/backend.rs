use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is an opaque inference call: pixels in, boxes out. Latency is
/// unspecified; the frame pump never runs two calls on the same backend at once.
///
/// Implementations must treat the frame as read-only and must not keep it
/// beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Boxes are in the frame's pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A backend shared between the registry and the frame pump.
pub type SharedDetector = Arc<Mutex<dyn DetectorBackend>>;
