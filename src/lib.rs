//! FireSense video player core
//!
//! This crate pulls frames from a camera, a video file, or a network stream,
//! runs a fire detector on each one, draws the detections, and hands the
//! result to a display surface at the source's own pace.
//!
//! # Architecture
//!
//! The pipeline holds three guarantees by construction:
//!
//! 1. **One source**: at most one capture handle is open at any instant; the
//!    old one is closed before a new one is opened.
//! 2. **One detection**: a tick is read → detect → annotate → publish, and the
//!    next tick is not scheduled until the previous one has finished.
//! 3. **No stale frames**: a tick that finishes after a reset or source switch
//!    is dropped instead of published.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame buffers
//! - `ingest`: Frame sources (V4L2 devices, local files, RTSP/HTTP streams, `stub://`)
//! - `detect`: Detector backends and the shared registry
//! - `annotate`: Box and caption overlay strategies
//! - `display`: Display sink contract and scale-to-fit
//! - `pump`: The pipeline state machine
//! - `runner`: Worker thread and thread-safe handle for UI callers
//! - `events`: UI source-selection events
//! - `config`: Settings file and `FIRESENSE_*` environment overrides

use anyhow::{anyhow, Result};

pub mod annotate;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod events;
pub mod frame;
pub mod ingest;
pub mod pump;
pub mod runner;
pub mod ui;

pub use annotate::{Annotator, AnnotatorSettings, AnnotatorStyle, ManualAnnotator};
pub use config::PlayerConfig;
pub use detect::{BackendRegistry, BoundingBox, DetectorBackend, DetectorSettings, SharedDetector};
pub use display::{DisplayArea, DisplaySink, LatestFrameSink};
pub use error::{OpenError, PipelineError, ReadError};
pub use events::{EventError, SourceCommand, UiEvent, UploadPolicy};
pub use frame::{Frame, PixelLayout};
pub use ingest::{
    effective_interval, CaptureSettings, FrameSource, FrameSourceDescriptor, OpenFrameSource,
    ReadOutcome, SourceCatalog, SourceOpener,
};
pub use pump::{FramePump, PipelineState, PumpStats};
pub use runner::{PumpHandle, PumpRunner};

/// Wire a pump from configuration: source catalog, detector, annotator.
pub fn assemble_pump(config: &PlayerConfig, sink: Box<dyn DisplaySink>) -> Result<FramePump> {
    let registry = detect::build_registry(&config.detector)?;
    let detector = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend available"))?;
    let annotator = annotate::build_annotator(&config.annotator)?;
    let catalog = SourceCatalog::new(config.capture.clone());
    Ok(FramePump::new(Box::new(catalog), detector, annotator, sink))
}
