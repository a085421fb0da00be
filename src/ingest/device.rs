//! Local capture device source.
//!
//! This module provides `DeviceSource` for `Device(index)` descriptors.
//! The device source is responsible for:
//! - Mapping the device index onto a device node (e.g., /dev/video0)
//! - Capturing frames in-memory and normalizing them to RGB
//! - Reporting the device's configured frame rate
//!
//! A live device signals end-of-stream only when it disconnects.

use anyhow::Result;

use super::synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Device;
use super::{read_error, FrameSource, ReadOutcome};
use crate::error::ReadError;

/// Configuration for a capture device.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Index the user selected.
    pub index: u32,
    /// Device node, or a `stub://` url for a synthetic camera.
    pub path: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            index: 0,
            path: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Capture device frame source.
///
/// Uses V4L2 for real devices, with a synthetic fallback for `stub://` paths.
pub struct DeviceSource {
    config: DeviceConfig,
    backend: DeviceBackend,
}

enum DeviceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Device),
}

impl DeviceSource {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let backend = if config.path.starts_with("stub://") {
            DeviceBackend::Synthetic(SyntheticSource::new(
                &config.path,
                config.width,
                config.height,
            )?)
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                DeviceBackend::V4l2(V4l2Device::new(&config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                return Err(anyhow::Error::new(super::MissingBackend("ingest-v4l2"))
                    .context(format!("open capture device {}", config.path)));
            }
        };
        Ok(Self { config, backend })
    }

    /// Acquire the device.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            DeviceBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::V4l2(device) => device.connect(),
        }
    }

    /// Frames captured since connect.
    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            DeviceBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::V4l2(device) => device.frames_captured(),
        }
    }
}

impl FrameSource for DeviceSource {
    fn describe(&self) -> String {
        format!("device {} ({})", self.config.index, self.config.path)
    }

    fn read(&mut self) -> Result<ReadOutcome, ReadError> {
        let next = match &mut self.backend {
            DeviceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::V4l2(device) => device.next_frame(),
        };
        match next {
            Ok(Some(frame)) => Ok(ReadOutcome::Frame(frame)),
            Ok(None) => Ok(ReadOutcome::EndOfStream),
            Err(err) => Err(read_error(self.describe(), err)),
        }
    }

    fn reported_fps(&self) -> Option<f64> {
        match &self.backend {
            DeviceBackend::Synthetic(source) => source.reported_fps(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::V4l2(device) => device.reported_fps(),
        }
    }

    fn close(&mut self) {
        match &mut self.backend {
            DeviceBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "ingest-v4l2")]
            DeviceBackend::V4l2(device) => device.close(),
        }
    }
}
