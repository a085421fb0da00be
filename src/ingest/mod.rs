//! Frame sources.
//!
//! This module turns a `FrameSourceDescriptor` into a pollable frame producer:
//! - Local capture devices (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Network streams, RTSP or HTTP (feature: rtsp-gstreamer)
//! - `stub://` synthetic sources for every variant (always available)
//!
//! Every source normalizes to packed RGB `Frame`s. The ingestion layer is
//! responsible for:
//! - Acquiring and releasing the underlying handle (`connect` / `close`)
//! - Reporting the native frame rate when the backend knows it
//! - Distinguishing end-of-stream from read failures
//!
//! Sources MUST NOT pace themselves; pacing belongs to the frame pump.

pub mod device;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod network;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub(crate) mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub(crate) mod v4l2;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{cause, OpenError, ReadError};
use crate::frame::Frame;

pub use device::{DeviceConfig, DeviceSource};
pub use file::{FileConfig, FileSource};
pub use network::{NetworkConfig, NetworkSource};

/// Frame rate used when a source cannot report a positive one.
pub const FALLBACK_FPS: f64 = 30.0;

/// Pacing delay between ticks for a reported frame rate.
///
/// A finite positive rate `r` gives `1/r` seconds; anything else (absent,
/// zero, negative, NaN) gives the 30 fps fallback. Never returns zero.
pub fn effective_interval(reported_fps: Option<f64>) -> Duration {
    let fps = match reported_fps {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        _ => FALLBACK_FPS,
    };
    Duration::from_secs_f64(1.0 / fps).max(Duration::from_nanos(1))
}

// ----------------------------------------------------------------------------
// Descriptors
// ----------------------------------------------------------------------------

/// Which source to open. Immutable once handed to the pump.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameSourceDescriptor {
    /// Local capture device by index (0 = built-in camera).
    Device(u32),
    /// Local video file path.
    File(String),
    /// Network stream URL (RTSP, HTTP).
    Network(String),
}

impl FromStr for FrameSourceDescriptor {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            anyhow::bail!("source descriptor is empty");
        }
        if let Some(path) = value.strip_prefix("file:") {
            return Ok(Self::File(path.to_string()));
        }
        if let Some(url) = value.strip_prefix("net:") {
            return Ok(Self::Network(url.to_string()));
        }
        if value.bytes().all(|b| b.is_ascii_digit()) {
            let index = value
                .parse()
                .map_err(|_| anyhow::anyhow!("device index '{}' is out of range", value))?;
            return Ok(Self::Device(index));
        }
        if value.contains("://") {
            return Ok(Self::Network(value.to_string()));
        }
        Ok(Self::File(value.to_string()))
    }
}

impl fmt::Display for FrameSourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(index) => write!(f, "{index}"),
            Self::File(path) => {
                let ambiguous = path.is_empty()
                    || path.contains("://")
                    || path.starts_with("net:")
                    || path.starts_with("file:")
                    || path.bytes().all(|b| b.is_ascii_digit());
                if ambiguous {
                    write!(f, "file:{path}")
                } else {
                    f.write_str(path)
                }
            }
            Self::Network(url) => {
                if url.contains("://") {
                    f.write_str(url)
                } else {
                    write!(f, "net:{url}")
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Source contract
// ----------------------------------------------------------------------------

/// Result of a successful read.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// Normal completion: last frame of a file, or a live source disconnecting.
    EndOfStream,
}

/// A connected frame producer.
///
/// Implementations own their backend handle. `close` must be idempotent and
/// must never panic; the pump may call it on error paths and again on drop.
pub trait FrameSource: Send {
    /// Human-readable origin for logs and error causes.
    fn describe(&self) -> String;

    /// Pull the next frame.
    fn read(&mut self) -> Result<ReadOutcome, ReadError>;

    /// Native frame rate, if the backend reports one.
    fn reported_fps(&self) -> Option<f64>;

    /// Release the underlying resource.
    fn close(&mut self);
}

/// Opens descriptors into frame sources. The pump owns exactly one opener.
pub trait SourceOpener: Send {
    fn open(&mut self, descriptor: &FrameSourceDescriptor)
        -> Result<Box<dyn FrameSource>, OpenError>;
}

/// The single active source owned by the frame pump.
pub struct OpenFrameSource {
    descriptor: FrameSourceDescriptor,
    handle: Box<dyn FrameSource>,
    interval: Duration,
    closed: bool,
}

impl OpenFrameSource {
    pub fn new(descriptor: FrameSourceDescriptor, handle: Box<dyn FrameSource>) -> Self {
        let interval = effective_interval(handle.reported_fps());
        Self {
            descriptor,
            handle,
            interval,
            closed: false,
        }
    }

    pub fn descriptor(&self) -> &FrameSourceDescriptor {
        &self.descriptor
    }

    /// Always positive.
    pub fn effective_interval(&self) -> Duration {
        self.interval
    }

    pub fn read(&mut self) -> Result<ReadOutcome, ReadError> {
        if self.closed {
            return Err(ReadError::Io {
                origin: self.handle.describe(),
                cause: "source is closed".to_string(),
            });
        }
        self.handle.read()
    }

    /// Release the handle. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.handle.close();
        log::info!("source {} closed", self.descriptor);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for OpenFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for OpenFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFrameSource")
            .field("descriptor", &self.descriptor)
            .field("interval", &self.interval)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Map a backend read failure onto the read taxonomy.
///
/// Backends that already produced a typed `ReadError` (e.g. a stall) keep it.
pub(crate) fn read_error(origin: String, err: anyhow::Error) -> ReadError {
    match err.downcast::<ReadError>() {
        Ok(typed) => typed,
        Err(err) => ReadError::Io {
            origin,
            cause: cause(&err),
        },
    }
}

// ----------------------------------------------------------------------------
// Default opener
// ----------------------------------------------------------------------------

/// Capture parameters shared by every backend.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    /// Device node template; `{index}` is replaced by the device index.
    /// A `stub://` template opens a synthetic camera.
    pub device_path: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Longest wait for a single network frame before the read fails.
    pub read_timeout: Duration,
    /// Longest wait for a network stream to start playing.
    pub open_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_path: "/dev/video{index}".to_string(),
            width: 640,
            height: 480,
            read_timeout: Duration::from_millis(5_000),
            open_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Opens descriptors with the backends compiled into this build.
#[derive(Clone, Debug, Default)]
pub struct SourceCatalog {
    settings: CaptureSettings,
}

impl SourceCatalog {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    /// Open a descriptor and wrap it as the active source.
    pub fn open_source(
        &mut self,
        descriptor: &FrameSourceDescriptor,
    ) -> Result<OpenFrameSource, OpenError> {
        let handle = self.open(descriptor)?;
        Ok(OpenFrameSource::new(descriptor.clone(), handle))
    }

    fn open_device(&self, index: u32) -> anyhow::Result<DeviceSource> {
        let config = DeviceConfig {
            index,
            path: self.settings.device_path.replace("{index}", &index.to_string()),
            width: self.settings.width,
            height: self.settings.height,
        };
        let mut source = DeviceSource::new(config)?;
        source.connect()?;
        Ok(source)
    }

    fn open_file(&self, path: &str) -> anyhow::Result<FileSource> {
        let mut source = FileSource::new(FileConfig {
            path: path.to_string(),
            width: self.settings.width,
            height: self.settings.height,
        })?;
        source.connect()?;
        Ok(source)
    }

    fn open_network(&self, url: &str) -> anyhow::Result<NetworkSource> {
        let mut source = NetworkSource::new(NetworkConfig {
            url: url.to_string(),
            width: self.settings.width,
            height: self.settings.height,
            read_timeout: self.settings.read_timeout,
            open_timeout: self.settings.open_timeout,
        })?;
        source.connect()?;
        Ok(source)
    }
}

impl SourceOpener for SourceCatalog {
    fn open(
        &mut self,
        descriptor: &FrameSourceDescriptor,
    ) -> Result<Box<dyn FrameSource>, OpenError> {
        match descriptor {
            FrameSourceDescriptor::Device(index) => match self.open_device(*index) {
                Ok(source) => Ok(Box::new(source)),
                Err(err) => Err(open_error(descriptor, &err)),
            },
            FrameSourceDescriptor::File(path) => match self.open_file(path) {
                Ok(source) => Ok(Box::new(source)),
                Err(err) => Err(open_error(descriptor, &err)),
            },
            FrameSourceDescriptor::Network(url) => match self.open_network(url) {
                Ok(source) => Ok(Box::new(source)),
                Err(err) => Err(open_error(descriptor, &err)),
            },
        }
    }
}

/// Marker attached to open failures caused by a backend missing from this build.
#[derive(Debug)]
pub(crate) struct MissingBackend(pub &'static str);

impl fmt::Display for MissingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requires the {} feature", self.0)
    }
}

impl std::error::Error for MissingBackend {}

fn open_error(descriptor: &FrameSourceDescriptor, err: &anyhow::Error) -> OpenError {
    if err.downcast_ref::<MissingBackend>().is_some() {
        return OpenError::Unsupported {
            descriptor: descriptor.to_string(),
            cause: cause(err),
        };
    }
    match descriptor {
        FrameSourceDescriptor::Device(index) => OpenError::DeviceUnavailable {
            index: *index,
            cause: cause(err),
        },
        FrameSourceDescriptor::File(path) => OpenError::FileUnreadable {
            path: path.clone(),
            cause: cause(err),
        },
        FrameSourceDescriptor::Network(url) => OpenError::NetworkUnreachable {
            url: url.clone(),
            cause: cause(err),
        },
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_catalog() -> SourceCatalog {
        SourceCatalog::new(CaptureSettings {
            device_path: "stub://camera{index}".to_string(),
            width: 64,
            height: 48,
            ..CaptureSettings::default()
        })
    }

    #[test]
    fn interval_follows_reported_rate() {
        assert_eq!(effective_interval(Some(25.0)), Duration::from_millis(40));
        assert_eq!(effective_interval(Some(50.0)), Duration::from_millis(20));
    }

    #[test]
    fn interval_falls_back_to_thirty_fps() {
        let fallback = Duration::from_secs_f64(1.0 / 30.0);
        for reported in [None, Some(0.0), Some(-12.0), Some(f64::NAN), Some(f64::INFINITY)] {
            assert_eq!(effective_interval(reported), fallback, "{reported:?}");
        }
        assert_eq!(fallback.as_millis(), 33);
    }

    #[test]
    fn interval_is_never_zero() {
        assert!(effective_interval(Some(1e15)) > Duration::ZERO);
    }

    #[test]
    fn descriptor_parsing() -> anyhow::Result<()> {
        assert_eq!("0".parse::<FrameSourceDescriptor>()?, FrameSourceDescriptor::Device(0));
        assert_eq!(
            "clip.mp4".parse::<FrameSourceDescriptor>()?,
            FrameSourceDescriptor::File("clip.mp4".to_string())
        );
        assert_eq!(
            " rtsp://10.0.0.5:554/live ".parse::<FrameSourceDescriptor>()?,
            FrameSourceDescriptor::Network("rtsp://10.0.0.5:554/live".to_string())
        );
        assert_eq!(
            "file:stub://clip?frames=3".parse::<FrameSourceDescriptor>()?,
            FrameSourceDescriptor::File("stub://clip?frames=3".to_string())
        );
        assert!("   ".parse::<FrameSourceDescriptor>().is_err());
        Ok(())
    }

    #[test]
    fn descriptor_display_parses_back() -> anyhow::Result<()> {
        for descriptor in [
            FrameSourceDescriptor::Device(2),
            FrameSourceDescriptor::File("videos/fire.mov".to_string()),
            FrameSourceDescriptor::File("stub://clip".to_string()),
            FrameSourceDescriptor::File("42".to_string()),
            FrameSourceDescriptor::File("file:clip.mp4".to_string()),
            FrameSourceDescriptor::File("net:notes.mov".to_string()),
            FrameSourceDescriptor::File(String::new()),
            FrameSourceDescriptor::Network("http://cam.local/stream".to_string()),
        ] {
            let parsed: FrameSourceDescriptor = descriptor.to_string().parse()?;
            assert_eq!(parsed, descriptor);
        }
        Ok(())
    }

    #[test]
    fn catalog_opens_synthetic_file_with_reported_rate() -> anyhow::Result<()> {
        let mut catalog = stub_catalog();
        let descriptor = FrameSourceDescriptor::File("stub://clip?frames=2&fps=25".to_string());
        let mut source = catalog.open_source(&descriptor)?;
        assert_eq!(source.effective_interval(), Duration::from_millis(40));

        assert!(matches!(source.read()?, ReadOutcome::Frame(_)));
        assert!(matches!(source.read()?, ReadOutcome::Frame(_)));
        assert!(matches!(source.read()?, ReadOutcome::EndOfStream));
        Ok(())
    }

    #[test]
    fn catalog_maps_open_failures_per_variant() {
        let mut catalog = SourceCatalog::new(CaptureSettings {
            device_path: "stub://unavailable".to_string(),
            ..CaptureSettings::default()
        });

        let err = catalog
            .open(&FrameSourceDescriptor::Device(0))
            .err()
            .expect("device open must fail");
        assert!(matches!(err, OpenError::DeviceUnavailable { index: 0, .. }));

        let err = catalog
            .open(&FrameSourceDescriptor::File("ftp://host/clip.mp4".to_string()))
            .err()
            .expect("remote file must fail");
        assert!(matches!(err, OpenError::FileUnreadable { .. }));

        let err = catalog
            .open(&FrameSourceDescriptor::Network("stub://unavailable".to_string()))
            .err()
            .expect("network open must fail");
        assert!(matches!(err, OpenError::NetworkUnreachable { .. }));
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn real_files_need_the_decoder_feature() -> anyhow::Result<()> {
        let clip = tempfile::Builder::new().suffix(".mp4").tempfile()?;
        let path = clip.path().display().to_string();
        let err = stub_catalog()
            .open(&FrameSourceDescriptor::File(path))
            .err()
            .expect("file open must fail without ffmpeg");
        assert!(matches!(err, OpenError::Unsupported { .. }), "{err}");
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> anyhow::Result<()> {
        let mut source =
            stub_catalog().open_source(&FrameSourceDescriptor::Device(0))?;
        source.close();
        source.close();
        assert!(source.is_closed());
        assert!(source.read().is_err());
        Ok(())
    }
}
