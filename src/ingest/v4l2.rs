//! V4L2 capture backend.
//!
//! Opens a local device node, asks for packed RGB, and falls back to whatever
//! format the driver insists on (YUYV or NV12 are converted in `normalize`).

use anyhow::{bail, Context, Result};
use ouroboros::self_referencing;

use super::device::DeviceConfig;
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::Frame;

/// errno for "no such device": the camera was unplugged.
const ENODEV: i32 = 19;

pub(crate) struct V4l2Device {
    path: String,
    width: u32,
    height: u32,
    state: Option<V4l2State>,
    format: PixelFormat,
    fps: Option<f64>,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub(crate) fn new(config: &DeviceConfig) -> Self {
        Self {
            path: config.path.clone(),
            width: config.width,
            height: config.height,
            state: None,
            format: PixelFormat::Rgb24,
            fps: None,
            frame_count: 0,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.path)
            .with_context(|| format!("open v4l2 device {}", self.path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.width;
        format.height = self.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("v4l2: failed to set RGB format on {}: {}", self.path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = pixel_format(&format.fourcc.repr)
            .with_context(|| format!("{} delivers unsupported format {}", self.path, format.fourcc))?;
        self.width = format.width;
        self.height = format.height;

        self.fps = device.params().ok().and_then(|params| {
            let interval = params.interval;
            (interval.numerator > 0)
                .then(|| interval.denominator as f64 / interval.numerator as f64)
        });

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "v4l2: connected to {} ({}x{} {:?}, fps {:?})",
            self.path,
            self.width,
            self.height,
            self.format,
            self.fps
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let captured = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map(|(buf, _meta)| buf.to_vec())
        });
        let raw = match captured {
            Ok(raw) => raw,
            Err(err) if err.raw_os_error() == Some(ENODEV) => {
                log::info!("v4l2: {} disconnected", self.path);
                return Ok(None);
            }
            Err(err) => return Err(anyhow::Error::new(err).context("capture v4l2 frame")),
        };

        let rgb = normalize_to_rgb(&raw, self.width, self.height, self.format)?;
        self.frame_count += 1;
        Ok(Some(
            Frame::from_rgb(rgb, self.width, self.height)?.with_sequence(self.frame_count),
        ))
    }

    pub(crate) fn reported_fps(&self) -> Option<f64> {
        self.fps
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn close(&mut self) {
        // Dropping the stream unmaps buffers before the device fd closes.
        self.state = None;
    }
}

fn pixel_format(fourcc: &[u8; 4]) -> Result<PixelFormat> {
    match fourcc {
        b"RGB3" => Ok(PixelFormat::Rgb24),
        b"YUYV" => Ok(PixelFormat::Yuyv),
        b"NV12" => Ok(PixelFormat::Nv12),
        other => bail!("fourcc {:?}", String::from_utf8_lossy(other)),
    }
}
