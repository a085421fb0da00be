//! Synthetic `stub://` sources for tests and demos.
//!
//! Query parameters shape the stream:
//! - `frames=N`: end of stream after N frames (unbounded when absent)
//! - `fps=R`: reported native rate (absent or 0 means "not reported")
//! - `fail_after=K`: fail the read after K frames (simulated disconnect error)
//!
//! The host `unavailable` refuses to connect.
//!
//! Frames show a dark gradient with a fire-coloured blob drifting across it so
//! the CPU detector has something to find.

use anyhow::{anyhow, bail, Context, Result};
use url::Url;

use crate::frame::Frame;

const BLOB_RADIUS: i64 = 24;
const BLOB_STEP: u64 = 8;
const FIRE_RGB: [u8; 3] = [255, 140, 20];

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StubSpec {
    pub name: String,
    pub frames: Option<u64>,
    pub fps: Option<f64>,
    pub fail_after: Option<u64>,
}

impl StubSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("parse stub url '{raw}'"))?;
        if url.scheme() != "stub" {
            bail!("'{}' is not a stub:// url", raw);
        }
        let mut spec = Self {
            name: url.host_str().unwrap_or_default().to_string(),
            frames: None,
            fps: None,
            fail_after: None,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => spec.frames = Some(parse_param(&key, &value)?),
                "fps" => spec.fps = Some(parse_param(&key, &value)?),
                "fail_after" => spec.fail_after = Some(parse_param(&key, &value)?),
                other => log::warn!("stub source '{}': ignoring parameter '{}'", raw, other),
            }
        }
        Ok(spec)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter {}={} is not a number", key, value))
}

pub(crate) struct SyntheticSource {
    spec: StubSpec,
    origin: String,
    width: u32,
    height: u32,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(origin: &str, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("synthetic frame size must be non-zero");
        }
        Ok(Self {
            spec: StubSpec::parse(origin)?,
            origin: origin.to_string(),
            width,
            height,
            frame_count: 0,
            connected: false,
        })
    }

    /// Synthetic sources are always reachable, except `stub://unavailable`.
    pub fn connect(&mut self) -> Result<()> {
        if self.spec.name == "unavailable" {
            bail!("synthetic source '{}' is unavailable", self.origin);
        }
        self.connected = true;
        log::info!("synthetic source {} connected", self.origin);
        Ok(())
    }

    /// Next frame, or `None` once the configured frame budget is spent.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            bail!("synthetic source '{}' is not connected", self.origin);
        }
        if let Some(limit) = self.spec.fail_after {
            if self.frame_count >= limit {
                bail!("synthetic stream '{}' dropped the connection", self.origin);
            }
        }
        if let Some(limit) = self.spec.frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }

        self.frame_count += 1;
        let frame = Frame::from_rgb(self.render(), self.width, self.height)?
            .with_sequence(self.frame_count);
        Ok(Some(frame))
    }

    pub fn reported_fps(&self) -> Option<f64> {
        self.spec.fps
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn close(&mut self) {
        self.connected = false;
    }

    fn render(&self) -> Vec<u8> {
        let w = self.width as i64;
        let h = self.height as i64;
        let cx = ((self.frame_count * BLOB_STEP) % self.width as u64) as i64;
        let cy = h / 2;

        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            let shade = (20 + (y * 40) / h.max(1)) as u8;
            for x in 0..w {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy <= BLOB_RADIUS * BLOB_RADIUS {
                    pixels.extend_from_slice(&FIRE_RGB);
                } else {
                    pixels.extend_from_slice(&[shade, shade, shade.saturating_add(10)]);
                }
            }
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() -> Result<()> {
        let spec = StubSpec::parse("stub://clip?frames=10&fps=25")?;
        assert_eq!(spec.name, "clip");
        assert_eq!(spec.frames, Some(10));
        assert_eq!(spec.fps, Some(25.0));
        assert_eq!(spec.fail_after, None);
        Ok(())
    }

    #[test]
    fn rejects_non_numeric_parameters() {
        assert!(StubSpec::parse("stub://clip?frames=ten").is_err());
        assert!(StubSpec::parse("rtsp://clip").is_err());
    }

    #[test]
    fn bounded_stream_ends() -> Result<()> {
        let mut source = SyntheticSource::new("stub://clip?frames=2", 16, 8)?;
        source.connect()?;
        assert_eq!(source.next_frame()?.map(|f| f.sequence()), Some(1));
        assert_eq!(source.next_frame()?.map(|f| f.sequence()), Some(2));
        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn fail_after_raises_read_error() -> Result<()> {
        let mut source = SyntheticSource::new("stub://cam?fail_after=1", 16, 8)?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn unavailable_host_refuses_connect() -> Result<()> {
        let mut source = SyntheticSource::new("stub://unavailable", 16, 8)?;
        assert!(source.connect().is_err());
        Ok(())
    }

    #[test]
    fn frames_contain_fire_coloured_blob() -> Result<()> {
        let mut source = SyntheticSource::new("stub://cam", 64, 48)?;
        source.connect()?;
        let frame = source.next_frame()?.context("frame")?;
        // First frame: blob centred at x = 8, y = 24.
        assert_eq!(frame.pixel(8, 24), Some(FIRE_RGB));
        assert_ne!(frame.pixel(60, 2), Some(FIRE_RGB));
        Ok(())
    }

    #[test]
    fn reads_before_connect_fail() -> Result<()> {
        let mut source = SyntheticSource::new("stub://cam", 16, 8)?;
        assert!(source.next_frame().is_err());
        Ok(())
    }
}
