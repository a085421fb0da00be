//! Local file frame source.
//!
//! This module provides `FileSource` for `File(path)` descriptors.
//! The file source is responsible for:
//! - Reading frames from a local video file (no network access)
//! - Decoding video frames in-memory to RGB
//! - Reporting the container's average frame rate
//! - Signalling end-of-stream after the last frame
//!
//! The file source MUST NOT fetch remote URLs; network streams go through
//! `NetworkSource`.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::SyntheticSource;
use super::{read_error, FrameSource, ReadOutcome};
use crate::error::ReadError;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/home/me/videos/fire.mp4").
    pub path: String,
    /// Frame width for synthetic files.
    pub width: u32,
    /// Frame height for synthetic files.
    pub height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            width: 640,
            height: 480,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            let synthetic = SyntheticSource::new(&config.path, config.width, config.height)?;
            return Ok(Self {
                config,
                backend: FileBackend::Synthetic(synthetic),
            });
        }
        if !Path::new(&config.path).is_file() {
            return Err(anyhow!("no such file"));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let decoder = FfmpegFileSource::new(&config)?;
            Ok(Self {
                config,
                backend: FileBackend::Ffmpeg(decoder),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow::Error::new(super::MissingBackend("ingest-file-ffmpeg"))
                .context("decode local video file"))
        }
    }

    /// Prepare the decoder.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        let frames_captured = match &self.backend {
            FileBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
        };
        FileStats {
            frames_captured,
            path: self.config.path.clone(),
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.config.path)
    }

    fn read(&mut self) -> Result<ReadOutcome, ReadError> {
        let next = match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        };
        match next {
            Ok(Some(frame)) => Ok(ReadOutcome::Frame(frame)),
            Ok(None) => Ok(ReadOutcome::EndOfStream),
            Err(err) => Err(read_error(self.describe(), err)),
        }
    }

    fn reported_fps(&self) -> Option<f64> {
        match &self.backend {
            FileBackend::Synthetic(source) => source.reported_fps(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.reported_fps(),
        }
    }

    fn close(&mut self) {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.close(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(path: &str) -> FileConfig {
        FileConfig {
            path: path.to_string(),
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn rejects_remote_and_empty_paths() {
        assert!(FileSource::new(stub_config("rtsp://cam/clip.mp4")).is_err());
        assert!(FileSource::new(stub_config("   ")).is_err());
    }

    #[test]
    fn rejects_missing_files() {
        let err = FileSource::new(stub_config("/no/such/dir/clip.mp4"))
            .err()
            .expect("missing file must fail");
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn synthetic_file_counts_frames_then_ends() -> Result<()> {
        let mut source = FileSource::new(stub_config("stub://clip?frames=3&fps=24"))?;
        source.connect()?;
        assert_eq!(source.reported_fps(), Some(24.0));

        let mut frames = 0;
        while let ReadOutcome::Frame(_) = source.read()? {
            frames += 1;
        }
        assert_eq!(frames, 3);
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }
}
