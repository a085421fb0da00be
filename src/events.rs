//! Source-selection events raised by the UI.
//!
//! UI callbacks never touch the capture handle. Each button or dialog produces
//! a `UiEvent`, which is checked here and turned into a pump command.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ingest::FrameSourceDescriptor;

/// Something the user did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    /// "Use local camera": the first capture device.
    UseCamera,
    /// "Upload video": a file chosen in a picker.
    UploadVideo(PathBuf),
    /// "Enter network address": free text from an input dialog.
    EnterAddress(String),
    /// "Reset": stop and clear the display.
    Reset,
}

/// What the pump should do about an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceCommand {
    Select(FrameSourceDescriptor),
    Reset,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("{} is not a supported video file (expected one of: {allowed})", path.display())]
    UnsupportedExtension { path: PathBuf, allowed: String },
    #[error("{} is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),
}

/// Container extensions accepted by the upload picker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPolicy {
    extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Case-insensitive extension check.
    pub fn allows(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(["mp4", "avi", "mov"])
    }
}

impl UiEvent {
    /// Resolve the event into a pump command.
    ///
    /// An empty network address is a cancelled dialog and yields `None`.
    pub fn into_command(self, uploads: &UploadPolicy) -> Result<Option<SourceCommand>, EventError> {
        match self {
            UiEvent::UseCamera => Ok(Some(SourceCommand::Select(FrameSourceDescriptor::Device(0)))),
            UiEvent::UploadVideo(path) => {
                if !uploads.allows(&path) {
                    return Err(EventError::UnsupportedExtension {
                        path,
                        allowed: uploads.extensions().join(", "),
                    });
                }
                let path_str = path
                    .to_str()
                    .ok_or_else(|| EventError::NonUtf8Path(path.clone()))?
                    .to_string();
                Ok(Some(SourceCommand::Select(FrameSourceDescriptor::File(path_str))))
            }
            UiEvent::EnterAddress(address) => {
                let address = address.trim();
                if address.is_empty() {
                    return Ok(None);
                }
                Ok(Some(SourceCommand::Select(FrameSourceDescriptor::Network(
                    address.to_string(),
                ))))
            }
            UiEvent::Reset => Ok(Some(SourceCommand::Reset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_and_reset_map_directly() -> Result<(), EventError> {
        let uploads = UploadPolicy::default();
        assert_eq!(
            UiEvent::UseCamera.into_command(&uploads)?,
            Some(SourceCommand::Select(FrameSourceDescriptor::Device(0)))
        );
        assert_eq!(UiEvent::Reset.into_command(&uploads)?, Some(SourceCommand::Reset));
        Ok(())
    }

    #[test]
    fn upload_checks_extension_case_insensitively() -> Result<(), EventError> {
        let uploads = UploadPolicy::default();
        assert_eq!(
            UiEvent::UploadVideo(PathBuf::from("/videos/Fire.MOV")).into_command(&uploads)?,
            Some(SourceCommand::Select(FrameSourceDescriptor::File(
                "/videos/Fire.MOV".to_string()
            )))
        );

        let rejected = UiEvent::UploadVideo(PathBuf::from("/videos/notes.txt"))
            .into_command(&uploads)
            .err();
        assert!(matches!(
            rejected,
            Some(EventError::UnsupportedExtension { ref allowed, .. }) if allowed == "mp4, avi, mov"
        ));
        assert!(UiEvent::UploadVideo(PathBuf::from("/videos/no_extension"))
            .into_command(&uploads)
            .is_err());
        Ok(())
    }

    #[test]
    fn address_is_trimmed_and_empty_is_ignored() -> Result<(), EventError> {
        let uploads = UploadPolicy::default();
        assert_eq!(
            UiEvent::EnterAddress("  rtsp://10.0.0.5/live \n".to_string()).into_command(&uploads)?,
            Some(SourceCommand::Select(FrameSourceDescriptor::Network(
                "rtsp://10.0.0.5/live".to_string()
            )))
        );
        assert_eq!(UiEvent::EnterAddress("   ".to_string()).into_command(&uploads)?, None);
        Ok(())
    }

    #[test]
    fn policy_normalizes_configured_extensions() {
        let uploads = UploadPolicy::new([".MKV", " webm ", ""]);
        assert_eq!(uploads.extensions(), ["mkv", "webm"]);
        assert!(uploads.allows(Path::new("clip.mkv")));
        assert!(!uploads.allows(Path::new("clip.mp4")));
    }
}
