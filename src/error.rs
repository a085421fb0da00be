//! Pipeline error taxonomy.
//!
//! Backends work with `anyhow` internally. At the pump boundary their failures
//! are flattened into these typed values so the UI can show a cause and the
//! state machine can keep the failure inside `PipelineState::Failed`.

use thiserror::Error;

/// Failure to acquire a device, file, or stream handle.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OpenError {
    #[error("video device {index} unavailable: {cause}")]
    DeviceUnavailable { index: u32, cause: String },
    #[error("cannot open video file {path}: {cause}")]
    FileUnreadable { path: String, cause: String },
    #[error("cannot reach stream {url}: {cause}")]
    NetworkUnreachable { url: String, cause: String },
    #[error("{descriptor} cannot be opened in this build: {cause}")]
    Unsupported { descriptor: String, cause: String },
}

/// Failure while pulling frames from an already open source.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("read from {origin} failed: {cause}")]
    Io { origin: String, cause: String },
    #[error("{origin} produced no frame within {timeout_ms} ms")]
    Stalled { origin: String, timeout_ms: u64 },
    #[error("could not decode frame from {origin}: {cause}")]
    Decode { origin: String, cause: String },
}

/// What the UI collaborator sees when the pipeline enters `Failed`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Render an `anyhow` chain on one line for error causes.
pub(crate) fn cause(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
