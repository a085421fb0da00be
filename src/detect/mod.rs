//! Detector adapter.
//!
//! A detector maps one frame to an ordered list of boxes. The pump treats it
//! as an opaque, possibly slow call and holds a single shared backend so two
//! calls never overlap.

mod backend;
mod backends;
mod registry;
mod result;
pub mod yolo;

use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub use backend::{DetectorBackend, SharedDetector};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{CpuBackend, StubBackend};
pub use registry::BackendRegistry;
pub use result::BoundingBox;

/// Resolved detector configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    /// Backend name: `stub`, `cpu` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Class names in model output order.
    pub labels: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            model_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            labels: vec!["Fire".to_string()],
        }
    }
}

/// Build a registry with every backend this build can offer and make the
/// configured one the default.
///
/// The model-backed `tract` backend is only loaded when it is the one asked for.
pub fn build_registry(settings: &DetectorSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    let label = settings
        .labels
        .first()
        .cloned()
        .unwrap_or_else(|| "Fire".to_string());

    if settings.backend == "tract" {
        registry.register(load_tract(settings)?);
    }
    registry.register(CpuBackend::new().with_label(label));
    registry.register(StubBackend::new());

    registry.set_default(&settings.backend)?;
    if let Some(backend) = registry.default_backend() {
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.warm_up()?;
        log::info!("detector: using backend {}", guard.name());
    }
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn load_tract(settings: &DetectorSettings) -> Result<TractBackend> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("detector backend 'tract' needs a model_path"))?;
    Ok(TractBackend::new(model_path, settings.input_size)?
        .with_thresholds(settings.confidence_threshold, settings.iou_threshold)
        .with_labels(settings.labels.clone()))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_settings: &DetectorSettings) -> Result<StubBackend> {
    Err(anyhow!(
        "detector backend 'tract' is not compiled in (enable feature backend-tract)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn registry_defaults_to_configured_backend() -> Result<()> {
        let settings = DetectorSettings {
            backend: "stub".to_string(),
            ..DetectorSettings::default()
        };
        let registry = build_registry(&settings)?;
        assert_eq!(registry.default_name(), Some("stub"));
        assert_eq!(registry.list(), vec!["cpu", "stub"]);

        let frame = Frame::filled(16, 16, [255, 140, 20]);
        assert!(registry.detect_with_default(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn cpu_backend_uses_first_label() -> Result<()> {
        let settings = DetectorSettings {
            labels: vec!["Flame".to_string(), "Smoke".to_string()],
            ..DetectorSettings::default()
        };
        let registry = build_registry(&settings)?;
        let frame = Frame::filled(16, 16, [255, 140, 20]);
        let boxes = registry.detect_with_default(&frame)?;
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "Flame");
        Ok(())
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let settings = DetectorSettings {
            backend: "yolo-gpu".to_string(),
            ..DetectorSettings::default()
        };
        assert!(build_registry(&settings).is_err());
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_requires_the_feature() {
        let settings = DetectorSettings {
            backend: "tract".to_string(),
            model_path: Some(PathBuf::from("fire.onnx")),
            ..DetectorSettings::default()
        };
        let err = build_registry(&settings).err().map(|e| e.to_string());
        assert!(err.unwrap_or_default().contains("backend-tract"));
    }
}
