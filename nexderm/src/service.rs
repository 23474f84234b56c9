//! Inference Service
//!
//! Lazily initialized, shared classifier for serving predictions. The
//! checkpoint is loaded at most once, on the first request that needs it;
//! callers before that pay the load cost, callers after it share the same
//! classifier. A failed load is not cached, so a checkpoint that appears
//! on disk later is picked up by the next request.

use image::DynamicImage;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::backend::{default_device, DefaultBackend};
use crate::classifier::{Classifier, Prediction};
use crate::config::InferenceConfig;
use crate::error::Result;

/// Process-wide classifier wrapper with lazy, load-once initialization
pub struct InferenceService {
    config: InferenceConfig,
    classifier: OnceCell<Classifier<DefaultBackend>>,
}

impl InferenceService {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            classifier: OnceCell::new(),
        }
    }

    /// The loaded classifier, loading the checkpoint on first use
    fn classifier(&self) -> Result<&Classifier<DefaultBackend>> {
        self.classifier.get_or_try_init(|| {
            info!(
                "Loading checkpoint {:?} on first use",
                self.config.checkpoint_path
            );
            Classifier::from_checkpoint(
                self.config.model.clone(),
                default_device(),
                &self.config.checkpoint_path,
            )
        })
    }

    /// Force the checkpoint load now instead of on the first prediction
    pub fn warm_up(&self) -> Result<()> {
        self.classifier().map(|_| ())
    }

    /// Has the checkpoint been loaded yet?
    pub fn is_loaded(&self) -> bool {
        self.classifier.get().is_some()
    }

    /// Class labels in index order
    pub fn labels(&self) -> Result<Vec<String>> {
        Ok(self.classifier()?.labels().to_vec())
    }

    /// Classify a decoded image
    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        self.classifier()?.predict(image)
    }

    /// Classify raw uploaded bytes
    pub fn predict_from_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        self.classifier()?.predict_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointArtifact;
    use crate::config::ModelConfig;
    use crate::error::NexDermError;
    use crate::model::{encode_weights, LesionNet};
    use image::{ImageBuffer, Rgb};
    use std::collections::BTreeMap;
    use std::path::Path;

    fn small_config() -> ModelConfig {
        ModelConfig {
            num_classes: 2,
            input_size: 32,
            in_channels: 3,
            dropout_rate: 0.2,
            base_filters: 4,
        }
    }

    fn write_checkpoint(path: &Path) {
        let device = default_device();
        let model = LesionNet::<DefaultBackend>::new(&small_config(), &device);
        let weights = encode_weights(model).unwrap();

        let mut mapping = BTreeMap::new();
        mapping.insert("benign".to_string(), 0);
        mapping.insert("malignant".to_string(), 1);

        CheckpointArtifact::new(weights, mapping).save(path).unwrap();
    }

    fn solid_image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(40, 40, Rgb([120, 80, 40])))
    }

    #[test]
    fn test_loads_lazily_on_first_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        write_checkpoint(&path);

        let config = InferenceConfig::new(&path).with_model(small_config());
        let service = InferenceService::new(config);
        assert!(!service.is_loaded());

        let prediction = service.predict(&solid_image()).unwrap();
        assert!(service.is_loaded());
        assert!(["benign", "malignant"].contains(&prediction.label.as_str()));

        // Same classifier serves repeated requests identically
        let again = service.predict(&solid_image()).unwrap();
        assert_eq!(prediction.probabilities, again.probabilities);
    }

    #[test]
    fn test_warm_up_loads_eagerly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        write_checkpoint(&path);

        let service =
            InferenceService::new(InferenceConfig::new(&path).with_model(small_config()));
        service.warm_up().unwrap();
        assert!(service.is_loaded());
        assert_eq!(service.labels().unwrap(), ["benign", "malignant"]);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");

        let service =
            InferenceService::new(InferenceConfig::new(&path).with_model(small_config()));

        let err = service.predict(&solid_image()).unwrap_err();
        assert!(matches!(err, NexDermError::ArtifactNotFound(_)));
        assert!(!service.is_loaded());

        // Checkpoint appears later; the next request succeeds
        write_checkpoint(&path);
        assert!(service.predict(&solid_image()).is_ok());
    }
}
