//! Lesion Classifier
//!
//! Checkpoint-backed inference: reconstructs the network and label table
//! from a [`CheckpointArtifact`], then turns images into label/confidence
//! predictions. The network is absent until a checkpoint is loaded;
//! predicting before that is a [`NexDermError::ModelNotLoaded`] error, never
//! a panic.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checkpoint::CheckpointArtifact;
use crate::config::ModelConfig;
use crate::error::{NexDermError, Result};
use crate::model::{decode_weights, LesionNet};
use crate::preprocess::{decode_image, open_image, Normalization, Transform};

/// One classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Winning class label
    pub label: String,
    /// Probability of the winning class
    pub confidence: f32,
    /// Dense index of the winning class
    pub index: usize,
    /// Full probability distribution, index-aligned with the label table
    pub probabilities: Vec<f32>,
}

/// Image classifier reconstructed from a checkpoint artifact
pub struct Classifier<B: Backend> {
    config: ModelConfig,
    device: B::Device,
    network: Option<LesionNet<B>>,
    label_table: Vec<String>,
    transform: Transform,
}

impl<B: Backend> Classifier<B> {
    /// Create an unloaded classifier; call
    /// [`load_from_checkpoint`](Self::load_from_checkpoint) before predicting.
    pub fn new(config: ModelConfig, device: B::Device) -> Self {
        let transform = Transform::new(config.input_size as u32, Normalization::imagenet());
        Self {
            config,
            device,
            network: None,
            label_table: Vec::new(),
            transform,
        }
    }

    /// Create a classifier and immediately load the given checkpoint
    pub fn from_checkpoint(config: ModelConfig, device: B::Device, path: &Path) -> Result<Self> {
        let mut classifier = Self::new(config, device);
        classifier.load_from_checkpoint(path)?;
        Ok(classifier)
    }

    /// Load (or reload) a checkpoint artifact.
    ///
    /// Rebuilds the network sized to the artifact's class count and adopts
    /// the artifact's label table and normalization statistics. Loading is
    /// all-or-nothing: on any error the previous state is kept.
    pub fn load_from_checkpoint(&mut self, path: &Path) -> Result<()> {
        let artifact = CheckpointArtifact::load(path)?;
        let label_table = artifact.label_table()?;

        let model_config = self.config.clone().with_num_classes(artifact.num_classes());
        let fresh = LesionNet::<B>::new(&model_config, &self.device);
        let normalization = artifact.normalization_or_default();
        let network = decode_weights(fresh, artifact.weights, &self.device).map_err(|e| {
            NexDermError::CorruptArtifact(format!("weights do not fit the network: {e}"))
        })?;

        self.transform = Transform::new(model_config.input_size as u32, normalization);
        self.config = model_config;
        self.label_table = label_table;
        self.network = Some(network);

        info!(
            "Classifier ready: {} classes ({})",
            self.label_table.len(),
            self.label_table.join(", ")
        );
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.network.is_some()
    }

    /// Class labels in index order; empty until a checkpoint is loaded
    pub fn labels(&self) -> &[String] {
        &self.label_table
    }

    /// Classify a decoded image
    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let network = self.network.as_ref().ok_or(NexDermError::ModelNotLoaded)?;

        let data = self.transform.apply(image);
        let size = self.transform.image_size as usize;
        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(data, [1, 3, size, size]),
            &self.device,
        );

        let probabilities: Vec<f32> = network
            .forward_softmax(input)
            .into_data()
            .iter::<f32>()
            .collect();

        let index = argmax(&probabilities);
        Ok(Prediction {
            label: self.label_table[index].clone(),
            confidence: probabilities[index],
            index,
            probabilities,
        })
    }

    /// Classify raw uploaded bytes (e.g. a multipart file body)
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = decode_image(bytes)?;
        self.predict(&image)
    }

    /// Classify an image from a user-supplied path string
    pub fn predict_path(&self, raw_path: &str) -> Result<Prediction> {
        let image = open_image(raw_path)?;
        self.predict(&image)
    }
}

/// Index of the maximum value; ties resolve to the lowest index
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::encode_weights;
    use image::{ImageBuffer, Rgb};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    type TestBackend = burn::backend::NdArray;

    fn small_config() -> ModelConfig {
        ModelConfig {
            num_classes: 2,
            input_size: 32,
            in_channels: 3,
            dropout_rate: 0.2,
            base_filters: 4,
        }
    }

    fn write_checkpoint(dir: &Path, num_classes: usize) -> PathBuf {
        let device = Default::default();
        let config = small_config().with_num_classes(num_classes);
        let model = LesionNet::<TestBackend>::new(&config, &device);
        let weights = encode_weights(model).unwrap();

        let mapping: BTreeMap<String, usize> = (0..num_classes)
            .map(|i| (format!("class_{i}"), i))
            .collect();

        let path = dir.join("model.ckpt");
        CheckpointArtifact::new(weights, mapping).save(&path).unwrap();
        path
    }

    fn solid_image(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(40, 40, Rgb(rgb)))
    }

    #[test]
    fn test_predict_before_load_is_model_not_loaded() {
        let classifier = Classifier::<TestBackend>::new(small_config(), Default::default());
        assert!(!classifier.is_loaded());

        let err = classifier.predict(&solid_image([1, 2, 3])).unwrap_err();
        assert!(matches!(err, NexDermError::ModelNotLoaded));
    }

    #[test]
    fn test_predict_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), 2);

        let classifier =
            Classifier::<TestBackend>::from_checkpoint(small_config(), Default::default(), &path)
                .unwrap();
        assert!(classifier.is_loaded());
        assert_eq!(classifier.labels(), ["class_0", "class_1"]);

        let prediction = classifier.predict(&solid_image([90, 120, 60])).unwrap();
        assert!(classifier.labels().contains(&prediction.label));
        assert_eq!(prediction.probabilities.len(), 2);

        let sum: f32 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        // Confidence is the max of the distribution
        let max = prediction
            .probabilities
            .iter()
            .cloned()
            .fold(f32::MIN, f32::max);
        assert_eq!(prediction.confidence, max);
        assert_eq!(prediction.probabilities[prediction.index], max);
    }

    #[test]
    fn test_label_table_sized_from_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), 5);

        // Config says 2 classes, the artifact says 5; artifact wins
        let classifier =
            Classifier::<TestBackend>::from_checkpoint(small_config(), Default::default(), &path)
                .unwrap();
        assert_eq!(classifier.labels().len(), 5);

        let prediction = classifier.predict(&solid_image([10, 10, 10])).unwrap();
        assert_eq!(prediction.probabilities.len(), 5);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), 2);

        let mut classifier =
            Classifier::<TestBackend>::from_checkpoint(small_config(), Default::default(), &path)
                .unwrap();
        let img = solid_image([200, 40, 80]);
        let first = classifier.predict(&img).unwrap();

        classifier.load_from_checkpoint(&path).unwrap();
        let second = classifier.predict(&img).unwrap();

        assert_eq!(first.probabilities, second.probabilities);
        assert_eq!(first.label, second.label);
    }

    #[test]
    fn test_failed_reload_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), 2);

        let mut classifier =
            Classifier::<TestBackend>::from_checkpoint(small_config(), Default::default(), &path)
                .unwrap();

        let err = classifier
            .load_from_checkpoint(Path::new("/no/such/model.ckpt"))
            .unwrap_err();
        assert!(matches!(err, NexDermError::ArtifactNotFound(_)));
        assert!(classifier.is_loaded());
        assert!(classifier.predict(&solid_image([5, 5, 5])).is_ok());
    }

    #[test]
    fn test_predict_bytes_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), 2);

        let classifier =
            Classifier::<TestBackend>::from_checkpoint(small_config(), Default::default(), &path)
                .unwrap();
        let err = classifier.predict_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, NexDermError::UnsupportedImage(_)));
    }

    #[test]
    fn test_argmax_tie_breaks_low() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), 1);
        assert_eq!(argmax(&[0.0, 0.0, 1.0]), 2);
        assert_eq!(argmax(&[1.0]), 0);
    }
}
