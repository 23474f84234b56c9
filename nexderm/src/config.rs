//! Configuration Module
//!
//! Typed configuration for the network architecture, training runs, and the
//! inference service. All defaults are declared here, once; components
//! receive these structs as plain values and never read global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NexDermError, Result};

/// Configuration for the LesionNet architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Input image size (width and height, assumed square)
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    pub in_channels: usize,

    /// Dropout rate for the classifier head
    pub dropout_rate: f64,

    /// Base number of convolutional filters (doubled per block)
    pub base_filters: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::binary()
    }
}

impl ModelConfig {
    /// Binary disease / no-disease preset (the general screening model)
    pub fn binary() -> Self {
        Self {
            num_classes: 2,
            input_size: 384,
            in_channels: 3,
            dropout_rate: 0.2,
            base_filters: 32,
        }
    }

    /// Multi-class preset keyed by a dynamic class list recovered from a
    /// checkpoint. The class count is the only degree of freedom; the rest
    /// matches the training setup for the per-condition model.
    pub fn multi_class(num_classes: usize) -> Self {
        Self {
            num_classes,
            input_size: 224,
            in_channels: 3,
            dropout_rate: 0.3,
            base_filters: 32,
        }
    }

    /// Same architecture resized for a different class count
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(NexDermError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }
        if self.input_size < 32 {
            return Err(NexDermError::Config(
                "input_size must be at least 32".to_string(),
            ));
        }
        if self.in_channels != 3 {
            return Err(NexDermError::Config(
                "in_channels must be 3 (RGB)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(NexDermError::Config(
                "dropout_rate must be in range [0.0, 1.0)".to_string(),
            ));
        }
        if self.base_filters == 0 {
            return Err(NexDermError::Config(
                "base_filters must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training and validation
    pub batch_size: usize,

    /// Initial learning rate (decays to zero on a cosine schedule)
    pub learning_rate: f64,

    /// Fraction of the dataset held out for validation
    pub validation_fraction: f64,

    /// Maximum images collected per class (None = unlimited)
    pub max_per_class: Option<usize>,

    /// Apply random augmentation to the training split
    pub augment: bool,

    /// Random seed for shuffling and augmentation
    pub seed: u64,

    /// Directory where "best" and "last" checkpoints are written
    pub checkpoint_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-4,
            validation_fraction: 0.2,
            max_per_class: None,
            augment: true,
            seed: 42,
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

impl TrainingConfig {
    /// Fast config for smoke tests and debugging
    pub fn debug() -> Self {
        Self {
            epochs: 2,
            batch_size: 4,
            augment: false,
            checkpoint_dir: PathBuf::from("checkpoints/debug"),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(NexDermError::Config(
                "epochs must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(NexDermError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(NexDermError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(NexDermError::Config(
                "validation_fraction must be in range [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| NexDermError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| NexDermError::Config(e.to_string()))
    }
}

/// Configuration consumed by the inference service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Path to the checkpoint artifact to serve
    pub checkpoint_path: PathBuf,

    /// Architecture the checkpoint was trained with
    pub model: ModelConfig,
}

impl InferenceConfig {
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            model: ModelConfig::binary(),
        }
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }
}
