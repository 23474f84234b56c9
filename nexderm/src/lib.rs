//! # NexDerm
//!
//! A Rust library for skin lesion image classification using the Burn
//! framework. Covers the full loop: dataset discovery, deterministic
//! preprocessing with training-time augmentation, a CNN classifier,
//! supervised training with checkpointing, and a lazily initialized
//! inference service for server deployments.
//!
//! ## Modules
//!
//! - `dataset`: On-disk dataset discovery, train/validation splitting, batching
//! - `preprocess`: Resize/normalize pipeline and randomized augmentation
//! - `model`: CNN architecture built with Burn
//! - `trainer`: Supervised training loop with best/last checkpointing
//! - `checkpoint`: The serialized artifact shared by training and inference
//! - `classifier`: Checkpoint-backed single-image prediction
//! - `service`: Load-once inference wrapper for serving
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nexderm::classifier::Classifier;
//! use nexderm::config::ModelConfig;
//!
//! let classifier = Classifier::from_checkpoint(
//!     ModelConfig::binary(),
//!     Default::default(),
//!     Path::new("checkpoints/best.ckpt"),
//! )?;
//! let prediction = classifier.predict_path("lesion.jpg")?;
//! println!("{}: {:.1}%", prediction.label, prediction.confidence * 100.0);
//! ```

pub mod backend;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod model;
pub mod preprocess;
pub mod service;
pub mod trainer;

// Re-export commonly used items for convenience
pub use backend::{default_device, DefaultBackend, TrainingBackend};
pub use checkpoint::{CheckpointArtifact, EpochMetrics};
pub use classifier::{Classifier, Prediction};
pub use config::{InferenceConfig, ModelConfig, TrainingConfig};
pub use dataset::{LesionBatch, LesionBatcher, LesionItem, LesionSample, SkinLesionDataset};
pub use error::{NexDermError, Result};
pub use model::LesionNet;
pub use preprocess::{Augmenter, Normalization, Transform};
pub use service::InferenceService;
pub use trainer::{Trainer, TrainingOutcome};

/// Default class labels for the binary screening model
pub const BINARY_CLASSES: [&str; 2] = ["no_disease", "disease"];

/// Default input image size for the binary screening model
pub const IMAGE_SIZE: usize = 384;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
