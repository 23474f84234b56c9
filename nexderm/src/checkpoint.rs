//! Checkpoint Artifact
//!
//! The one hard contract between training and inference: a single
//! MessagePack bundle holding the trained weights, the label↔index mapping,
//! the normalization statistics the model was trained with, and the
//! per-epoch training history. Written once by the trainer, immutable on
//! disk, read-only for the classifier.
//!
//! Weights are a burn module record serialized with
//! `BinBytesRecorder<FullPrecisionSettings>`, so the bundle is independent
//! of the backend that produced it. The schema is versioned explicitly;
//! a version mismatch fails loudly instead of silently mis-loading.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{NexDermError, Result};
use crate::preprocess::Normalization;

/// Current checkpoint schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Per-epoch training metrics, appended to the artifact as training runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number (1-indexed)
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
}

/// Serialized training output: weights plus everything inference needs to
/// reconstruct a matching classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointArtifact {
    /// Schema version; must match [`CHECKPOINT_SCHEMA_VERSION`]
    pub schema_version: u32,

    /// Creation time, informational only
    pub created_at: DateTime<Utc>,

    /// Label → dense index mapping; must invert to a gap-free table
    pub class_to_index: BTreeMap<String, usize>,

    /// Per-channel mean/std; ImageNet statistics when absent
    pub normalization: Option<Normalization>,

    /// Append-only per-epoch metrics, for later inspection
    #[serde(default)]
    pub training_history: Vec<EpochMetrics>,

    /// Opaque serialized parameter record for every layer of the network
    pub weights: Vec<u8>,
}

impl CheckpointArtifact {
    pub fn new(weights: Vec<u8>, class_to_index: BTreeMap<String, usize>) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            created_at: Utc::now(),
            class_to_index,
            normalization: Some(Normalization::imagenet()),
            training_history: Vec::new(),
            weights,
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }

    pub fn with_history(mut self, history: Vec<EpochMetrics>) -> Self {
        self.training_history = history;
        self
    }

    /// Number of classes in the mapping
    pub fn num_classes(&self) -> usize {
        self.class_to_index.len()
    }

    /// Normalization statistics, falling back to ImageNet defaults
    pub fn normalization_or_default(&self) -> Normalization {
        self.normalization.unwrap_or_default()
    }

    /// Invert `class_to_index` into an index-ordered label table.
    ///
    /// The mapping must cover exactly `[0, num_classes)` with no gaps or
    /// duplicates; any other shape is a corrupt artifact.
    pub fn label_table(&self) -> Result<Vec<String>> {
        let num_classes = self.class_to_index.len();
        if num_classes == 0 {
            return Err(NexDermError::CorruptArtifact(
                "class_to_index is empty".to_string(),
            ));
        }

        let mut table: Vec<Option<&String>> = vec![None; num_classes];
        for (label, &index) in &self.class_to_index {
            if index >= num_classes {
                return Err(NexDermError::CorruptArtifact(format!(
                    "class index {} out of range for {} classes",
                    index, num_classes
                )));
            }
            if table[index].is_some() {
                return Err(NexDermError::CorruptArtifact(format!(
                    "duplicate class index {}",
                    index
                )));
            }
            table[index] = Some(label);
        }

        // Full coverage of [0, num_classes) is implied by len + uniqueness,
        // but check anyway so a gap produces a precise message.
        table
            .into_iter()
            .enumerate()
            .map(|(index, label)| {
                label.cloned().ok_or_else(|| {
                    NexDermError::CorruptArtifact(format!("gap at class index {}", index))
                })
            })
            .collect()
    }

    /// Check structural invariants: schema version, weights, class mapping
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(NexDermError::CorruptArtifact(format!(
                "unsupported schema version {} (expected {})",
                self.schema_version, CHECKPOINT_SCHEMA_VERSION
            )));
        }
        if self.weights.is_empty() {
            return Err(NexDermError::CorruptArtifact(
                "weights payload is empty".to_string(),
            ));
        }
        self.label_table().map(|_| ())
    }

    /// Write the artifact to disk, creating parent directories as needed.
    ///
    /// Failures are reported as [`NexDermError::CheckpointWrite`] so the
    /// trainer can log and continue.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write = || -> std::result::Result<(), String> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            let bytes = rmp_serde::to_vec_named(self).map_err(|e| e.to_string())?;
            std::fs::write(path, bytes).map_err(|e| e.to_string())
        };

        write().map_err(|reason| NexDermError::CheckpointWrite {
            path: path.to_path_buf(),
            reason,
        })?;

        info!(
            "Checkpoint saved to {:?} ({} classes, {} epochs of history)",
            path,
            self.num_classes(),
            self.training_history.len()
        );
        Ok(())
    }

    /// Read and validate an artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NexDermError::ArtifactNotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path)?;
        let artifact: CheckpointArtifact = rmp_serde::from_slice(&bytes)
            .map_err(|e| NexDermError::CorruptArtifact(e.to_string()))?;
        artifact.validate()?;

        info!(
            "Checkpoint loaded from {:?} ({} classes)",
            path,
            artifact.num_classes()
        );
        Ok(artifact)
    }
}
