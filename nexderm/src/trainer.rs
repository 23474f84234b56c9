//! Supervised Trainer
//!
//! Runs the epoch loop: seeded shuffling, manual batching, cross-entropy
//! loss, Adam updates on a cosine-decayed learning rate, and per-epoch
//! validation on the inner (non-autodiff) backend. Writes a "best"
//! checkpoint whenever validation accuracy strictly improves and a "last"
//! checkpoint after the final epoch.
//!
//! Checkpoint write failures are logged and swallowed: a full disk must not
//! throw away the remaining epochs of an otherwise healthy run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointArtifact, EpochMetrics};
use crate::config::{ModelConfig, TrainingConfig};
use crate::dataset::{LesionBatcher, LesionItem};
use crate::error::{NexDermError, Result};
use crate::model::{encode_weights, LesionNet};
use crate::preprocess::Normalization;

/// Filename of the checkpoint tracking the best validation accuracy
pub const BEST_CHECKPOINT: &str = "best.ckpt";
/// Filename of the checkpoint written after the final epoch
pub const LAST_CHECKPOINT: &str = "last.ckpt";

/// Everything a finished training run produces
#[derive(Debug)]
pub struct TrainingOutcome<B: AutodiffBackend> {
    /// The trained network, in its final-epoch state
    pub model: LesionNet<B>,
    /// Per-epoch metrics, one entry per completed epoch
    pub history: Vec<EpochMetrics>,
    /// Highest validation accuracy observed
    pub best_val_accuracy: f64,
    pub best_checkpoint: PathBuf,
    pub last_checkpoint: PathBuf,
}

/// Supervised trainer for the lesion classifier
pub struct Trainer<B: AutodiffBackend> {
    model: LesionNet<B>,
    model_config: ModelConfig,
    config: TrainingConfig,
    device: B::Device,
    class_to_index: BTreeMap<String, usize>,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        model_config: ModelConfig,
        config: TrainingConfig,
        class_to_index: BTreeMap<String, usize>,
        device: B::Device,
    ) -> Self {
        let model = LesionNet::new(&model_config, &device);
        Self {
            model,
            model_config,
            config,
            device,
            class_to_index,
        }
    }

    /// Continue training from an existing network instead of a fresh one
    pub fn with_model(mut self, model: LesionNet<B>) -> Self {
        self.model = model;
        self
    }

    /// Run the full training loop over preprocessed items.
    ///
    /// `train` must be non-empty; an empty `val` falls back to training
    /// metrics for checkpoint selection.
    pub fn fit(self, train: Vec<LesionItem>, val: Vec<LesionItem>) -> Result<TrainingOutcome<B>> {
        self.config.validate()?;
        self.model_config.validate()?;
        if train.is_empty() {
            return Err(NexDermError::EmptyDataset);
        }

        let Trainer {
            mut model,
            model_config,
            config,
            device,
            class_to_index,
        } = self;

        let epochs = config.epochs;
        let batch_size = config.batch_size;
        let lr0 = config.learning_rate;
        let image_size = model_config.input_size;

        info!(
            "Training: {} train / {} val items, {} epochs, batch size {}",
            train.len(),
            val.len(),
            epochs,
            batch_size
        );

        let mut optimizer = AdamConfig::new().init();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let batcher = LesionBatcher::<B>::new(device.clone(), image_size);
        let valid_batcher = LesionBatcher::<B::InnerBackend>::new(device.clone(), image_size);
        let loss_fn = CrossEntropyLossConfig::new().init(&device);

        let mut history: Vec<EpochMetrics> = Vec::with_capacity(epochs);
        let mut best_val_accuracy = f64::MIN;
        let best_path = config.checkpoint_dir.join(BEST_CHECKPOINT);
        let last_path = config.checkpoint_dir.join(LAST_CHECKPOINT);

        let mut order: Vec<usize> = (0..train.len()).collect();

        for epoch in 1..=epochs {
            // Cosine decay from lr0 toward zero over the run
            let progress = (epoch - 1) as f64 / epochs as f64;
            let lr = lr0 * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos());

            order.shuffle(&mut rng);

            let mut train_loss = 0.0f64;
            let mut train_correct = 0usize;

            for chunk in order.chunks(batch_size) {
                let items: Vec<LesionItem> = chunk.iter().map(|&i| train[i].clone()).collect();
                let batch = batcher.batch(&items);

                let logits = model.forward(batch.images);
                let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

                train_loss +=
                    loss.clone().into_scalar().elem::<f64>() * items.len() as f64;
                train_correct += count_correct(logits, batch.targets);

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);
            }

            let train_loss = train_loss / train.len() as f64;
            let train_accuracy = train_correct as f64 / train.len() as f64;

            let (val_loss, val_accuracy) = if val.is_empty() {
                (train_loss, train_accuracy)
            } else {
                evaluate(&model.valid(), &val, &valid_batcher, batch_size)
            };

            let marker = if val_accuracy > best_val_accuracy {
                "*".green().bold().to_string()
            } else {
                " ".to_string()
            };
            println!(
                "{} epoch {:>3}/{} | lr {:.2e} | train loss {:.4} acc {:.3} | val loss {:.4} acc {:.3}",
                marker, epoch, epochs, lr, train_loss, train_accuracy, val_loss, val_accuracy
            );

            history.push(EpochMetrics {
                epoch,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
                learning_rate: lr,
            });

            if val_accuracy > best_val_accuracy {
                best_val_accuracy = val_accuracy;
                save_checkpoint(&model, &class_to_index, &history, &best_path);
            }
        }

        save_checkpoint(&model, &class_to_index, &history, &last_path);

        info!(
            "Training complete: best validation accuracy {:.3}",
            best_val_accuracy
        );

        Ok(TrainingOutcome {
            model,
            history,
            best_val_accuracy,
            best_checkpoint: best_path,
            last_checkpoint: last_path,
        })
    }

}

/// Bundle the current weights into an artifact and write it.
///
/// Failures only warn; the run continues.
fn save_checkpoint<B: AutodiffBackend>(
    model: &LesionNet<B>,
    class_to_index: &BTreeMap<String, usize>,
    history: &[EpochMetrics],
    path: &std::path::Path,
) {
    let weights = match encode_weights(model.valid()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Skipping checkpoint {:?}: weight encoding failed: {e}", path);
            return;
        }
    };

    let artifact = CheckpointArtifact::new(weights, class_to_index.clone())
        .with_normalization(Normalization::imagenet())
        .with_history(history.to_vec());

    if let Err(e) = artifact.save(path) {
        warn!("Skipping checkpoint {:?}: {e}", path);
    }
}

/// Average loss and accuracy over a held-out split, without autodiff
fn evaluate<B: Backend>(
    model: &LesionNet<B>,
    items: &[LesionItem],
    batcher: &LesionBatcher<B>,
    batch_size: usize,
) -> (f64, f64) {
    let loss_fn = CrossEntropyLossConfig::new().init(batcher.device());
    let mut total_loss = 0.0f64;
    let mut correct = 0usize;

    for chunk in items.chunks(batch_size) {
        let batch = batcher.batch(chunk);
        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

        total_loss += loss.into_scalar().elem::<f64>() * chunk.len() as f64;
        correct += count_correct(logits, batch.targets);
    }

    (
        total_loss / items.len() as f64,
        correct as f64 / items.len() as f64,
    )
}

/// Number of rows where the argmax of the logits equals the target
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}
