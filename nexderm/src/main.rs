//! NexDerm CLI
//!
//! Command-line entry point for training skin lesion classifiers and running
//! predictions against saved checkpoints. The HTTP serving path lives in the
//! separate `nexderm-server` binary.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use nexderm::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use nexderm::classifier::{Classifier, Prediction};
use nexderm::config::{ModelConfig, TrainingConfig};
use nexderm::dataset::{load_items, load_items_augmented, SkinLesionDataset};
use nexderm::logging::{init_logging, LogConfig};
use nexderm::preprocess::{Augmenter, Normalization, Transform};
use nexderm::trainer::Trainer;

/// Skin lesion classification with Burn
#[derive(Parser, Debug)]
#[command(name = "nexderm")]
#[command(version)]
#[command(about = "Train and run skin lesion classification models", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a classifier from labeled image directories
    Train {
        /// Source directories to scan for class images (repeatable)
        #[arg(short, long, required = true)]
        data_dir: Vec<PathBuf>,

        /// Comma-separated class names, in label order
        #[arg(short, long, default_value = "no_disease,disease")]
        classes: String,

        /// Number of training epochs
        #[arg(short, long, default_value = "20")]
        epochs: usize,

        /// Batch size for training
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Initial learning rate
        #[arg(short, long, default_value = "0.0001")]
        learning_rate: f64,

        /// Fraction of data held out for validation
        #[arg(long, default_value = "0.2")]
        validation_fraction: f64,

        /// Maximum images per class
        #[arg(long)]
        max_per_class: Option<usize>,

        /// Input image size (square)
        #[arg(long, default_value = "384")]
        image_size: usize,

        /// Enable data augmentation on the training split
        #[arg(long, default_value = "false")]
        augmentation: bool,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory for checkpoints
        #[arg(short, long, default_value = "checkpoints")]
        output_dir: PathBuf,
    },

    /// Classify an image with a trained checkpoint
    Predict {
        /// Path to the checkpoint artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Image to classify; omit for an interactive prompt
        #[arg(short, long)]
        image: Option<String>,

        /// Input image size the model was trained with
        #[arg(long, default_value = "384")]
        image_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config).map_err(|e| anyhow::anyhow!(e))?;

    info!("NexDerm v{} | backend: {}", nexderm::VERSION, backend_name());

    match cli.command {
        Commands::Train {
            data_dir,
            classes,
            epochs,
            batch_size,
            learning_rate,
            validation_fraction,
            max_per_class,
            image_size,
            augmentation,
            seed,
            output_dir,
        } => {
            let class_names: Vec<String> = classes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            let model_config = ModelConfig {
                num_classes: class_names.len(),
                input_size: image_size,
                ..ModelConfig::binary()
            };
            let training_config = TrainingConfig {
                epochs,
                batch_size,
                learning_rate,
                validation_fraction,
                max_per_class,
                augment: augmentation,
                seed,
                checkpoint_dir: output_dir,
            };

            train(model_config, training_config, &data_dir, &class_names)
        }
        Commands::Predict {
            model,
            image,
            image_size,
        } => {
            let model_config = ModelConfig {
                input_size: image_size,
                ..ModelConfig::binary()
            };
            let classifier =
                Classifier::<DefaultBackend>::from_checkpoint(model_config, default_device(), &model)
                    .context("failed to load checkpoint")?;

            match image {
                Some(path) => {
                    let prediction = classifier.predict_path(&path)?;
                    print_prediction(&prediction, classifier.labels());
                    Ok(())
                }
                None => interactive_predict(&classifier),
            }
        }
    }
}

fn train(
    model_config: ModelConfig,
    training_config: TrainingConfig,
    data_dirs: &[PathBuf],
    class_names: &[String],
) -> Result<()> {
    let dataset =
        SkinLesionDataset::discover(data_dirs, class_names, training_config.max_per_class)?;
    println!(
        "{} {} images across {} classes",
        "Dataset:".bold(),
        dataset.len(),
        dataset.num_classes()
    );

    let (train_samples, val_samples) =
        dataset.split(training_config.validation_fraction, training_config.seed);

    let transform = Transform::new(model_config.input_size as u32, Normalization::imagenet());
    info!(
        "Loading {} train / {} val images",
        train_samples.len(),
        val_samples.len()
    );

    let train_items = if training_config.augment {
        let mut rng = ChaCha8Rng::seed_from_u64(training_config.seed);
        load_items_augmented(&train_samples, &transform, &Augmenter::default(), &mut rng)?
    } else {
        load_items(&train_samples, &transform)?
    };
    let val_items = load_items(&val_samples, &transform)?;

    let trainer = Trainer::<TrainingBackend>::new(
        model_config,
        training_config,
        dataset.class_to_index(),
        default_device(),
    );
    let outcome = trainer.fit(train_items, val_items)?;

    println!(
        "\n{} best validation accuracy {:.1}%",
        "Done:".green().bold(),
        outcome.best_val_accuracy * 100.0
    );
    println!("  best checkpoint: {}", outcome.best_checkpoint.display());
    println!("  last checkpoint: {}", outcome.last_checkpoint.display());
    Ok(())
}

fn interactive_predict<B: burn::tensor::backend::Backend>(
    classifier: &Classifier<B>,
) -> Result<()> {
    println!(
        "{}",
        "Enter an image path to classify it ('quit' to exit).".bold()
    );

    let stdin = std::io::stdin();
    loop {
        print!("{} ", ">".cyan().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }

        match classifier.predict_path(input) {
            Ok(prediction) => print_prediction(&prediction, classifier.labels()),
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
    }
    Ok(())
}

fn print_prediction(prediction: &Prediction, labels: &[String]) {
    println!(
        "{} {} ({:.1}% confidence)",
        "Prediction:".bold(),
        prediction.label.green().bold(),
        prediction.confidence * 100.0
    );
    for (label, prob) in labels.iter().zip(&prediction.probabilities) {
        println!("  {:<20} {:>6.2}%", label, prob * 100.0);
    }
}
