//! Skin Lesion Dataset
//!
//! Discovers labeled images on disk, splits them into train/validation
//! partitions, and batches preprocessed items into Burn tensors.
//!
//! Directory layout is flexible: each source directory is scanned either as
//! a parent containing a subfolder named exactly for the class, or as a
//! directory whose own name matches the class (case-insensitive). Images
//! are collected in first-encountered order, concatenated across source
//! directories, then truncated to the per-class cap.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{NexDermError, Result};
use crate::preprocess::{open_image_path, Augmenter, Transform};

/// Image file extensions considered part of the dataset
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LesionSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class name (e.g., "melanoma")
    pub class_name: String,
}

/// Labeled dataset assembled from one or more source directories
#[derive(Debug, Clone)]
pub struct SkinLesionDataset {
    /// All samples, in discovery order
    pub samples: Vec<LesionSample>,
    /// Fixed class list; sample labels index into this
    pub class_names: Vec<String>,
}

impl SkinLesionDataset {
    /// Scan the source directories for images of the given classes.
    ///
    /// A class with zero discovered images only warns; a dataset with zero
    /// images overall is an error.
    pub fn discover(
        source_dirs: &[PathBuf],
        class_names: &[String],
        max_per_class: Option<usize>,
    ) -> Result<Self> {
        let mut samples = Vec::new();

        for (label, class_name) in class_names.iter().enumerate() {
            let mut class_paths: Vec<PathBuf> = Vec::new();

            for dir in source_dirs {
                let subfolder = dir.join(class_name);
                if subfolder.is_dir() {
                    collect_images(&subfolder, &mut class_paths);
                } else if dir_matches_class(dir, class_name) {
                    collect_images(dir, &mut class_paths);
                }
            }

            if let Some(cap) = max_per_class {
                class_paths.truncate(cap);
            }

            if class_paths.is_empty() {
                warn!(
                    "No images found for class '{}' in {} source director{}",
                    class_name,
                    source_dirs.len(),
                    if source_dirs.len() == 1 { "y" } else { "ies" }
                );
            } else {
                debug!(
                    "Class '{}' (label {}): {} images",
                    class_name,
                    label,
                    class_paths.len()
                );
            }

            samples.extend(class_paths.into_iter().map(|path| LesionSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(NexDermError::EmptyDataset);
        }

        info!(
            "Discovered {} samples across {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            samples,
            class_names: class_names.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Label → index mapping, as stored in checkpoint artifacts
    pub fn class_to_index(&self) -> BTreeMap<String, usize> {
        self.class_names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect()
    }

    /// Samples per class, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Split into train/validation partitions after a seeded shuffle.
    ///
    /// The validation partition never receives augmentation; callers load
    /// it with the deterministic transform only.
    pub fn split(
        &self,
        validation_fraction: f64,
        seed: u64,
    ) -> (Vec<LesionSample>, Vec<LesionSample>) {
        let mut shuffled = self.samples.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);

        let val_len = ((shuffled.len() as f64) * validation_fraction).round() as usize;
        let val_len = val_len.min(shuffled.len());
        let train = shuffled.split_off(val_len);

        (train, shuffled)
    }
}

/// Does this directory's own name match the class, case-insensitively?
fn dir_matches_class(dir: &Path, class_name: &str) -> bool {
    dir.is_dir()
        && dir
            .file_name()
            .map(|name| name.to_string_lossy().eq_ignore_ascii_case(class_name))
            .unwrap_or(false)
}

/// Append image files found directly inside `dir`, in encounter order
fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = path.extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                out.push(path.to_path_buf());
            }
        }
    }
}

/// A preprocessed image ready for batching: CHW floats plus its label
#[derive(Debug, Clone)]
pub struct LesionItem {
    pub image: Vec<f32>,
    pub label: usize,
}

impl LesionItem {
    /// Load and deterministically preprocess one sample
    pub fn from_sample(sample: &LesionSample, transform: &Transform) -> Result<Self> {
        let image = open_image_path(&sample.path)?;
        Ok(Self {
            image: transform.apply(&image),
            label: sample.label,
        })
    }

    /// Load one sample with randomized training-time augmentation
    pub fn from_sample_augmented(
        sample: &LesionSample,
        transform: &Transform,
        augmenter: &Augmenter,
        rng: &mut ChaCha8Rng,
    ) -> Result<Self> {
        let image = open_image_path(&sample.path)?;
        Ok(Self {
            image: transform.apply_augmented(&image, augmenter, rng),
            label: sample.label,
        })
    }

    /// Wrap already-preprocessed data
    pub fn from_data(image: Vec<f32>, label: usize) -> Self {
        Self { image, label }
    }
}

/// Load a list of samples with the deterministic transform
pub fn load_items(samples: &[LesionSample], transform: &Transform) -> Result<Vec<LesionItem>> {
    samples
        .iter()
        .map(|s| LesionItem::from_sample(s, transform))
        .collect()
}

/// Load a list of samples with augmentation (training split only)
pub fn load_items_augmented(
    samples: &[LesionSample],
    transform: &Transform,
    augmenter: &Augmenter,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<LesionItem>> {
    samples
        .iter()
        .map(|s| LesionItem::from_sample_augmented(s, transform, augmenter, rng))
        .collect()
}

/// A batch of images and targets on the training device
#[derive(Clone, Debug)]
pub struct LesionBatch<B: Backend> {
    /// Images with shape `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks preprocessed items into device tensors.
///
/// Normalization already happened in the transform, so batching is a pure
/// reshape-and-upload step.
#[derive(Clone, Debug)]
pub struct LesionBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> LesionBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn batch(&self, items: &[LesionItem]) -> LesionBatch<B> {
        let batch_size = items.len();
        let (channels, height, width) = (3, self.image_size, self.image_size);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            &self.device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        LesionBatch { images, targets }
    }
}
