//! Image Preprocessing Pipeline
//!
//! Raw image in, fixed-size normalized CHW tensor data out. The
//! deterministic path ([`Transform::apply`]) is shared by inference and
//! validation; training additionally runs the randomized [`Augmenter`]
//! before the final resize and normalize.
//!
//! # Augmentation strategy
//!
//! - **Training**: random flips, small rotation, color jitter
//! - **Validation / inference**: deterministic transform only

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{NexDermError, Result};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalization statistics, stored in the checkpoint artifact
/// so training and inference always agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl Normalization {
    /// Standard ImageNet statistics, the default for transfer-learned models
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Deterministic preprocessing transform, fixed at model load time.
///
/// Identical for every inference input: resize, force RGB, scale to [0, 1],
/// normalize per channel. Output is CHW-flattened f32 data.
#[derive(Debug, Clone)]
pub struct Transform {
    pub image_size: u32,
    pub normalization: Normalization,
}

impl Transform {
    pub fn new(image_size: u32, normalization: Normalization) -> Self {
        Self {
            image_size,
            normalization,
        }
    }

    /// Apply the transform: `[3, image_size, image_size]` CHW floats.
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let resized = image.resize_exact(self.image_size, self.image_size, FilterType::Triangle);
        self.normalize(&resized.to_rgb8())
    }

    /// Training-time variant: randomized augmentation first, then the same
    /// resize and normalize as [`apply`](Self::apply).
    pub fn apply_augmented(
        &self,
        image: &DynamicImage,
        augmenter: &Augmenter,
        rng: &mut ChaCha8Rng,
    ) -> Vec<f32> {
        let augmented = augmenter.augment(image.clone(), rng);
        self.apply(&augmented)
    }

    /// Number of elements in one transformed image
    pub fn output_len(&self) -> usize {
        3 * (self.image_size as usize) * (self.image_size as usize)
    }

    /// Normalize an RGB image into CHW layout: all R, then all G, then all B
    fn normalize(&self, rgb: &RgbImage) -> Vec<f32> {
        let (width, height) = rgb.dimensions();
        let num_pixels = (width * height) as usize;
        let mean = self.normalization.mean;
        let std = self.normalization.std;

        let mut out = vec![0.0f32; 3 * num_pixels];
        for (i, pixel) in rgb.pixels().enumerate() {
            out[i] = (pixel[0] as f32 / 255.0 - mean[0]) / std[0];
            out[num_pixels + i] = (pixel[1] as f32 / 255.0 - mean[1]) / std[1];
            out[2 * num_pixels + i] = (pixel[2] as f32 / 255.0 - mean[2]) / std[2];
        }
        out
    }
}

/// Decode uploaded bytes into an image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| NexDermError::UnsupportedImage(e.to_string()))
}

/// Strip a single matching pair of surrounding quote characters.
///
/// Paths pasted from a file browser often arrive wrapped in quotes; anything
/// else is left untouched.
pub fn strip_quotes(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        let (first, last) = (bytes[0], bytes[trimmed.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Open an image from a user-supplied path string.
///
/// Used only by the offline/interactive prediction path; the HTTP path only
/// ever receives bytes.
pub fn open_image(raw_path: &str) -> Result<DynamicImage> {
    let path = PathBuf::from(strip_quotes(raw_path));
    if !path.exists() {
        return Err(NexDermError::ImageNotFound(path));
    }
    open_image_path(&path)
}

/// Open and decode an image file
pub fn open_image_path(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(NexDermError::ImageNotFound(path.to_path_buf()));
    }
    image::open(path).map_err(|e| NexDermError::UnsupportedImage(e.to_string()))
}

/// Randomized training-time augmenter.
///
/// Each transform is independently randomized per call; nothing here is ever
/// applied at inference time.
#[derive(Debug, Clone)]
pub struct Augmenter {
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Probability of a vertical flip
    pub vertical_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Color jitter range: brightness/contrast/saturation each 1.0 ± delta
    pub jitter_delta: f32,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.5,
            rotation_degrees: 20.0,
            jitter_delta: 0.2,
        }
    }
}

impl Augmenter {
    /// Apply the configured augmentations randomly to an image
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut result = img;

        if rng.gen::<f32>() < self.horizontal_flip_prob {
            result = result.fliph();
        }

        if rng.gen::<f32>() < self.vertical_flip_prob {
            result = result.flipv();
        }

        if self.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.rotation_degrees..=self.rotation_degrees);
            result = rotate(&result, angle);
        }

        if self.jitter_delta > 0.0 {
            let brightness = rng.gen_range(-self.jitter_delta..=self.jitter_delta);
            let contrast = 1.0 + rng.gen_range(-self.jitter_delta..=self.jitter_delta);
            let saturation = 1.0 + rng.gen_range(-self.jitter_delta..=self.jitter_delta);
            result = adjust_brightness(&result, brightness);
            result = adjust_contrast(&result, contrast);
            result = adjust_saturation(&result, saturation);
        }

        result
    }
}

/// Rotate image around its center by the given angle in degrees
fn rotate(img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
    if angle_degrees.abs() < 0.1 {
        return img.clone();
    }

    let angle_rad = angle_degrees.to_radians();
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    let mut output = ImageBuffer::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            let src_x = cx + dx * cos_a + dy * sin_a;
            let src_y = cy - dx * sin_a + dy * cos_a;

            output.put_pixel(x, y, bilinear_sample(&rgb, src_x, src_y));
        }
    }

    DynamicImage::ImageRgb8(output)
}

/// Sample a pixel using bilinear interpolation; black outside the source
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x >= width as f32 - 1.0 || y >= height as f32 - 1.0 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// Shift brightness by delta (fraction of full scale) on all channels
fn adjust_brightness(img: &DynamicImage, delta: f32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let shift = (delta * 255.0) as i32;

    let mut output = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        output.put_pixel(
            x,
            y,
            Rgb([
                (pixel[0] as i32 + shift).clamp(0, 255) as u8,
                (pixel[1] as i32 + shift).clamp(0, 255) as u8,
                (pixel[2] as i32 + shift).clamp(0, 255) as u8,
            ]),
        );
    }

    DynamicImage::ImageRgb8(output)
}

/// Scale contrast around the mean luminance
fn adjust_contrast(img: &DynamicImage, factor: f32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let total: f64 = rgb
        .pixels()
        .map(|p| (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0)
        .sum();
    let mean = (total / (width as f64 * height as f64)) as f32;

    let mut output = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let mut adjusted = [0u8; 3];
        for c in 0..3 {
            let v = mean + (pixel[c] as f32 - mean) * factor;
            adjusted[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        output.put_pixel(x, y, Rgb(adjusted));
    }

    DynamicImage::ImageRgb8(output)
}

/// Scale saturation by blending each pixel with its luma
fn adjust_saturation(img: &DynamicImage, factor: f32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut output = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        // Rec. 601 luma
        let luma =
            0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
        let mut adjusted = [0u8; 3];
        for c in 0..3 {
            let v = luma + (pixel[c] as f32 - luma) * factor;
            adjusted[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        output.put_pixel(x, y, Rgb(adjusted));
    }

    DynamicImage::ImageRgb8(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn test_transform_output_shape() {
        let transform = Transform::new(64, Normalization::imagenet());
        // Source resolution differs from the target on both axes
        let data = transform.apply(&solid_image(100, 37, [120, 60, 200]));
        assert_eq!(data.len(), 3 * 64 * 64);
        assert_eq!(data.len(), transform.output_len());
    }

    #[test]
    fn test_transform_normalization_values() {
        let transform = Transform::new(8, Normalization::imagenet());
        let data = transform.apply(&solid_image(8, 8, [255, 0, 128]));
        let n = 8 * 8;

        // One sampled pixel per channel must match (pixel/255 - mean) / std
        let expected_r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let expected_g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        let expected_b = (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];

        assert!((data[0] - expected_r).abs() < 1e-5);
        assert!((data[n] - expected_g).abs() < 1e-5);
        assert!((data[2 * n] - expected_b).abs() < 1e-5);
    }

    #[test]
    fn test_transform_coerces_grayscale_to_rgb() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            40,
            40,
            image::Luma([77u8]),
        ));
        let transform = Transform::new(16, Normalization::imagenet());
        let data = transform.apply(&gray);
        assert_eq!(data.len(), 3 * 16 * 16);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let transform = Transform::new(32, Normalization::imagenet());
        let img = solid_image(50, 50, [10, 200, 90]);
        assert_eq!(transform.apply(&img), transform.apply(&img));
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"/tmp/a.jpg\""), "/tmp/a.jpg");
        assert_eq!(strip_quotes("'/tmp/a.jpg'"), "/tmp/a.jpg");
        assert_eq!(strip_quotes("  /tmp/a.jpg  "), "/tmp/a.jpg");
        // Mismatched quotes are left alone
        assert_eq!(strip_quotes("\"/tmp/a.jpg'"), "\"/tmp/a.jpg'");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn test_open_image_missing_path() {
        let err = open_image("\"/definitely/not/here.png\"").unwrap_err();
        match err {
            crate::error::NexDermError::ImageNotFound(path) => {
                // Quotes were stripped before resolution
                assert_eq!(path.to_string_lossy(), "/definitely/not/here.png");
            }
            other => panic!("expected ImageNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_image_garbage_bytes() {
        let err = decode_image(b"not an image at all").unwrap_err();
        assert!(matches!(
            err,
            crate::error::NexDermError::UnsupportedImage(_)
        ));
    }

    #[test]
    fn test_decode_image_valid_png() {
        let img = solid_image(10, 10, [1, 2, 3]);
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        assert!(decode_image(&bytes).is_ok());
    }

    #[test]
    fn test_augmenter_preserves_dimensions() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let augmenter = Augmenter::default();
        let img = solid_image(48, 48, [90, 140, 30]);
        let out = augmenter.augment(img, &mut rng);
        assert_eq!(out.width(), 48);
        assert_eq!(out.height(), 48);
    }

    #[test]
    fn test_rotation_keeps_size() {
        let img = solid_image(32, 32, [200, 200, 200]);
        let out = rotate(&img, 17.5);
        assert_eq!(out.width(), 32);
        assert_eq!(out.height(), 32);
    }

    #[test]
    fn test_contrast_identity_factor() {
        let img = solid_image(8, 8, [100, 150, 200]);
        let out = adjust_contrast(&img, 1.0).to_rgb8();
        let px = out.get_pixel(3, 3);
        assert_eq!(px[0], 100);
        assert_eq!(px[1], 150);
        assert_eq!(px[2], 200);
    }
}
