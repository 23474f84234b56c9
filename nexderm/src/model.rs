//! Lesion Classification Network
//!
//! Convolutional network for skin lesion classification built with Burn.
//! A small feature-extracting backbone (four conv blocks with max pooling
//! and global average pooling) feeds a dropout + linear classification
//! head sized for the task's class count. The head is always freshly
//! initialized; the backbone can optionally be transferred from an already
//! trained network.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder, RecorderError},
    tensor::{backend::Backend, Tensor},
};

use crate::config::ModelConfig;

/// A convolutional block: Conv2d, ReLU, and max pooling
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Skin lesion classifier network
///
/// Backbone: 4 conv blocks with doubling filter counts, each halving the
/// spatial resolution, followed by global average pooling. Head: one hidden
/// linear layer, dropout, and a linear output layer with `num_classes`
/// units.
#[derive(Module, Debug)]
pub struct LesionNet<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    conv4: ConvBlock<B>,

    global_pool: AdaptiveAvgPool2d,

    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> LesionNet<B> {
    /// Build a fresh, untrained network for the given configuration
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        let conv1 = ConvBlock::new(config.in_channels, base, device);
        let conv2 = ConvBlock::new(base, base * 2, device);
        let conv3 = ConvBlock::new(base * 2, base * 4, device);
        let conv4 = ConvBlock::new(base * 4, base * 8, device);

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let fc1 = LinearConfig::new(base * 8, 256).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(256, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Transfer the backbone layers from an already trained network,
    /// keeping this network's freshly initialized head. Both networks must
    /// share the same `base_filters`.
    pub fn with_backbone_from(mut self, donor: LesionNet<B>) -> Self {
        self.conv1 = donor.conv1;
        self.conv2 = donor.conv2;
        self.conv3 = donor.conv3;
        self.conv4 = donor.conv4;
        self
    }

    /// Forward pass: `[batch, 3, H, W]` → logits `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax over the class dimension
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Serialize a network's parameters into backend-agnostic bytes
pub fn encode_weights<B: Backend>(model: LesionNet<B>) -> Result<Vec<u8>, RecorderError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    recorder.record(model.into_record(), ())
}

/// Load serialized parameters into a freshly built network
pub fn decode_weights<B: Backend>(
    model: LesionNet<B>,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<LesionNet<B>, RecorderError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder.load(bytes, device)?;
    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn small_config(num_classes: usize) -> ModelConfig {
        ModelConfig {
            num_classes,
            input_size: 32,
            in_channels: 3,
            dropout_rate: 0.2,
            base_filters: 4,
        }
    }

    #[test]
    fn test_lesion_net_output_shape() {
        let device = Default::default();
        let model = LesionNet::<TestBackend>::new(&small_config(2), &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 2]);
    }

    #[test]
    fn test_lesion_net_multi_class_output_shape() {
        let device = Default::default();
        let model = LesionNet::<TestBackend>::new(&small_config(7), &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, 7]);
        assert_eq!(model.num_classes(), 7);
    }

    #[test]
    fn test_forward_softmax_is_distribution() {
        let device = Default::default();
        let model = LesionNet::<TestBackend>::new(&small_config(3), &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        let probs = model.forward_softmax(input);
        let values: Vec<f32> = probs.into_data().to_vec().unwrap();

        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(values.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_weights_round_trip() {
        let device = Default::default();
        let model = LesionNet::<TestBackend>::new(&small_config(2), &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let before: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();

        let bytes = encode_weights(model.clone()).unwrap();
        let fresh = LesionNet::<TestBackend>::new(&small_config(2), &device);
        let restored = decode_weights(fresh, bytes, &device).unwrap();

        let after: Vec<f32> = restored.forward(input).into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_constant_head_end_to_end_prediction() {
        use crate::checkpoint::CheckpointArtifact;
        use crate::classifier::Classifier;
        use burn::module::Param;
        use image::{DynamicImage, ImageBuffer, Rgb};
        use std::collections::BTreeMap;

        let device = Default::default();
        let mut model = LesionNet::<TestBackend>::new(&small_config(2), &device);

        // Zero the output weights so the logits equal the output bias for
        // any input
        model.fc2.weight = Param::from_tensor(Tensor::zeros([256, 2], &device));
        model.fc2.bias = Some(Param::from_tensor(Tensor::from_floats(
            [2.0, -1.0],
            &device,
        )));

        let weights = encode_weights(model).unwrap();
        let mut mapping = BTreeMap::new();
        mapping.insert("no_disease".to_string(), 0);
        mapping.insert("disease".to_string(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constant.ckpt");
        CheckpointArtifact::new(weights, mapping).save(&path).unwrap();

        let classifier =
            Classifier::<TestBackend>::from_checkpoint(small_config(2), Default::default(), &path)
                .unwrap();
        let black = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(32, 32, Rgb([0, 0, 0])));
        let prediction = classifier.predict(&black).unwrap();

        assert_eq!(prediction.label, "no_disease");
        let expected = (2.0f32).exp() / ((2.0f32).exp() + (-1.0f32).exp());
        assert!((prediction.confidence - expected).abs() < 1e-4);
    }

    #[test]
    fn test_backbone_transfer_keeps_head_size() {
        let device = Default::default();
        let donor = LesionNet::<TestBackend>::new(&small_config(2), &device);
        let target = LesionNet::<TestBackend>::new(&small_config(5), &device);

        let transferred = target.with_backbone_from(donor);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);

        assert_eq!(transferred.forward(input).dims(), [1, 5]);
    }
}
