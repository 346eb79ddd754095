//! Per-modality encoders
//!
//! Each encoder maps a batch of one modality to a fixed-width embedding. The
//! embedding width depends only on the config, never on the batch size.

use burn::{
    module::{Module, Param},
    nn::{
        conv::{Conv1d, Conv1dConfig, Conv2d, Conv2dConfig},
        pool::{
            AdaptiveAvgPool1d, AdaptiveAvgPool1dConfig, AdaptiveAvgPool2d,
            AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig,
        },
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig1d,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::{ImageEncoderConfig, MlpConfig, SpectralEncoderConfig, IMAGE_CONV_STAGES};
use crate::utils::error::{AirsError, Result};

/// Conv2d + ReLU + 2x2 max-pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
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

/// Convolutional path: conv blocks, 1x1 projection, global average pooling
#[derive(Module, Debug)]
pub struct ConvFeaturePath<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub projection: Conv2d<B>,
    pub pool: AdaptiveAvgPool2d,
}

impl<B: Backend> ConvFeaturePath<B> {
    pub fn new(config: &ImageEncoderConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(IMAGE_CONV_STAGES);
        let mut in_channels = config.in_channels;
        for stage in 0..IMAGE_CONV_STAGES {
            let out_channels = config.base_filters << stage;
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        let projection = Conv2dConfig::new([in_channels, config.embed_dim], [1, 1]).init(device);

        Self {
            blocks,
            projection,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// [B, C, H, W] -> [B, embed_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.projection.forward(x);
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }
}

/// Patch path: linear patch embedding, learned positional bias,
/// self-attention stack, mean over patches
#[derive(Module, Debug)]
pub struct PatchAttentionPath<B: Backend> {
    /// Kernel = stride = patch size, i.e. one linear map per patch
    pub patch_embedding: Conv2d<B>,
    pub position_embedding: Param<Tensor<B, 3>>,
    pub encoder: TransformerEncoder<B>,
}

impl<B: Backend> PatchAttentionPath<B> {
    pub fn new(config: &ImageEncoderConfig, device: &B::Device) -> Self {
        let p = config.patch_size;
        let patch_embedding = Conv2dConfig::new([config.in_channels, config.embed_dim], [p, p])
            .with_stride([p, p])
            .init(device);

        let position_embedding = Initializer::Normal {
            mean: 0.0,
            std: 0.02,
        }
        .init([1, config.num_patches(), config.embed_dim], device);

        let encoder = TransformerEncoderConfig::new(
            config.embed_dim,
            config.feedforward_dim,
            config.num_heads,
            config.num_layers,
        )
        .with_dropout(config.attention_dropout)
        .init(device);

        Self {
            patch_embedding,
            position_embedding,
            encoder,
        }
    }

    /// [B, C, H, W] -> [B, embed_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.patch_embedding.forward(images);
        let [batch_size, embed_dim, h, w] = x.dims();

        // [B, E, h, w] -> [B, N, E]
        let x = x.reshape([batch_size, embed_dim, h * w]).swap_dims(1, 2);
        let x = x + self.position_embedding.val();

        let x = self.encoder.forward(TransformerEncoderInput::new(x));
        x.mean_dim(1).reshape([batch_size, embed_dim])
    }
}

/// Hybrid image encoder with two parallel paths over the same image
#[derive(Module, Debug)]
pub struct ImageEncoder<B: Backend> {
    pub conv_path: ConvFeaturePath<B>,
    pub patch_path: PatchAttentionPath<B>,
}

impl<B: Backend> ImageEncoder<B> {
    pub fn new(config: &ImageEncoderConfig, device: &B::Device) -> Self {
        Self {
            conv_path: ConvFeaturePath::new(config, device),
            patch_path: PatchAttentionPath::new(config, device),
        }
    }

    /// Encode a batch of images into the (convolutional, patch) embedding pair.
    ///
    /// The two embeddings are returned separately; concatenation is the
    /// fusion head's job.
    pub fn encode(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let conv = self.conv_path.forward(images.clone());
        let patch = self.patch_path.forward(images);
        (conv, patch)
    }
}

/// Stack of stride-2 Conv1d layers with global average pooling.
///
/// The number of wavelengths is fixed when the encoder is built.
#[derive(Module, Debug)]
pub struct SpectralEncoder<B: Backend> {
    pub convs: Vec<Conv1d<B>>,
    pub relu: Relu,
    pub pool: AdaptiveAvgPool1d,
    pub projection: Option<Linear<B>>,
    spectral_length: usize,
}

impl<B: Backend> SpectralEncoder<B> {
    pub fn new(config: &SpectralEncoderConfig, device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(config.channels.len());
        let mut in_channels = 1;
        for (&out_channels, &kernel) in config.channels.iter().zip(&config.kernel_sizes) {
            convs.push(
                Conv1dConfig::new(in_channels, out_channels, kernel)
                    .with_stride(2)
                    .with_padding(PaddingConfig1d::Explicit(kernel / 2))
                    .init(device),
            );
            in_channels = out_channels;
        }

        let projection = config
            .output_dim
            .map(|dim| LinearConfig::new(in_channels, dim).init(device));

        Self {
            convs,
            relu: Relu::new(),
            pool: AdaptiveAvgPool1dConfig::new(1).init(),
            projection,
            spectral_length: config.spectral_length,
        }
    }

    pub fn spectral_length(&self) -> usize {
        self.spectral_length
    }

    /// [B, L] -> [B, embedding_dim]
    ///
    /// Fails with a config error when L differs from the built length.
    pub fn encode(&self, spectra: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [batch_size, length] = spectra.dims();
        if length != self.spectral_length {
            return Err(AirsError::Config(format!(
                "spectral encoder built for {} wavelengths received {}",
                self.spectral_length, length
            )));
        }
        let mut x = spectra.reshape([batch_size, 1, length]);
        for conv in &self.convs {
            x = self.relu.forward(conv.forward(x));
        }
        let x = self.pool.forward(x);
        let [_, channels, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        Ok(match &self.projection {
            Some(linear) => linear.forward(x),
            None => x,
        })
    }
}

/// Linear layers with ReLU between them and optional dropout.
///
/// The last layer is left linear; callers decide on its activation.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub layers: Vec<Linear<B>>,
    pub dropouts: Vec<Dropout>,
    pub relu: Relu,
    input_dim: usize,
}

impl<B: Backend> Mlp<B> {
    pub fn new(config: &MlpConfig, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(config.layer_dims.len());
        let mut in_dim = config.input_dim;
        for &out_dim in &config.layer_dims {
            layers.push(LinearConfig::new(in_dim, out_dim).init(device));
            in_dim = out_dim;
        }

        let dropouts = (0..config.layer_dims.len().saturating_sub(1))
            .map(|i| DropoutConfig::new(config.dropouts.get(i).copied().unwrap_or(0.0)).init())
            .collect();

        Self {
            layers,
            dropouts,
            relu: Relu::new(),
            input_dim: config.input_dim,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.relu.forward(x);
                if let Some(dropout) = self.dropouts.get(i) {
                    x = dropout.forward(x);
                }
            }
        }
        x
    }
}

/// Feed-forward encoder for a tabular feature vector
#[derive(Module, Debug)]
pub struct TabularEncoder<B: Backend> {
    pub mlp: Mlp<B>,
}

impl<B: Backend> TabularEncoder<B> {
    pub fn new(config: &MlpConfig, device: &B::Device) -> Self {
        Self {
            mlp: Mlp::new(config, device),
        }
    }

    /// [B, input_dim] -> [B, output_dim], last layer linear
    pub fn encode(&self, features: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [_, width] = features.dims();
        if width != self.mlp.input_dim() {
            return Err(AirsError::Config(format!(
                "tabular encoder built for {} features received {}",
                self.mlp.input_dim(),
                width
            )));
        }
        Ok(self.mlp.forward(features))
    }
}
