//! Canopy stress classifier
//!
//! Architecture:
//! - Hybrid image encoder (convolutional path + patch attention path)
//! - Concatenation of both embeddings
//! - Classification head: Linear(2E, E) -> ReLU -> Dropout -> Linear(E, classes)

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use tracing::debug;

use super::config::{CanopyStressClassifierConfig, MlpConfig};
use super::encoders::{ImageEncoder, Mlp};
use crate::utils::error::Result;

#[derive(Module, Debug)]
pub struct CanopyStressClassifier<B: Backend> {
    pub encoder: ImageEncoder<B>,
    pub head: Mlp<B>,
    num_classes: usize,
    image_size: usize,
}

impl CanopyStressClassifierConfig {
    /// Validate the config and build the classifier
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CanopyStressClassifier<B>> {
        self.validate()?;
        let embed = self.encoder.embed_dim;
        let head_config = MlpConfig::new(2 * embed, vec![embed, self.num_classes])
            .with_dropouts(vec![self.dropout]);

        let model = CanopyStressClassifier {
            encoder: ImageEncoder::new(&self.encoder, device),
            head: Mlp::new(&head_config, device),
            num_classes: self.num_classes,
            image_size: self.encoder.image_size,
        };
        debug!("Canopy classifier with {} parameters", model.num_params());
        Ok(model)
    }
}

impl<B: Backend> CanopyStressClassifier<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `images` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let (conv, patch) = self.encoder.encode(images);
        let fused = Tensor::cat(vec![conv, patch], 1);
        self.head.forward(fused)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Side length of the square images the model was built for
    pub fn image_size(&self) -> usize {
        self.image_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::ImageEncoderConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> CanopyStressClassifierConfig {
        CanopyStressClassifierConfig::new().with_encoder(
            ImageEncoderConfig::new()
                .with_image_size(16)
                .with_patch_size(4)
                .with_base_filters(4)
                .with_embed_dim(8)
                .with_num_heads(2)
                .with_num_layers(1)
                .with_feedforward_dim(16),
        )
    }

    #[test]
    fn test_classifier_output_shape() {
        let device = Default::default();
        let model: CanopyStressClassifier<TestBackend> = tiny_config().init(&device).unwrap();

        let images = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [2, 2]);
        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.image_size(), 16);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model: CanopyStressClassifier<TestBackend> =
            tiny_config().with_num_classes(3).init(&device).unwrap();

        let probs = model.forward_softmax(Tensor::zeros([4, 3, 16, 16], &device));
        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let device = Default::default();
        let config = tiny_config().with_encoder(ImageEncoderConfig::new().with_image_size(20));
        let result: Result<CanopyStressClassifier<TestBackend>> = config.init(&device);
        assert!(result.is_err());
    }
}
