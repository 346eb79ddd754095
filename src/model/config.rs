//! Model Configuration Module
//!
//! Hyper-parameters of the modality encoders and the three fusion models.
//! Every config validates its shapes before a model is built so that
//! inconsistent sizes fail at construction rather than inside a forward pass.

use burn::config::Config;

use crate::utils::error::AirsError;

/// Result of a config shape check
pub type ValidationResult = std::result::Result<(), AirsError>;

/// Number of 2x2 max-pool stages in the convolutional image path
pub const IMAGE_CONV_STAGES: usize = 3;

fn config_error(msg: String) -> AirsError {
    AirsError::Config(msg)
}

fn ensure_positive(name: &str, value: usize) -> ValidationResult {
    if value == 0 {
        return Err(config_error(format!("{} must be positive", name)));
    }
    Ok(())
}

fn ensure_dropout(name: &str, value: f64) -> ValidationResult {
    if !(0.0..1.0).contains(&value) {
        return Err(config_error(format!("{} must be within [0, 1), got {}", name, value)));
    }
    Ok(())
}

/// Configuration of the hybrid convolution + patch-attention image encoder
#[derive(Config, Debug)]
pub struct ImageEncoderConfig {
    /// Side length of square input images
    #[config(default = "64")]
    pub image_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first conv block; doubled per stage
    #[config(default = "16")]
    pub base_filters: usize,

    /// Side length of the non-overlapping patches
    #[config(default = "8")]
    pub patch_size: usize,

    /// Width of both path embeddings
    #[config(default = "64")]
    pub embed_dim: usize,

    /// Attention heads per block
    #[config(default = "4")]
    pub num_heads: usize,

    /// Number of self-attention blocks
    #[config(default = "2")]
    pub num_layers: usize,

    /// Hidden width of the attention blocks' feed-forward layer
    #[config(default = "128")]
    pub feedforward_dim: usize,

    #[config(default = "0.1")]
    pub attention_dropout: f64,
}

impl ImageEncoderConfig {
    pub fn validate(&self) -> ValidationResult {
        ensure_positive("image_size", self.image_size)?;
        ensure_positive("in_channels", self.in_channels)?;
        ensure_positive("base_filters", self.base_filters)?;
        ensure_positive("patch_size", self.patch_size)?;
        ensure_positive("embed_dim", self.embed_dim)?;
        ensure_positive("num_heads", self.num_heads)?;
        ensure_positive("num_layers", self.num_layers)?;
        ensure_positive("feedforward_dim", self.feedforward_dim)?;
        ensure_dropout("attention_dropout", self.attention_dropout)?;

        let min_size = 1 << IMAGE_CONV_STAGES;
        if self.image_size < min_size {
            return Err(config_error(format!(
                "image_size {} is smaller than the {} px needed by the conv path",
                self.image_size, min_size
            )));
        }
        if self.image_size % self.patch_size != 0 {
            return Err(config_error(format!(
                "image_size {} is not divisible by patch_size {}",
                self.image_size, self.patch_size
            )));
        }
        if self.embed_dim % self.num_heads != 0 {
            return Err(config_error(format!(
                "embed_dim {} is not divisible by num_heads {}",
                self.embed_dim, self.num_heads
            )));
        }
        Ok(())
    }

    /// Number of patches per image
    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }
}

/// Configuration of a strided 1-D convolutional spectral encoder
#[derive(Config, Debug)]
pub struct SpectralEncoderConfig {
    /// Number of wavelengths per spectrum
    pub spectral_length: usize,

    /// Output channels per conv layer
    #[config(default = "vec![64, 128, 256]")]
    pub channels: Vec<usize>,

    /// Kernel size per conv layer (odd; padded to keep stride-2 halving)
    #[config(default = "vec![7, 5, 3]")]
    pub kernel_sizes: Vec<usize>,

    /// Optional linear projection after pooling
    #[config(default = "None")]
    pub output_dim: Option<usize>,
}

impl SpectralEncoderConfig {
    pub fn validate(&self) -> ValidationResult {
        ensure_positive("spectral_length", self.spectral_length)?;
        if self.channels.is_empty() || self.channels.len() != self.kernel_sizes.len() {
            return Err(config_error(format!(
                "spectral encoder needs matching non-empty channels and kernel sizes, got {:?} / {:?}",
                self.channels, self.kernel_sizes
            )));
        }
        for (&c, &k) in self.channels.iter().zip(&self.kernel_sizes) {
            ensure_positive("spectral channel count", c)?;
            ensure_positive("spectral kernel size", k)?;
        }
        if let Some(dim) = self.output_dim {
            ensure_positive("spectral output_dim", dim)?;
        }

        let min_length = 1 << self.channels.len();
        if self.spectral_length < min_length {
            return Err(config_error(format!(
                "spectral_length {} is too short for {} stride-2 conv layers",
                self.spectral_length,
                self.channels.len()
            )));
        }
        Ok(())
    }

    /// Width of the encoder output
    pub fn embedding_dim(&self) -> usize {
        self.output_dim
            .or_else(|| self.channels.last().copied())
            .unwrap_or(0)
    }
}

/// Configuration of a feed-forward stack
#[derive(Config, Debug)]
pub struct MlpConfig {
    pub input_dim: usize,

    /// Width of every linear layer, the last one being the output width
    pub layer_dims: Vec<usize>,

    /// Dropout after each non-final layer; missing entries mean no dropout
    #[config(default = "Vec::new()")]
    pub dropouts: Vec<f64>,
}

impl MlpConfig {
    pub fn validate(&self) -> ValidationResult {
        ensure_positive("mlp input_dim", self.input_dim)?;
        if self.layer_dims.is_empty() {
            return Err(config_error("mlp needs at least one layer".to_string()));
        }
        for &d in &self.layer_dims {
            ensure_positive("mlp layer width", d)?;
        }
        for &p in &self.dropouts {
            ensure_dropout("mlp dropout", p)?;
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layer_dims.last().copied().unwrap_or(0)
    }
}

/// Configuration of the canopy stress classifier
#[derive(Config, Debug)]
pub struct CanopyStressClassifierConfig {
    /// Number of output classes (binary by default)
    #[config(default = "2")]
    pub num_classes: usize,

    #[config(default = "ImageEncoderConfig::new()")]
    pub encoder: ImageEncoderConfig,

    /// Dropout of the classification head
    #[config(default = "0.3")]
    pub dropout: f64,
}

impl CanopyStressClassifierConfig {
    pub fn validate(&self) -> ValidationResult {
        if self.num_classes < 2 {
            return Err(config_error(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            )));
        }
        ensure_dropout("classifier dropout", self.dropout)?;
        self.encoder.validate()
    }
}

/// Configuration of the Seed-Health-Index regressor
#[derive(Config, Debug)]
pub struct SeedHealthRegressorConfig {
    pub spectral_length: usize,

    #[config(default = "128")]
    pub uav_dim: usize,

    #[config(default = "10")]
    pub environment_dim: usize,
}

impl SeedHealthRegressorConfig {
    pub fn spectral(&self) -> SpectralEncoderConfig {
        SpectralEncoderConfig::new(self.spectral_length)
    }

    pub fn uav(&self) -> MlpConfig {
        MlpConfig::new(self.uav_dim, vec![128, 64]).with_dropouts(vec![0.2])
    }

    pub fn environment(&self) -> MlpConfig {
        MlpConfig::new(self.environment_dim, vec![64, 32]).with_dropouts(vec![0.2])
    }

    pub fn validate(&self) -> ValidationResult {
        self.spectral().validate()?;
        self.uav().validate()?;
        self.environment().validate()
    }
}

/// Configuration of the Aflatoxin-Risk-Score regressor
#[derive(Config, Debug)]
pub struct AflatoxinRiskRegressorConfig {
    pub spectral_length: usize,

    #[config(default = "50")]
    pub field_dim: usize,

    #[config(default = "4")]
    pub storage_dim: usize,
}

impl AflatoxinRiskRegressorConfig {
    pub fn spectral(&self) -> SpectralEncoderConfig {
        SpectralEncoderConfig::new(self.spectral_length)
            .with_channels(vec![64, 128])
            .with_kernel_sizes(vec![7, 5])
            .with_output_dim(Some(64))
    }

    pub fn field(&self) -> MlpConfig {
        MlpConfig::new(self.field_dim, vec![128, 64]).with_dropouts(vec![0.2])
    }

    pub fn storage(&self) -> MlpConfig {
        MlpConfig::new(self.storage_dim, vec![32, 32]).with_dropouts(vec![0.2])
    }

    pub fn validate(&self) -> ValidationResult {
        self.spectral().validate()?;
        self.field().validate()?;
        self.storage().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_encoder_defaults_are_valid() {
        let config = ImageEncoderConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_patches(), 64);
    }

    #[test]
    fn test_image_encoder_rejects_bad_patch() {
        let config = ImageEncoderConfig::new().with_image_size(30).with_patch_size(8);
        assert!(matches!(config.validate(), Err(AirsError::Config(_))));

        let config = ImageEncoderConfig::new().with_embed_dim(30).with_num_heads(4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_spectral_encoder_validation() {
        assert!(SpectralEncoderConfig::new(2151).validate().is_ok());
        assert!(SpectralEncoderConfig::new(4).validate().is_err());
        let mismatched = SpectralEncoderConfig::new(200).with_kernel_sizes(vec![7, 5]);
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn test_embedding_dims() {
        let shi = SeedHealthRegressorConfig::new(301);
        assert_eq!(shi.spectral().embedding_dim(), 256);
        assert_eq!(shi.uav().output_dim(), 64);
        assert_eq!(shi.environment().output_dim(), 32);

        let ars = AflatoxinRiskRegressorConfig::new(301);
        assert_eq!(ars.spectral().embedding_dim(), 64);
        assert_eq!(ars.field().output_dim(), 64);
        assert_eq!(ars.storage().output_dim(), 32);
    }

    #[test]
    fn test_classifier_needs_two_classes() {
        let config = CanopyStressClassifierConfig::new().with_num_classes(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = SeedHealthRegressorConfig::new(301).with_uav_dim(16);
        let json = serde_json::to_string(&config).unwrap();
        let restored: SeedHealthRegressorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.uav_dim, 16);
        assert_eq!(restored.spectral_length, 301);
    }

    #[test]
    fn test_tabular_encoders_use_dropout() {
        let shi = SeedHealthRegressorConfig::new(301);
        let ars = AflatoxinRiskRegressorConfig::new(301);
        for (name, mlp) in [
            ("uav", shi.uav()),
            ("environment", shi.environment()),
            ("field", ars.field()),
            ("storage", ars.storage()),
        ] {
            assert_eq!(mlp.dropouts, vec![0.2], "{} encoder dropout", name);
            assert!(mlp.validate().is_ok());
        }
    }
}
