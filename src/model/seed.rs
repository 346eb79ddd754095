//! Seed health and aflatoxin risk regressors
//!
//! Both regressors fuse a spectral embedding with two tabular embeddings and
//! squash the head output through `100 * sigmoid(x)`, so every prediction lies
//! in [0, 100] whatever the input magnitude. They share no parameters.

use burn::{
    module::Module,
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};
use tracing::debug;

use super::config::{AflatoxinRiskRegressorConfig, MlpConfig, SeedHealthRegressorConfig};
use super::encoders::{Mlp, SpectralEncoder, TabularEncoder};
use crate::utils::error::Result;

/// Upper bound of both scores
pub const SCORE_SCALE: f32 = 100.0;

/// Map raw head outputs monotonically into [0, 100]
pub fn bounded_score<B: Backend>(raw: Tensor<B, 2>) -> Tensor<B, 2> {
    sigmoid(raw).mul_scalar(SCORE_SCALE)
}

fn fusion_head_config(input_dim: usize) -> MlpConfig {
    MlpConfig::new(input_dim, vec![256, 128, 1]).with_dropouts(vec![0.3, 0.2])
}

/// Seed-Health-Index from spectrum, UAV and environment features
#[derive(Module, Debug)]
pub struct SeedHealthRegressor<B: Backend> {
    pub spectral: SpectralEncoder<B>,
    pub uav: TabularEncoder<B>,
    pub environment: TabularEncoder<B>,
    pub head: Mlp<B>,
}

impl SeedHealthRegressorConfig {
    /// Validate the config and build the regressor
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SeedHealthRegressor<B>> {
        self.validate()?;
        let (spectral, uav, environment) = (self.spectral(), self.uav(), self.environment());
        let fused =
            spectral.embedding_dim() + uav.output_dim() + environment.output_dim();

        let model = SeedHealthRegressor {
            spectral: SpectralEncoder::new(&spectral, device),
            uav: TabularEncoder::new(&uav, device),
            environment: TabularEncoder::new(&environment, device),
            head: Mlp::new(&fusion_head_config(fused), device),
        };
        debug!("SHI regressor with {} parameters", model.num_params());
        Ok(model)
    }
}

impl<B: Backend> SeedHealthRegressor<B> {
    /// Returns SHI predictions of shape [batch_size, 1] in [0, 100].
    ///
    /// Any input width other than the built one is a config error.
    pub fn forward(
        &self,
        spectra: Tensor<B, 2>,
        uav: Tensor<B, 2>,
        environment: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        let fused = Tensor::cat(
            vec![
                self.spectral.encode(spectra)?,
                self.uav.encode(uav)?,
                self.environment.encode(environment)?,
            ],
            1,
        );
        Ok(bounded_score(self.head.forward(fused)))
    }
}

/// Aflatoxin-Risk-Score from spectrum, field and storage features
#[derive(Module, Debug)]
pub struct AflatoxinRiskRegressor<B: Backend> {
    pub spectral: SpectralEncoder<B>,
    pub field: TabularEncoder<B>,
    pub storage: TabularEncoder<B>,
    pub head: Mlp<B>,
}

impl AflatoxinRiskRegressorConfig {
    /// Validate the config and build the regressor
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AflatoxinRiskRegressor<B>> {
        self.validate()?;
        let (spectral, field, storage) = (self.spectral(), self.field(), self.storage());
        let fused = spectral.embedding_dim() + field.output_dim() + storage.output_dim();

        let model = AflatoxinRiskRegressor {
            spectral: SpectralEncoder::new(&spectral, device),
            field: TabularEncoder::new(&field, device),
            storage: TabularEncoder::new(&storage, device),
            head: Mlp::new(&fusion_head_config(fused), device),
        };
        debug!("ARS regressor with {} parameters", model.num_params());
        Ok(model)
    }
}

impl<B: Backend> AflatoxinRiskRegressor<B> {
    /// Returns ARS predictions of shape [batch_size, 1] in [0, 100]
    pub fn forward(
        &self,
        spectra: Tensor<B, 2>,
        field: Tensor<B, 2>,
        storage: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        let fused = Tensor::cat(
            vec![
                self.spectral.encode(spectra)?,
                self.field.encode(field)?,
                self.storage.encode(storage)?,
            ],
            1,
        );
        Ok(bounded_score(self.head.forward(fused)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AirsError;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn filled(rows: usize, cols: usize, value: f32) -> Tensor<TestBackend, 2> {
        Tensor::from_floats(
            TensorData::new(vec![value; rows * cols], [rows, cols]),
            &Default::default(),
        )
    }

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_bounded_score_saturates() {
        let raw = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![-1e6f32, 0.0, 1e6], [3, 1]),
            &Default::default(),
        );
        let out = values(bounded_score(raw));
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 50.0).abs() < 1e-4);
        assert_eq!(out[2], 100.0);
    }

    #[test]
    fn test_shi_outputs_bounded_for_extreme_inputs() {
        let device = Default::default();
        let model: SeedHealthRegressor<TestBackend> = SeedHealthRegressorConfig::new(120)
            .with_uav_dim(16)
            .with_environment_dim(4)
            .init(&device)
            .unwrap();

        for magnitude in [-1e4f32, 0.0, 1e4] {
            let out = model.forward(
                filled(3, 120, magnitude),
                filled(3, 16, magnitude),
                filled(3, 4, -magnitude),
            )
            .unwrap();
            assert_eq!(out.dims(), [3, 1]);
            for v in values(out) {
                assert!(v.is_finite() && (0.0..=100.0).contains(&v), "got {}", v);
            }
        }
    }

    #[test]
    fn test_ars_outputs_bounded_for_extreme_inputs() {
        let device = Default::default();
        let model: AflatoxinRiskRegressor<TestBackend> = AflatoxinRiskRegressorConfig::new(120)
            .with_field_dim(8)
            .init(&device)
            .unwrap();

        for magnitude in [-1e4f32, 1e4] {
            let out = model.forward(
                filled(2, 120, magnitude),
                filled(2, 8, magnitude),
                filled(2, 4, magnitude),
            )
            .unwrap();
            for v in values(out) {
                assert!(v.is_finite() && (0.0..=100.0).contains(&v), "got {}", v);
            }
        }
    }

    #[test]
    fn test_spectrum_length_fixed_at_construction() {
        let device = Default::default();
        let shi: SeedHealthRegressor<TestBackend> =
            SeedHealthRegressorConfig::new(301).init(&device).unwrap();
        let err = shi
            .forward(filled(2, 777, 0.5), filled(2, 128, 0.0), filled(2, 10, 0.0))
            .unwrap_err();
        assert!(matches!(err, AirsError::Config(_)), "got {:?}", err);

        let ars: AflatoxinRiskRegressor<TestBackend> =
            AflatoxinRiskRegressorConfig::new(301).init(&device).unwrap();
        assert!(ars
            .forward(filled(2, 777, 0.5), filled(2, 50, 0.0), filled(2, 4, 0.0))
            .is_err());
        assert!(ars
            .forward(filled(2, 301, 0.5), filled(2, 50, 0.0), filled(2, 4, 0.0))
            .is_ok());
    }

    #[test]
    fn test_short_spectrum_rejected() {
        let device: <TestBackend as Backend>::Device = Default::default();
        assert!(SeedHealthRegressorConfig::new(4).init::<TestBackend>(&device).is_err());
    }
}
