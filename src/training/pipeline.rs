//! End-to-end experiments: generate, split, train, restore the best snapshot,
//! and score it on the held-out test partition.

use std::fs;
use std::path::Path;

use burn::data::dataset::Dataset;
use burn::module::{AutodiffModule, Module};
use burn::tensor::backend::AutodiffBackend;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

use super::checkpoint::{CheckpointManager, ModelRole};
use super::evaluator::{ClassificationReport, RegressionReport};
use super::trainer::{adam_trainer, evaluate_model, TrainerConfig, TrainingSummary};
use crate::dataset::{
    CanopyDataset, DatasetSplits, GeneratorConfig, SeedDataset, SeedFeatureDims, SplitConfig,
    SyntheticDataGenerator,
};
use crate::model::{
    AflatoxinRiskRegressorConfig, CanopyStressClassifierConfig, ImageEncoderConfig,
    SeedHealthRegressorConfig,
};
use crate::utils::error::{AirsError, Result};
use crate::DEFAULT_SEED;

/// Canopy stress experiment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanopyExperimentConfig {
    pub num_images: usize,
    /// Generator seed
    pub seed: u64,
    pub generator: GeneratorConfig,
    pub split: SplitConfig,
    pub model: CanopyStressClassifierConfig,
    pub trainer: TrainerConfig,
}

impl Default for CanopyExperimentConfig {
    fn default() -> Self {
        let image_size = 64;
        Self {
            num_images: 1000,
            seed: DEFAULT_SEED,
            generator: GeneratorConfig {
                image_size,
                ..GeneratorConfig::default()
            },
            split: SplitConfig::default(),
            model: CanopyStressClassifierConfig::new()
                .with_encoder(ImageEncoderConfig::new().with_image_size(image_size)),
            trainer: TrainerConfig::canopy(),
        }
    }
}

impl CanopyExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        self.generator.validate()?;
        self.split.validate_three_way()?;
        self.model.validate()?;
        self.trainer.validate()?;
        if self.model.encoder.image_size != self.generator.image_size {
            return Err(AirsError::Config(format!(
                "model expects {}px images but the generator produces {}px",
                self.model.encoder.image_size, self.generator.image_size
            )));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }
}

/// Seed health and aflatoxin risk experiment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedExperimentConfig {
    pub num_samples: usize,
    /// Generator seed
    pub seed: u64,
    pub generator: GeneratorConfig,
    pub dims: SeedFeatureDims,
    pub split: SplitConfig,
    pub shi_model: SeedHealthRegressorConfig,
    pub ars_model: AflatoxinRiskRegressorConfig,
    /// Shared by both regressors; each gets its own optimizer and scheduler
    pub trainer: TrainerConfig,
}

impl Default for SeedExperimentConfig {
    fn default() -> Self {
        Self::with_spectral_length(GeneratorConfig::default().spectral_length)
    }
}

impl SeedExperimentConfig {
    /// Defaults with every spectral length set to `spectral_length`
    pub fn with_spectral_length(spectral_length: usize) -> Self {
        let dims = SeedFeatureDims::default();
        Self {
            num_samples: 2000,
            seed: DEFAULT_SEED,
            generator: GeneratorConfig {
                spectral_length,
                ..GeneratorConfig::default()
            },
            dims,
            split: SplitConfig::default(),
            shi_model: SeedHealthRegressorConfig::new(spectral_length)
                .with_uav_dim(dims.uav)
                .with_environment_dim(dims.environment),
            ars_model: AflatoxinRiskRegressorConfig::new(spectral_length)
                .with_field_dim(dims.field)
                .with_storage_dim(dims.storage),
            trainer: TrainerConfig::seed_regressor(),
        }
    }

    /// Point the generator and both regressors at `spectral_length` wavelengths
    pub fn set_spectral_length(&mut self, spectral_length: usize) {
        self.generator.spectral_length = spectral_length;
        self.shi_model.spectral_length = spectral_length;
        self.ars_model.spectral_length = spectral_length;
    }

    pub fn validate(&self) -> Result<()> {
        self.generator.validate()?;
        self.split.validate_three_way()?;
        self.shi_model.validate()?;
        self.ars_model.validate()?;
        self.trainer.validate()?;

        let length = self.generator.spectral_length;
        if self.shi_model.spectral_length != length || self.ars_model.spectral_length != length {
            return Err(AirsError::Config(format!(
                "regressor spectral lengths ({}, {}) differ from the generator's {}",
                self.shi_model.spectral_length, self.ars_model.spectral_length, length
            )));
        }
        if self.shi_model.uav_dim != self.dims.uav
            || self.shi_model.environment_dim != self.dims.environment
            || self.ars_model.field_dim != self.dims.field
            || self.ars_model.storage_dim != self.dims.storage
        {
            return Err(AirsError::Config(format!(
                "regressor input widths do not match feature dims {:?}",
                self.dims
            )));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(self, path.as_ref())
    }
}

/// Partition sizes of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl From<&DatasetSplits> for SplitSizes {
    fn from(splits: &DatasetSplits) -> Self {
        Self {
            train: splits.train.len(),
            validation: splits.validation.len(),
            test: splits.test.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanopyReport {
    pub splits: SplitSizes,
    /// Per-partition share of each class: train, validation, test
    pub class_proportions: [Vec<f64>; 3],
    pub num_parameters: usize,
    pub training: TrainingSummary,
    pub test: ClassificationReport,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedReport {
    pub splits: SplitSizes,
    pub mean_shi: f64,
    pub mean_ars: f64,
    pub shi_training: TrainingSummary,
    pub ars_training: TrainingSummary,
    pub shi_test: RegressionReport,
    pub ars_test: RegressionReport,
    pub finished_at: String,
}

/// Train and score the canopy stress classifier
pub fn run_canopy_experiment<B: AutodiffBackend>(
    config: &CanopyExperimentConfig,
    device: &B::Device,
) -> Result<CanopyReport> {
    config.validate()?;

    let mut generator = SyntheticDataGenerator::with_config(config.generator.clone(), config.seed)?;
    let dataset = CanopyDataset::generate(&mut generator, config.num_images)?;
    let labels = dataset.labels();
    let num_classes = config.model.num_classes;

    let splits = DatasetSplits::stratified(&labels, &config.split)?;
    info!("Canopy split: {}", splits);
    let class_proportions = [
        DatasetSplits::class_proportions(&splits.train, &labels, num_classes),
        DatasetSplits::class_proportions(&splits.validation, &labels, num_classes),
        DatasetSplits::class_proportions(&splits.test, &labels, num_classes),
    ];

    let train = dataset.subset(&splits.train)?;
    let valid = dataset.subset(&splits.validation)?;
    let test = dataset.subset(&splits.test)?;

    let model = config.model.init::<B>(device)?;
    let num_parameters = model.num_params();
    let mut trainer = adam_trainer(model, config.trainer.clone(), ModelRole::Canopy, device.clone())?;
    let training = trainer.fit(&train, &valid)?;

    let best = restore_best::<B::InnerBackend, _, _>(
        trainer.into_best_model().valid(),
        &config.trainer,
        &training,
        || config.model.init::<B::InnerBackend>(device),
        device,
    )?;
    let predictions = evaluate_model::<B::InnerBackend, _, _>(&best, &test, config.trainer.batch_size, device)?;
    let test = ClassificationReport::from_predictions(&predictions, num_classes)?;
    info!("Canopy test metrics:\n{}", test.metrics);

    Ok(CanopyReport {
        splits: SplitSizes::from(&splits),
        class_proportions,
        num_parameters,
        training,
        test,
        finished_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Train and score the SHI and ARS regressors side by side.
///
/// Both trainers see the same shuffled batch order every epoch; their
/// parameters, optimizers and schedulers stay separate.
pub fn run_seed_experiment<B: AutodiffBackend>(
    config: &SeedExperimentConfig,
    device: &B::Device,
) -> Result<SeedReport> {
    config.validate()?;

    let mut generator = SyntheticDataGenerator::with_config(config.generator.clone(), config.seed)?;
    let dataset = SeedDataset::generate(&mut generator, config.num_samples, config.dims)?;
    let splits = DatasetSplits::random(dataset.len(), &config.split)?;
    info!("Seed split: {}", splits);

    let train = dataset.subset(&splits.train)?;
    let valid = dataset.subset(&splits.validation)?;
    let test = dataset.subset(&splits.test)?;

    let mut shi = adam_trainer(
        config.shi_model.init::<B>(device)?,
        config.trainer.clone(),
        ModelRole::SeedHealth,
        device.clone(),
    )?;
    let mut ars = adam_trainer(
        config.ars_model.init::<B>(device)?,
        config.trainer.clone(),
        ModelRole::AflatoxinRisk,
        device.clone(),
    )?;

    let mut batch_rng = ChaCha8Rng::seed_from_u64(config.trainer.seed);
    let mut order: Vec<usize> = (0..train.len()).collect();
    for _ in 0..config.trainer.epochs {
        order.shuffle(&mut batch_rng);
        shi.run_epoch(&train, &valid, &order)?;
        ars.run_epoch(&train, &valid, &order)?;
    }
    let shi_training = shi.finish();
    let ars_training = ars.finish();

    let best_shi = restore_best::<B::InnerBackend, _, _>(
        shi.into_best_model().valid(),
        &config.trainer,
        &shi_training,
        || config.shi_model.init::<B::InnerBackend>(device),
        device,
    )?;
    let best_ars = restore_best::<B::InnerBackend, _, _>(
        ars.into_best_model().valid(),
        &config.trainer,
        &ars_training,
        || config.ars_model.init::<B::InnerBackend>(device),
        device,
    )?;

    let batch_size = config.trainer.batch_size;
    let shi_test = RegressionReport::from_predictions(&evaluate_model::<B::InnerBackend, _, _>(&best_shi, &test, batch_size, device)?)?;
    let ars_test = RegressionReport::from_predictions(&evaluate_model::<B::InnerBackend, _, _>(&best_ars, &test, batch_size, device)?)?;
    info!("SHI test: {}", shi_test);
    info!("ARS test: {}", ars_test);

    Ok(SeedReport {
        splits: SplitSizes::from(&splits),
        mean_shi: dataset.mean_shi(),
        mean_ars: dataset.mean_ars(),
        shi_training,
        ars_training,
        shi_test,
        ars_test,
        finished_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// The persisted snapshot when one was written, else the in-memory best
fn restore_best<B, M, F>(
    in_memory: M,
    trainer: &TrainerConfig,
    summary: &TrainingSummary,
    fresh: F,
    device: &B::Device,
) -> Result<M>
where
    B: burn::tensor::backend::Backend,
    M: Module<B>,
    F: FnOnce() -> Result<M>,
{
    match (&trainer.checkpoint_dir, summary.best_epoch) {
        (Some(dir), Some(_)) => {
            let manager = CheckpointManager::new(dir.clone())?;
            let model = manager.load::<B, M>(fresh()?, summary.role, device)?;
            info!("Restored {} snapshot from {}", summary.role, manager.dir().display());
            Ok(model)
        }
        _ => Ok(in_memory),
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(AirsError::PathNotFound(path.to_path_buf()));
    }
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Write any report as pretty JSON
pub fn save_report<T: Serialize>(report: &T, path: impl AsRef<Path>) -> Result<()> {
    save_json(report, path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use tempfile::tempdir;

    #[test]
    fn test_default_configs_are_consistent() {
        CanopyExperimentConfig::default().validate().unwrap();
        SeedExperimentConfig::default().validate().unwrap();
    }

    #[test]
    fn test_mismatched_spectral_length_rejected() {
        let mut config = SeedExperimentConfig::with_spectral_length(200);
        config.generator.spectral_length = 300;
        assert!(matches!(config.validate(), Err(AirsError::Config(_))));
    }

    #[test]
    fn test_zero_validation_fraction_rejected() {
        let mut seed = SeedExperimentConfig::default();
        seed.split.validation_fraction = 0.0;
        assert!(matches!(seed.validate(), Err(AirsError::Config(_))));

        let mut canopy = CanopyExperimentConfig::default();
        canopy.split.validation_fraction = 0.0;
        assert!(matches!(canopy.validate(), Err(AirsError::Config(_))));
    }

    #[test]
    fn test_set_spectral_length_keeps_config_consistent() {
        let mut config = SeedExperimentConfig::with_spectral_length(200);
        config.trainer.epochs = 7;
        config.set_spectral_length(320);

        config.validate().unwrap();
        assert_eq!(config.generator.spectral_length, 320);
        assert_eq!(config.shi_model.spectral_length, 320);
        assert_eq!(config.ars_model.spectral_length, 320);
        assert_eq!(config.trainer.epochs, 7);
    }

    #[test]
    fn test_config_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seed.json");
        let config = SeedExperimentConfig::with_spectral_length(160);
        config.save(&path).unwrap();

        let loaded = SeedExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.generator.spectral_length, 160);
        assert_eq!(loaded.shi_model.spectral_length, 160);
        assert!(matches!(
            SeedExperimentConfig::load(dir.path().join("missing.json")),
            Err(AirsError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_small_seed_experiment() {
        let dir = tempdir().unwrap();
        let mut config = SeedExperimentConfig::with_spectral_length(128);
        config.num_samples = 40;
        config.trainer.epochs = 2;
        config.trainer.batch_size = 8;
        config.trainer.checkpoint_dir = Some(dir.path().to_path_buf());

        let report = run_seed_experiment::<TrainingBackend>(&config, &Default::default()).unwrap();

        assert_eq!(report.splits.train + report.splits.validation + report.splits.test, 40);
        assert_eq!(report.shi_training.history.len(), 2);
        assert_eq!(report.ars_training.history.len(), 2);
        assert!(report.shi_test.metrics.r2 <= 1.0);
        assert!((0.0..=100.0).contains(&report.ars_test.mean_prediction));
        assert!(dir.path().join("best_shi_model.mpk").exists());
        assert!(dir.path().join("best_ars_model.mpk").exists());
    }
}
