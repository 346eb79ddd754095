//! Generic training loop for the fusion models.
//!
//! One `Trainer` drives one model with its own optimizer and scheduler:
//! shuffled training batches with one optimizer step each, a validation pass
//! on the non-autodiff backend, a plateau check on the training loss, and a
//! snapshot whenever the validation metric strictly improves.

use std::marker::PhantomData;
use std::path::PathBuf;

use burn::data::dataset::Dataset;
use burn::module::{AutodiffModule, Module, ModuleVisitor, ParamId};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpoint::{CheckpointManager, CheckpointMetadata, ModelRole};
use super::fusion::{FusionModel, Predictions};
use super::scheduler::{LearningRateScheduler, SchedulerType};
use crate::utils::error::{AirsError, Result, ResultExt};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::RunningAverage;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Seed of the epoch shuffling stream
    pub seed: u64,
    pub scheduler: SchedulerType,
    /// Where best snapshots are written; `None` keeps them in memory only
    pub checkpoint_dir: Option<PathBuf>,
    /// Show an indicatif bar per epoch
    pub show_progress: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self::seed_regressor()
    }
}

impl TrainerConfig {
    /// Canopy classifier protocol: Adam 1e-4, plateau patience 5
    pub fn canopy() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-4,
            weight_decay: 1e-5,
            seed: 42,
            scheduler: SchedulerType::plateau(0.5, 5),
            checkpoint_dir: None,
            show_progress: false,
        }
    }

    /// SHI/ARS regressor protocol: Adam 1e-3, plateau patience 10
    pub fn seed_regressor() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            weight_decay: 1e-5,
            seed: 42,
            scheduler: SchedulerType::plateau(0.5, 10),
            checkpoint_dir: None,
            show_progress: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AirsError::Config("batch_size must be positive".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(AirsError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.weight_decay < 0.0 {
            return Err(AirsError::Config("weight_decay must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Lifecycle of a model under a trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelPhase {
    Untrained,
    Training,
    Evaluating,
}

/// Per-epoch log line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub epoch: usize,
    pub train_loss: f64,
    /// Accuracy (classifier) or R² (regressors)
    pub validation_metric: f64,
    pub learning_rate: f64,
    /// Best validation metric up to and including this epoch
    pub best_metric: f64,
    pub is_best: bool,
}

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub role: ModelRole,
    pub history: Vec<TrainingRecord>,
    pub best_metric: f64,
    pub best_epoch: Option<usize>,
}

/// Adam with optional decoupled weight decay
pub fn adam<B: AutodiffBackend, M: AutodiffModule<B>>(weight_decay: f64) -> impl Optimizer<M, B> {
    let mut config = AdamConfig::new();
    if weight_decay > 0.0 {
        config = config.with_weight_decay(Some(WeightDecayConfig::new(weight_decay as f32)));
    }
    config.init()
}

/// Trainer for one fusion model
pub struct Trainer<B: AutodiffBackend, M, O> {
    model: M,
    best_model: Option<M>,
    optimizer: O,
    scheduler: LearningRateScheduler,
    config: TrainerConfig,
    role: ModelRole,
    phase: ModelPhase,
    history: Vec<TrainingRecord>,
    best_metric: f64,
    best_epoch: Option<usize>,
    checkpoints: Option<CheckpointManager>,
    logger: TrainingLogger,
    rng: ChaCha8Rng,
    device: B::Device,
}

/// Build a trainer using Adam with the config's weight decay
pub fn adam_trainer<B, M>(
    model: M,
    config: TrainerConfig,
    role: ModelRole,
    device: B::Device,
) -> Result<Trainer<B, M, impl Optimizer<M, B>>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + FusionModel<B>,
    M::InnerModule: FusionModel<B::InnerBackend, Item = M::Item>,
{
    let optimizer = adam::<B, M>(config.weight_decay);
    Trainer::new(model, optimizer, config, role, device)
}

impl<B, M, O> Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + FusionModel<B>,
    M::InnerModule: FusionModel<B::InnerBackend, Item = M::Item>,
    O: Optimizer<M, B>,
{
    pub fn new(
        model: M,
        optimizer: O,
        config: TrainerConfig,
        role: ModelRole,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let checkpoints = match &config.checkpoint_dir {
            Some(dir) => Some(CheckpointManager::new(dir.clone())?),
            None => None,
        };

        info!(
            "[{}] trainer ready: {} parameters, lr {:.1e}, batch {}",
            role,
            model.num_params(),
            config.learning_rate,
            config.batch_size
        );

        Ok(Self {
            model,
            best_model: None,
            optimizer,
            scheduler: LearningRateScheduler::new(config.scheduler.clone(), config.learning_rate),
            logger: TrainingLogger::new(role.short_name(), role.metric_name(), config.epochs),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            role,
            phase: ModelPhase::Untrained,
            history: Vec::new(),
            best_metric: f64::NEG_INFINITY,
            best_epoch: None,
            checkpoints,
            device,
        })
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    pub fn phase(&self) -> ModelPhase {
        self.phase
    }

    pub fn history(&self) -> &[TrainingRecord] {
        &self.history
    }

    /// Best validation metric so far, `-inf` before the first epoch
    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }

    pub fn learning_rate(&self) -> f64 {
        self.scheduler.get_lr()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Best snapshot, or the current parameters if no epoch finished yet
    pub fn best_model(&self) -> &M {
        self.best_model.as_ref().unwrap_or(&self.model)
    }

    pub fn into_best_model(self) -> M {
        self.best_model.unwrap_or(self.model)
    }

    /// A fresh shuffled order of `n` training indices from the trainer's stream
    pub fn shuffled_order(&mut self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);
        order
    }

    /// Train for the configured number of epochs
    pub fn fit<DT, DV>(&mut self, train: &DT, valid: &DV) -> Result<TrainingSummary>
    where
        DT: Dataset<M::Item>,
        DV: Dataset<M::Item>,
    {
        for _ in 0..self.config.epochs {
            let order = self.shuffled_order(train.len());
            self.run_epoch(train, valid, &order)?;
        }
        Ok(self.finish())
    }

    /// Log completion and return the run's summary
    pub fn finish(&self) -> TrainingSummary {
        self.logger.log_complete(self.best_metric);
        TrainingSummary {
            role: self.role,
            history: self.history.clone(),
            best_metric: self.best_metric,
            best_epoch: self.best_epoch,
        }
    }

    /// One epoch over `train` in the given index order, then validation.
    ///
    /// Several trainers can be driven with the same `order` to share one batch
    /// cadence while keeping their parameters and optimizers apart.
    pub fn run_epoch<DT, DV>(&mut self, train: &DT, valid: &DV, order: &[usize]) -> Result<TrainingRecord>
    where
        DT: Dataset<M::Item>,
        DV: Dataset<M::Item>,
    {
        if train.is_empty() {
            return Err(AirsError::Training("training set is empty".to_string()));
        }
        let epoch = self.history.len();
        self.phase = ModelPhase::Training;
        self.logger.start_epoch(epoch);

        let train_loss = self.train_pass(train, order, epoch)?;

        self.phase = ModelPhase::Evaluating;
        let predictions = self.evaluate(valid)?;
        let metric = predictions.validation_metric();
        let learning_rate = self.scheduler.get_lr();

        let is_best = metric.is_finite() && metric > self.best_metric;
        if is_best {
            self.best_metric = metric;
            self.best_epoch = Some(epoch);
            self.best_model = Some(self.model.clone());
            self.logger.log_new_best(metric);

            if let Some(manager) = &self.checkpoints {
                let metadata = CheckpointMetadata::new(
                    self.role,
                    epoch,
                    metric,
                    train_loss,
                    learning_rate,
                    self.model.num_params(),
                );
                manager.save::<B, M>(&self.model, &metadata)?;
            }
        } else if !metric.is_finite() {
            warn!("[{}] non-finite validation metric at epoch {}", self.role, epoch + 1);
        }

        if let Some((old_lr, new_lr)) = self.scheduler.step_with_metric(train_loss) {
            self.logger.log_lr_reduced(old_lr, new_lr);
        }

        self.logger.end_epoch(train_loss, metric, learning_rate, is_best);
        let record = TrainingRecord {
            epoch,
            train_loss,
            validation_metric: metric,
            learning_rate,
            best_metric: self.best_metric,
            is_best,
        };
        self.history.push(record);
        Ok(record)
    }

    fn train_pass<D: Dataset<M::Item>>(&mut self, train: &D, order: &[usize], epoch: usize) -> Result<f64> {
        let batch_size = self.config.batch_size;
        let num_batches = order.len().div_ceil(batch_size);
        let progress = self.progress_bar(num_batches, epoch);
        let mut average = RunningAverage::new();
        let lr = self.scheduler.get_lr();

        for (batch_idx, chunk) in order.chunks(batch_size).enumerate() {
            let items = chunk
                .iter()
                .map(|&i| {
                    train.get(i).with_context(|| {
                        format!("batch {} references sample {} of {}", batch_idx, i, train.len())
                    })
                })
                .collect::<Result<Vec<M::Item>>>()?;
            let n_items = items.len();

            let batch = self.model.collate(items, &self.device);
            let loss = self.model.loss(batch)?;
            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                progress.abandon();
                return Err(AirsError::NonFiniteLoss {
                    epoch,
                    batch: batch_idx,
                    value: loss_value,
                });
            }

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            if !gradients_are_finite::<B, M>(&self.model, &grads) {
                progress.abandon();
                return Err(AirsError::NonFiniteGradient {
                    epoch,
                    batch: batch_idx,
                });
            }
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            average.update(loss_value, n_items);
            progress.inc(1);
            if (batch_idx + 1) % 10 == 0 {
                debug!(
                    "[{}] batch {}/{}: loss = {:.4}",
                    self.role,
                    batch_idx + 1,
                    num_batches,
                    loss_value
                );
            }
        }

        progress.finish_and_clear();
        Ok(average.average())
    }

    /// Predict a whole dataset in fixed order with the current parameters
    /// on the inner backend (dropout off, no gradients)
    pub fn evaluate<D: Dataset<M::Item>>(&self, data: &D) -> Result<Predictions> {
        evaluate_model::<B::InnerBackend, _, _>(&self.model.valid(), data, self.config.batch_size, &self.device)
    }

    fn progress_bar(&self, num_batches: usize, epoch: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(num_batches as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} batches")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(format!("{} epoch {}", self.role, epoch + 1));
        bar
    }
}

/// Visits every float parameter and looks up its gradient
struct GradientFiniteness<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    finite: bool,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientFiniteness<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if !self.finite {
            return;
        }
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            let total: f64 = grad.abs().sum().into_scalar().elem();
            self.finite = total.is_finite();
        }
    }
}

/// True when no gradient of `model` holds NaN or infinity
pub fn gradients_are_finite<B: AutodiffBackend, M: Module<B>>(model: &M, grads: &GradientsParams) -> bool {
    let mut check = GradientFiniteness::<B> {
        grads,
        finite: true,
        _backend: PhantomData,
    };
    model.visit(&mut check);
    check.finite
}

/// Predict every sample of `data` in order with an evaluation-mode model
pub fn evaluate_model<B, M, D>(model: &M, data: &D, batch_size: usize, device: &B::Device) -> Result<Predictions>
where
    B: burn::tensor::backend::Backend,
    M: FusionModel<B>,
    D: Dataset<M::Item>,
{
    if data.is_empty() {
        return Err(AirsError::Training("evaluation set is empty".to_string()));
    }
    let batch_size = batch_size.max(1);

    let mut all: Option<Predictions> = None;
    let mut start = 0;
    while start < data.len() {
        let end = (start + batch_size).min(data.len());
        let items = (start..end)
            .map(|i| data.get(i).with_context(|| format!("evaluation sample {} is missing", i)))
            .collect::<Result<Vec<M::Item>>>()?;
        let predictions = model.predict(model.collate(items, device))?;
        match all.as_mut() {
            Some(acc) => acc.merge(predictions)?,
            None => all = Some(predictions),
        }
        start = end;
    }

    all.ok_or_else(|| AirsError::Training("evaluation produced no predictions".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::generator::{GeneratorConfig, SyntheticDataGenerator};
    use crate::dataset::records::{SeedDataset, SeedFeatureDims};
    use crate::model::{SeedHealthRegressor, SeedHealthRegressorConfig};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = Autodiff<NdArray>;

    const DIMS: SeedFeatureDims = SeedFeatureDims {
        uav: 6,
        environment: 3,
        field: 5,
        storage: 2,
    };

    fn dataset(n: usize, seed: u64) -> SeedDataset {
        let config = GeneratorConfig {
            spectral_length: 120,
            ..GeneratorConfig::default()
        };
        let mut generator = SyntheticDataGenerator::with_config(config, seed).unwrap();
        SeedDataset::generate(&mut generator, n, DIMS).unwrap()
    }

    fn model() -> SeedHealthRegressor<TestBackend> {
        SeedHealthRegressorConfig::new(120)
            .with_uav_dim(DIMS.uav)
            .with_environment_dim(DIMS.environment)
            .init(&Default::default())
            .unwrap()
    }

    fn config(epochs: usize) -> TrainerConfig {
        TrainerConfig {
            epochs,
            batch_size: 8,
            ..TrainerConfig::seed_regressor()
        }
    }

    #[test]
    fn test_fit_records_history_and_monotonic_best() {
        let train = dataset(32, 1);
        let valid = dataset(12, 2);
        let mut trainer = adam_trainer(model(), config(3), ModelRole::SeedHealth, Default::default()).unwrap();
        assert_eq!(trainer.phase(), ModelPhase::Untrained);

        let summary = trainer.fit(&train, &valid).unwrap();

        assert_eq!(summary.history.len(), 3);
        assert_eq!(trainer.phase(), ModelPhase::Evaluating);
        assert!(summary.best_epoch.is_some());
        assert!(summary.best_metric.is_finite() && summary.best_metric <= 1.0);

        let mut previous = f64::NEG_INFINITY;
        for record in &summary.history {
            assert!(record.train_loss.is_finite());
            assert!(record.best_metric >= previous);
            previous = record.best_metric;
        }
        assert_eq!(previous, summary.best_metric);
    }

    #[test]
    fn test_snapshot_written_on_improvement() {
        let dir = tempdir().unwrap();
        let train = dataset(16, 3);
        let valid = dataset(8, 4);
        let config = TrainerConfig {
            checkpoint_dir: Some(dir.path().to_path_buf()),
            ..config(1)
        };
        let mut trainer = adam_trainer(model(), config, ModelRole::SeedHealth, Default::default()).unwrap();
        trainer.fit(&train, &valid).unwrap();

        assert!(dir.path().join("best_shi_model.mpk").exists());
        assert!(dir.path().join("best_shi_model.json").exists());
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let mut train = dataset(8, 5);
        for sample in train.samples.iter_mut() {
            sample.shi = f32::NAN;
        }
        let valid = dataset(4, 6);
        let mut trainer = adam_trainer(model(), config(1), ModelRole::SeedHealth, Default::default()).unwrap();

        match trainer.fit(&train, &valid) {
            Err(AirsError::NonFiniteLoss { epoch, batch, .. }) => {
                assert_eq!(epoch, 0);
                assert_eq!(batch, 0);
            }
            other => panic!("expected a non-finite loss error, got {:?}", other.map(|s| s.best_metric)),
        }
    }

    #[test]
    fn test_nan_feature_aborts_training() {
        let mut train = dataset(8, 10);
        train.samples[3].uav_features[0] = f32::NAN;
        let valid = dataset(4, 11);
        let mut trainer = adam_trainer(model(), config(1), ModelRole::SeedHealth, Default::default()).unwrap();

        match trainer.run_epoch(&train, &valid, &[0, 1, 2, 3, 4, 5, 6, 7]) {
            Err(AirsError::NonFiniteLoss { batch, .. }) | Err(AirsError::NonFiniteGradient { batch, .. }) => {
                assert_eq!(batch, 0)
            }
            other => panic!("expected a divergence error, got {:?}", other),
        }
        assert!(trainer.history().is_empty());
    }

    #[test]
    fn test_gradient_check_spots_nan() {
        let device = Default::default();
        let model = model();
        let batch = model.collate(dataset(4, 12).samples, &device);
        let loss = model.loss(batch).unwrap();
        let mut grads = GradientsParams::from_grads(loss.backward(), &model);
        assert!(gradients_are_finite::<TestBackend, _>(&model, &grads));

        let weight = &model.head.layers[0].weight;
        let poisoned = Tensor::<NdArray, 2>::full(weight.val().dims(), f32::NAN, &device);
        grads.register::<NdArray, 2>(weight.id, poisoned);
        assert!(!gradients_are_finite::<TestBackend, _>(&model, &grads));
    }

    #[test]
    fn test_run_epoch_rejects_bad_order() {
        let train = dataset(4, 7);
        let valid = dataset(4, 8);
        let mut trainer = adam_trainer(model(), config(1), ModelRole::SeedHealth, Default::default()).unwrap();
        match trainer.run_epoch(&train, &valid, &[0, 1, 9]) {
            Err(AirsError::Dataset(msg)) => assert!(msg.contains("sample 9 of 4"), "{}", msg),
            other => panic!("expected a dataset error, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_preserves_order() {
        let valid = dataset(5, 9);
        let trainer = adam_trainer(model(), config(1), ModelRole::SeedHealth, Default::default()).unwrap();
        match trainer.evaluate(&valid).unwrap() {
            Predictions::Scores { predicted, targets } => {
                assert_eq!(predicted.len(), 5);
                let expected: Vec<f64> = valid.samples.iter().map(|s| s.shi as f64).collect();
                assert_eq!(targets, expected);
                assert!(predicted.iter().all(|p| (0.0..=100.0).contains(p)));
            }
            other => panic!("unexpected predictions {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config() {
        let bad = TrainerConfig {
            batch_size: 0,
            ..TrainerConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
