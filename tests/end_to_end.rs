//! End-to-end scenarios across generation, training and checkpoint reload

use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn_ndarray::NdArray;
use tempfile::tempdir;

use airs_gseed::dataset::{
    CanopyDataset, DatasetSplits, GeneratorConfig, SeedDataset, SeedFeatureDims, SplitConfig,
    SyntheticDataGenerator,
};
use airs_gseed::model::{CanopyStressClassifierConfig, ImageEncoderConfig, SeedHealthRegressorConfig};
use airs_gseed::training::{
    adam_trainer, evaluate_model, CheckpointManager, ModelRole, TrainerConfig,
};

type Backend = NdArray;
type TrainBackend = Autodiff<Backend>;

const SPECTRAL_LENGTH: usize = 301;

fn seed_dataset(n: usize) -> SeedDataset {
    let config = GeneratorConfig {
        spectral_length: SPECTRAL_LENGTH,
        ..GeneratorConfig::default()
    };
    let mut generator = SyntheticDataGenerator::with_config(config, 42).unwrap();
    SeedDataset::generate(&mut generator, n, SeedFeatureDims::default()).unwrap()
}

#[test]
fn seed_health_regressor_trains_and_reloads() {
    let dataset = seed_dataset(200);
    let splits = DatasetSplits::train_test(dataset.samples.len(), 0.3, 42).unwrap();
    assert_eq!(splits.train.len() + splits.test.len(), 200);
    assert!(splits.validation.is_empty());

    let train = dataset.subset(&splits.train).unwrap();
    let test = dataset.subset(&splits.test).unwrap();

    let dir = tempdir().unwrap();
    let config = TrainerConfig {
        epochs: 5,
        batch_size: 32,
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..TrainerConfig::seed_regressor()
    };
    let device = Default::default();
    let model_config = SeedHealthRegressorConfig::new(SPECTRAL_LENGTH);
    let model = model_config.init::<TrainBackend>(&device).unwrap();

    let mut trainer = adam_trainer(model, config.clone(), ModelRole::SeedHealth, device).unwrap();
    let summary = trainer.fit(&train, &test).unwrap();

    assert_eq!(summary.history.len(), 5);
    let last = summary.history.last().unwrap();
    assert!(last.validation_metric.is_finite());
    assert!(last.validation_metric <= 1.0);
    assert!(summary.best_metric.is_finite() && summary.best_metric <= 1.0);

    let best = trainer.into_best_model().valid();
    let manager = CheckpointManager::new(dir.path()).unwrap();
    let fresh = model_config.init::<Backend>(&device).unwrap();
    let reloaded = manager.load::<Backend, _>(fresh, ModelRole::SeedHealth, &device).unwrap();

    let probe = test.subset(&[0, 1, 2, 3]).unwrap();
    let expected = evaluate_model(&best, &probe, 4, &device).unwrap();
    let actual = evaluate_model(&reloaded, &probe, 4, &device).unwrap();
    assert_eq!(expected, actual);

    let metadata = manager.load_metadata(ModelRole::SeedHealth).unwrap();
    assert_eq!(Some(metadata.epoch), summary.best_epoch);
    assert!((metadata.metric_value - summary.best_metric).abs() < 1e-12);
}

#[test]
fn best_validation_metric_never_decreases() {
    let dataset = seed_dataset(60);
    let splits = DatasetSplits::random(60, &SplitConfig::default()).unwrap();
    let train = dataset.subset(&splits.train).unwrap();
    let valid = dataset.subset(&splits.validation).unwrap();

    let device = Default::default();
    let model = SeedHealthRegressorConfig::new(SPECTRAL_LENGTH)
        .init::<TrainBackend>(&device)
        .unwrap();
    let config = TrainerConfig {
        epochs: 4,
        batch_size: 16,
        ..TrainerConfig::seed_regressor()
    };
    let mut trainer = adam_trainer(model, config, ModelRole::SeedHealth, device).unwrap();
    let summary = trainer.fit(&train, &valid).unwrap();

    let bests: Vec<f64> = summary.history.iter().map(|r| r.best_metric).collect();
    assert!(bests.windows(2).all(|w| w[1] >= w[0]));
    for record in &summary.history {
        assert!(record.best_metric >= record.validation_metric || !record.validation_metric.is_finite());
    }
}

#[test]
fn canopy_classifier_runs_on_stratified_split() {
    let image_size = 16;
    let config = GeneratorConfig {
        image_size,
        ..GeneratorConfig::default()
    };
    let mut generator = SyntheticDataGenerator::with_config(config, 42).unwrap();
    let dataset = CanopyDataset::generate(&mut generator, 40).unwrap();
    let labels = dataset.labels();
    let splits = DatasetSplits::stratified(&labels, &SplitConfig::default()).unwrap();

    let train = dataset.subset(&splits.train).unwrap();
    let valid = dataset.subset(&splits.validation).unwrap();

    let device = Default::default();
    let model = CanopyStressClassifierConfig::new()
        .with_encoder(
            ImageEncoderConfig::new()
                .with_image_size(image_size)
                .with_patch_size(4)
                .with_base_filters(4)
                .with_embed_dim(16)
                .with_num_heads(2)
                .with_num_layers(1)
                .with_feedforward_dim(32),
        )
        .init::<TrainBackend>(&device)
        .unwrap();
    let config = TrainerConfig {
        epochs: 2,
        batch_size: 8,
        ..TrainerConfig::canopy()
    };

    let mut trainer = adam_trainer(model, config, ModelRole::Canopy, device).unwrap();
    let summary = trainer.fit(&train, &valid).unwrap();

    assert_eq!(summary.history.len(), 2);
    assert!((0.0..=1.0).contains(&summary.best_metric));
}
