//! # AIRS-GSeed Multi-Modal Fusion Modeling
//!
//! A Rust library for agricultural monitoring models built with the Burn framework:
//! canopy stress detection from imagery, and seed health / aflatoxin risk
//! prediction from hyperspectral spectra fused with sensor features.
//!
//! ## Features
//!
//! - **Synthetic multi-modal data** from one seeded stream per generator
//!   (RGB, multispectral and thermal imagery, spectra, soil/storage/weather series)
//! - **Fusion models**: a hybrid convolution + attention canopy classifier and
//!   two bounded-score regressors (SHI, ARS)
//! - **Training loop** with plateau LR reduction, best snapshots, and divergence checks
//! - **Seed-quality indices** computed from tabular CSV records
//!
//! ## Modules
//!
//! - `dataset`: Generation, sample records, splits, batchers and CSV quality records
//! - `model`: Encoders and fusion models
//! - `training`: Trainer, checkpoints, evaluation reports and experiment pipelines
//! - `utils`: Errors, logging and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use airs_gseed::backend::{default_device, TrainingBackend};
//! use airs_gseed::training::{run_seed_experiment, SeedExperimentConfig};
//!
//! let config = SeedExperimentConfig::default();
//! let report = run_seed_experiment::<TrainingBackend>(&config, &default_device())?;
//! println!("SHI test R²: {:.3}", report.shi_test.metrics.r2);
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    CanopyDataset, CanopySample, DatasetSplits, GeneratorConfig, SeedDataset, SeedSample,
    SplitConfig, SyntheticDataGenerator,
};
pub use model::{
    AflatoxinRiskRegressor, CanopyStressClassifier, SeedHealthRegressor,
};
pub use training::{
    CheckpointManager, FusionModel, ModelRole, Trainer, TrainerConfig, TrainingRecord,
};
pub use utils::error::{AirsError, Result};
pub use utils::metrics::{ClassificationMetrics, ConfusionMatrix, RegressionMetrics};

/// Default seed for generation, splitting and shuffling
pub const DEFAULT_SEED: u64 = 42;

/// SHI at or above which a seed lot counts as good quality
pub const QUALITY_THRESHOLD: f64 = 70.0;

/// ARS at or above which a seed lot counts as high risk
pub const HIGH_RISK_THRESHOLD: f64 = 40.0;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
