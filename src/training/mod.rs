//! Training module for the fusion models
//!
//! This module provides:
//! - The `FusionModel` contract shared by the classifier and both regressors
//! - A generic training loop with plateau learning-rate reduction
//! - Role-named best snapshots with JSON metadata
//! - Held-out evaluation reports and end-to-end experiment pipelines
//!
//! ## Epoch Protocol
//!
//! 1. Iterate all training batches once in shuffled order, one optimizer step each
//! 2. Iterate all validation batches once in fixed order without gradients
//! 3. Reduce the learning rate if the training loss has plateaued
//! 4. Snapshot the parameters when the validation metric strictly improves

pub mod checkpoint;
pub mod evaluator;
pub mod fusion;
pub mod pipeline;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{CheckpointManager, CheckpointMetadata, ModelRole};
pub use evaluator::{ClassificationReport, RegressionReport};
pub use fusion::{FusionModel, Predictions};
pub use pipeline::{
    run_canopy_experiment, run_seed_experiment, save_report, CanopyExperimentConfig,
    CanopyReport, SeedExperimentConfig, SeedReport, SplitSizes,
};
pub use scheduler::{LearningRateScheduler, SchedulerType};
pub use trainer::{
    adam, adam_trainer, evaluate_model, ModelPhase, Trainer, TrainerConfig, TrainingRecord,
    TrainingSummary,
};
