//! Fusion model family built with the Burn framework
//!
//! This module provides:
//! - Per-modality encoders (hybrid image, 1-D spectral, tabular)
//! - `CanopyStressClassifier`: image-only class logits
//! - `SeedHealthRegressor` and `AflatoxinRiskRegressor`: multi-modal scores in [0, 100]
//! - Validated `Config` structs for all of them

pub mod canopy;
pub mod config;
pub mod encoders;
pub mod seed;

pub use canopy::CanopyStressClassifier;
pub use config::{
    AflatoxinRiskRegressorConfig, CanopyStressClassifierConfig, ImageEncoderConfig, MlpConfig,
    SeedHealthRegressorConfig, SpectralEncoderConfig,
};
pub use encoders::{ImageEncoder, Mlp, SpectralEncoder, TabularEncoder};
pub use seed::{bounded_score, AflatoxinRiskRegressor, SeedHealthRegressor};
