//! Dataset module: synthetic generation, records, splits and batching
//!
//! This module provides functionality for:
//! - Seeded synthetic generation of every modality (imagery, spectra, sensor streams)
//! - Named sample records for the canopy and seed tasks
//! - Stratified and random train/validation/test partitioning
//! - Burn batchers that collate records into tensors
//! - Tabular seed-quality records and their closed-form indices

pub mod batcher;
pub mod generator;
pub mod quality;
pub mod records;
pub mod split;
pub mod timeseries;

pub use batcher::{CanopyBatch, CanopyBatcher, SeedBatch, SeedBatcher};
pub use generator::{
    GeneratorConfig, ImageSet, SeedLabels, SpectralSet, SyntheticDataGenerator,
    MAX_ABSORPTION_WINDOW_NM,
};
pub use quality::{load_quality_csv, MissingValuePolicy, QualitySummary, SeedQualityRecord};
pub use records::{
    aflatoxin_risk_score, seed_health_index, CanopyDataset, CanopySample, SeedDataset,
    SeedFeatureDims, SeedSample,
};
pub use split::{DatasetSplits, SplitConfig};
pub use timeseries::{SoilSeries, StorageSeries, WeatherDay};
