//! Named sample records and the datasets built from them
//!
//! A canopy sample pairs one RGB image with its disease label. A seed sample
//! bundles a hyperspectral spectrum, four tabular feature vectors and the two
//! bounded targets derived from the generator's ground truth.

use burn::data::dataset::Dataset;
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::generator::{SeedLabels, SyntheticDataGenerator};
use crate::utils::error::{AirsError, Result};

/// Upper bound of both composite scores
pub const SCORE_MAX: f64 = 100.0;

/// Seed-Health-Index from ground-truth labels: 0.7 × germination + 30 when no
/// fungus is present, clipped to [0, 100]
pub fn seed_health_index(labels: &SeedLabels) -> f64 {
    (labels.germination_rate * 0.7 + (1.0 - labels.fungal_flag()) * 30.0).clamp(0.0, SCORE_MAX)
}

/// Aflatoxin-Risk-Score from ground-truth labels: 15 × ln(ppb + 1), clipped to [0, 100]
pub fn aflatoxin_risk_score(labels: &SeedLabels) -> f64 {
    ((labels.aflatoxin_ppb + 1.0).ln() * 15.0).clamp(0.0, SCORE_MAX)
}

/// One RGB canopy image and its label
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanopySample {
    /// Flattened CHW image [3 * H * W], values in [0, 1]
    pub image: Vec<f32>,
    /// 1 for diseased, 0 for healthy
    pub label: usize,
}

/// Canopy classification dataset
#[derive(Clone, Debug)]
pub struct CanopyDataset {
    pub image_size: usize,
    pub samples: Vec<CanopySample>,
}

impl CanopyDataset {
    /// Generate `n` RGB images with the generator's disease rate
    pub fn generate(generator: &mut SyntheticDataGenerator, n: usize) -> Result<Self> {
        let set = generator.generate_rgb_images(n)?;
        let samples = set
            .images
            .into_iter()
            .zip(set.labels)
            .map(|(image, label)| CanopySample { image, label })
            .collect();

        let dataset = Self {
            image_size: set.size,
            samples,
        };
        info!(
            "Canopy dataset: {} images, class counts {:?}",
            dataset.samples.len(),
            dataset.class_counts(2)
        );
        Ok(dataset)
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for sample in &self.samples {
            if sample.label < num_classes {
                counts[sample.label] += 1;
            }
        }
        counts
    }

    /// Copy of the samples at `indices`
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        Ok(Self {
            image_size: self.image_size,
            samples: pick(&self.samples, indices)?,
        })
    }
}

impl Dataset<CanopySample> for CanopyDataset {
    fn get(&self, index: usize) -> Option<CanopySample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Lengths of the tabular feature vectors attached to every seed sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFeatureDims {
    pub uav: usize,
    pub environment: usize,
    pub field: usize,
    pub storage: usize,
}

impl Default for SeedFeatureDims {
    fn default() -> Self {
        Self {
            uav: 128,
            environment: 10,
            field: 50,
            storage: 4,
        }
    }
}

/// One seed lot: spectrum, tabular context and bounded targets
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedSample {
    pub spectrum: Vec<f32>,
    pub uav_features: Vec<f32>,
    pub environment_features: Vec<f32>,
    pub field_features: Vec<f32>,
    pub storage_features: Vec<f32>,
    /// Seed-Health-Index target in [0, 100]
    pub shi: f32,
    /// Aflatoxin-Risk-Score target in [0, 100]
    pub ars: f32,
    /// Raw labels the targets were derived from
    pub labels: SeedLabels,
}

/// Seed health / aflatoxin regression dataset
#[derive(Clone, Debug)]
pub struct SeedDataset {
    pub spectral_length: usize,
    pub dims: SeedFeatureDims,
    pub samples: Vec<SeedSample>,
}

impl SeedDataset {
    /// Generate `n` seed samples.
    ///
    /// Spectra and labels come from the hyperspectral generator; the UAV,
    /// environment, field and storage vectors are standard-normal context
    /// features drawn from the same seeded stream.
    pub fn generate(
        generator: &mut SyntheticDataGenerator,
        n: usize,
        dims: SeedFeatureDims,
    ) -> Result<Self> {
        if dims.uav == 0 || dims.environment == 0 || dims.field == 0 || dims.storage == 0 {
            return Err(AirsError::Config(format!(
                "seed feature dimensions must be positive: {:?}",
                dims
            )));
        }

        let set = generator.generate_hyperspectral(n)?;
        let spectral_length = set.wavelengths.len();

        let mut samples = Vec::with_capacity(n);
        for (spectrum, labels) in set.spectra.into_iter().zip(set.labels) {
            samples.push(SeedSample {
                spectrum,
                uav_features: standard_normal(generator, dims.uav),
                environment_features: standard_normal(generator, dims.environment),
                field_features: standard_normal(generator, dims.field),
                storage_features: standard_normal(generator, dims.storage),
                shi: seed_health_index(&labels) as f32,
                ars: aflatoxin_risk_score(&labels) as f32,
                labels,
            });
        }

        let dataset = Self {
            spectral_length,
            dims,
            samples,
        };
        info!(
            "Seed dataset: {} samples, mean SHI {:.1}, mean ARS {:.1}",
            dataset.samples.len(),
            dataset.mean_shi(),
            dataset.mean_ars()
        );
        Ok(dataset)
    }

    pub fn mean_shi(&self) -> f64 {
        mean(self.samples.iter().map(|s| s.shi as f64))
    }

    pub fn mean_ars(&self) -> f64 {
        mean(self.samples.iter().map(|s| s.ars as f64))
    }

    /// Copy of the samples at `indices`
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        Ok(Self {
            spectral_length: self.spectral_length,
            dims: self.dims,
            samples: pick(&self.samples, indices)?,
        })
    }
}

impl Dataset<SeedSample> for SeedDataset {
    fn get(&self, index: usize) -> Option<SeedSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

fn standard_normal(generator: &mut SyntheticDataGenerator, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|_| generator.rng.sample::<f32, _>(StandardNormal))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn pick<T: Clone>(samples: &[T], indices: &[usize]) -> Result<Vec<T>> {
    indices
        .iter()
        .map(|&i| {
            samples.get(i).cloned().ok_or_else(|| {
                AirsError::Dataset(format!(
                    "index {} out of bounds for {} samples",
                    i,
                    samples.len()
                ))
            })
        })
        .collect()
}
