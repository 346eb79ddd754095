//! Dataset partitioning into train / validation / test
//!
//! ## Split Strategy
//!
//! 1. **Test Set (20%)** - held out until the best snapshot is evaluated
//! 2. **Validation Set (20% of the rest)** - scored every epoch to pick the best snapshot
//! 3. **Train Set (remaining ~64%)**
//!
//! Classification data is split per class so every partition keeps the class
//! proportions of the full set; regression data is split uniformly at random.
//! Splits are deterministic for a given seed.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{AirsError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of all samples held out for testing
    pub test_fraction: f64,
    /// Fraction of the non-test samples used for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("test_fraction", self.test_fraction),
            ("validation_fraction", self.validation_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(AirsError::Config(format!(
                    "{} must be within [0, 1), got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Like `validate`, but validation and test partitions must both be requested
    pub fn validate_three_way(&self) -> Result<()> {
        self.validate()?;
        for (name, value) in [
            ("test_fraction", self.test_fraction),
            ("validation_fraction", self.validation_fraction),
        ] {
            if value <= 0.0 {
                return Err(AirsError::Config(format!(
                    "{} must be positive for a train/validation/test split, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Index partition of one dataset; the three lists are disjoint and together
/// cover every sample exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl DatasetSplits {
    /// Uniform random split of `n` samples
    pub fn random(n: usize, config: &SplitConfig) -> Result<Self> {
        config.validate()?;
        ensure_non_empty(n)?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let all: Vec<usize> = (0..n).collect();
        let (rest, test) = random_holdout(all, config.test_fraction, &mut rng);
        let (train, validation) = random_holdout(rest, config.validation_fraction, &mut rng);

        Self::finish(train, validation, test)
    }

    /// Class-stratified split of a labelled dataset
    pub fn stratified(labels: &[usize], config: &SplitConfig) -> Result<Self> {
        config.validate()?;
        ensure_non_empty(labels.len())?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let all: Vec<usize> = (0..labels.len()).collect();
        let (rest, test) = stratified_holdout(&all, labels, config.test_fraction, &mut rng);
        let (train, validation) =
            stratified_holdout(&rest, labels, config.validation_fraction, &mut rng);

        Self::finish(train, validation, test)
    }

    /// Two-way random split with an empty validation partition
    pub fn train_test(n: usize, test_fraction: f64, seed: u64) -> Result<Self> {
        let config = SplitConfig {
            test_fraction,
            validation_fraction: 0.0,
            seed,
        };
        Self::random(n, &config)
    }

    fn finish(mut train: Vec<usize>, mut validation: Vec<usize>, mut test: Vec<usize>) -> Result<Self> {
        if train.is_empty() {
            return Err(AirsError::Dataset(
                "split leaves no samples for training".to_string(),
            ));
        }
        train.sort_unstable();
        validation.sort_unstable();
        test.sort_unstable();
        Ok(Self {
            train,
            validation,
            test,
        })
    }

    /// Total number of indices across partitions
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// Fraction of each class within a partition
    pub fn class_proportions(indices: &[usize], labels: &[usize], num_classes: usize) -> Vec<f64> {
        let mut counts = vec![0usize; num_classes];
        for &i in indices {
            if let Some(&label) = labels.get(i) {
                if label < num_classes {
                    counts[label] += 1;
                }
            }
        }
        counts
            .into_iter()
            .map(|c| {
                if indices.is_empty() {
                    0.0
                } else {
                    c as f64 / indices.len() as f64
                }
            })
            .collect()
    }
}

impl std::fmt::Display for DatasetSplits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.total().max(1) as f64;
        write!(
            f,
            "train: {} ({:.1}%) | validation: {} ({:.1}%) | test: {} ({:.1}%)",
            self.train.len(),
            100.0 * self.train.len() as f64 / total,
            self.validation.len(),
            100.0 * self.validation.len() as f64 / total,
            self.test.len(),
            100.0 * self.test.len() as f64 / total,
        )
    }
}

fn ensure_non_empty(n: usize) -> Result<()> {
    if n == 0 {
        return Err(AirsError::Dataset("cannot split an empty dataset".to_string()));
    }
    Ok(())
}

fn holdout_count(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).round() as usize).min(n)
}

/// Returns (kept, held_out)
fn random_holdout(mut indices: Vec<usize>, fraction: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    indices.shuffle(rng);
    let held = indices.split_off(indices.len() - holdout_count(indices.len(), fraction));
    (indices, held)
}

/// Per-class holdout; classes are visited in label order for determinism
fn stratified_holdout(
    indices: &[usize],
    labels: &[usize],
    fraction: f64,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &i in indices {
        by_class.entry(labels[i]).or_default().push(i);
    }

    let mut kept = Vec::with_capacity(indices.len());
    let mut held = Vec::new();
    for (_, class_indices) in by_class {
        let (k, h) = random_holdout(class_indices, fraction, rng);
        kept.extend(k);
        held.extend(h);
    }
    (kept, held)
}
