//! The contract between the generic trainer and the fusion models
//!
//! A `FusionModel` knows how to collate its sample records, compute its
//! training loss, and turn a batch into host-side predictions. The trainer
//! never looks inside the model beyond this trait.

use burn::data::dataloader::batcher::Batcher;
use burn::module::Module;
use burn::nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction};
use burn::tensor::{backend::Backend, Int, Tensor};

use crate::dataset::{CanopyBatch, CanopyBatcher, CanopySample, SeedBatch, SeedBatcher, SeedSample};
use crate::model::{AflatoxinRiskRegressor, CanopyStressClassifier, SeedHealthRegressor};
use crate::utils::error::{AirsError, Result};
use crate::utils::metrics::r2_score;

/// Host-side predictions of one or more batches
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    Classes {
        predicted: Vec<usize>,
        targets: Vec<usize>,
        /// Probability of class 1 per sample
        positive_scores: Vec<f64>,
    },
    Scores {
        predicted: Vec<f64>,
        targets: Vec<f64>,
    },
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Classes { targets, .. } => targets.len(),
            Predictions::Scores { targets, .. } => targets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another batch's predictions of the same kind
    pub fn merge(&mut self, other: Predictions) -> Result<()> {
        match (self, other) {
            (
                Predictions::Classes {
                    predicted,
                    targets,
                    positive_scores,
                },
                Predictions::Classes {
                    predicted: p,
                    targets: t,
                    positive_scores: s,
                },
            ) => {
                predicted.extend(p);
                targets.extend(t);
                positive_scores.extend(s);
                Ok(())
            }
            (
                Predictions::Scores { predicted, targets },
                Predictions::Scores {
                    predicted: p,
                    targets: t,
                },
            ) => {
                predicted.extend(p);
                targets.extend(t);
                Ok(())
            }
            _ => Err(AirsError::Training(
                "cannot merge class and score predictions".to_string(),
            )),
        }
    }

    /// Accuracy for classes, R² for scores
    pub fn validation_metric(&self) -> f64 {
        match self {
            Predictions::Classes {
                predicted, targets, ..
            } => {
                if targets.is_empty() {
                    return 0.0;
                }
                let correct = predicted.iter().zip(targets).filter(|(p, t)| p == t).count();
                correct as f64 / targets.len() as f64
            }
            Predictions::Scores { predicted, targets } => r2_score(predicted, targets),
        }
    }
}

/// A trainable fusion model
pub trait FusionModel<B: Backend>: Module<B> {
    /// Sample record consumed by the model
    type Item: Clone + Send + Sync + 'static;
    /// Collated tensors
    type Batch;

    fn collate(&self, items: Vec<Self::Item>, device: &B::Device) -> Self::Batch;

    /// Scalar training loss of a batch
    fn loss(&self, batch: Self::Batch) -> Result<Tensor<B, 1>>;

    fn predict(&self, batch: Self::Batch) -> Result<Predictions>;
}

fn float_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| AirsError::Model(format!("failed to read tensor data: {:?}", e)))
}

fn int_vec<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| AirsError::Model(format!("failed to read tensor data: {:?}", e)))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

impl<B: Backend> FusionModel<B> for CanopyStressClassifier<B> {
    type Item = CanopySample;
    type Batch = CanopyBatch<B>;

    fn collate(&self, items: Vec<CanopySample>, device: &B::Device) -> CanopyBatch<B> {
        CanopyBatcher::<B>::new(self.image_size()).batch(items, device)
    }

    fn loss(&self, batch: CanopyBatch<B>) -> Result<Tensor<B, 1>> {
        let logits = self.forward(batch.images);
        Ok(CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, batch.targets))
    }

    fn predict(&self, batch: CanopyBatch<B>) -> Result<Predictions> {
        let probs = self.forward_softmax(batch.images);
        let [batch_size, num_classes] = probs.dims();

        let predicted = int_vec(probs.clone().argmax(1).reshape([batch_size]))?;
        let positive_scores = if num_classes > 1 {
            float_vec(probs.slice([0..batch_size, 1..2]))?
        } else {
            vec![0.0; batch_size]
        };

        Ok(Predictions::Classes {
            predicted,
            targets: int_vec(batch.targets)?,
            positive_scores,
        })
    }
}

impl<B: Backend> FusionModel<B> for SeedHealthRegressor<B> {
    type Item = SeedSample;
    type Batch = SeedBatch<B>;

    fn collate(&self, items: Vec<SeedSample>, device: &B::Device) -> SeedBatch<B> {
        SeedBatcher::<B>::new().batch(items, device)
    }

    fn loss(&self, batch: SeedBatch<B>) -> Result<Tensor<B, 1>> {
        let predicted = self.forward(batch.spectra, batch.uav, batch.environment)?;
        Ok(MseLoss::new().forward(predicted, batch.shi, Reduction::Mean))
    }

    fn predict(&self, batch: SeedBatch<B>) -> Result<Predictions> {
        let predicted = self.forward(batch.spectra, batch.uav, batch.environment)?;
        Ok(Predictions::Scores {
            predicted: float_vec(predicted)?,
            targets: float_vec(batch.shi)?,
        })
    }
}

impl<B: Backend> FusionModel<B> for AflatoxinRiskRegressor<B> {
    type Item = SeedSample;
    type Batch = SeedBatch<B>;

    fn collate(&self, items: Vec<SeedSample>, device: &B::Device) -> SeedBatch<B> {
        SeedBatcher::<B>::new().batch(items, device)
    }

    fn loss(&self, batch: SeedBatch<B>) -> Result<Tensor<B, 1>> {
        let predicted = self.forward(batch.spectra, batch.field, batch.storage)?;
        Ok(MseLoss::new().forward(predicted, batch.ars, Reduction::Mean))
    }

    fn predict(&self, batch: SeedBatch<B>) -> Result<Predictions> {
        let predicted = self.forward(batch.spectra, batch.field, batch.storage)?;
        Ok(Predictions::Scores {
            predicted: float_vec(predicted)?,
            targets: float_vec(batch.ars)?,
        })
    }
}
