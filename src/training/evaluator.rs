//! Test-set reports built from host-side predictions

use serde::{Deserialize, Serialize};

use super::fusion::Predictions;
use crate::utils::error::{AirsError, Result};
use crate::utils::metrics::{ClassificationMetrics, RegressionMetrics};

/// Held-out evaluation of the canopy classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub metrics: ClassificationMetrics,
    /// Fraction of test samples whose true label is "stressed"
    pub positive_rate: f64,
}

impl ClassificationReport {
    pub fn from_predictions(predictions: &Predictions, num_classes: usize) -> Result<Self> {
        match predictions {
            Predictions::Classes {
                predicted,
                targets,
                positive_scores,
            } => {
                if targets.is_empty() {
                    return Err(AirsError::Dataset("no test predictions to report".to_string()));
                }
                let scores = (num_classes == 2 && has_both_classes(targets)).then_some(positive_scores.as_slice());
                let metrics = ClassificationMetrics::from_predictions(predicted, targets, scores, num_classes)?;
                let positive_rate = targets.iter().filter(|&&t| t == 1).count() as f64 / targets.len() as f64;
                Ok(Self { metrics, positive_rate })
            }
            Predictions::Scores { .. } => Err(AirsError::Training(
                "classification report needs class predictions".to_string(),
            )),
        }
    }
}

fn has_both_classes(targets: &[usize]) -> bool {
    targets.iter().any(|&t| t == 1) && targets.iter().any(|&t| t != 1)
}

/// Held-out evaluation of a bounded-score regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub metrics: RegressionMetrics,
    pub mean_prediction: f64,
    pub mean_target: f64,
}

impl RegressionReport {
    pub fn from_predictions(predictions: &Predictions) -> Result<Self> {
        match predictions {
            Predictions::Scores { predicted, targets } => {
                let metrics = RegressionMetrics::from_predictions(predicted, targets)?;
                let n = targets.len() as f64;
                Ok(Self {
                    metrics,
                    mean_prediction: predicted.iter().sum::<f64>() / n,
                    mean_target: targets.iter().sum::<f64>() / n,
                })
            }
            Predictions::Classes { .. } => Err(AirsError::Training(
                "regression report needs score predictions".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for RegressionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | mean pred {:.2} vs target {:.2}",
            self.metrics, self.mean_prediction, self.mean_target
        )
    }
}
