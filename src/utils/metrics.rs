//! Metrics Module for Model Evaluation
//!
//! Classification metrics for the canopy classifier:
//! - Accuracy, per-class precision/recall/F1, binary and macro F1
//! - Confusion Matrix
//! - ROC AUC from positive-class scores
//!
//! Regression metrics for the SHI/ARS regressors: R², RMSE, MAE and
//! Pearson correlation.

use serde::{Deserialize, Serialize};

use crate::utils::error::{AirsError, Result};

/// Classification metrics for one evaluation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// F1 of class 1 (the "stressed" class for binary tasks)
    pub f1: f64,

    /// Macro-averaged F1 over classes with support
    pub macro_f1: f64,

    /// Area under the ROC curve, binary tasks only
    pub auc_roc: Option<f64>,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationMetrics {
    /// Build metrics from hard predictions.
    ///
    /// `positive_scores`, when given, holds the probability of class 1 per
    /// sample and enables the ROC AUC.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        positive_scores: Option<&[f64]>,
        num_classes: usize,
    ) -> Result<Self> {
        ensure_same_len(predictions.len(), ground_truth.len())?;

        let total_samples = predictions.len();
        if total_samples == 0 {
            return Ok(Self::default());
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        let supported: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let macro_f1 = if supported.is_empty() {
            0.0
        } else {
            supported.iter().map(|m| m.f1).sum::<f64>() / supported.len() as f64
        };

        let f1 = per_class.get(1).map(|m| m.f1).unwrap_or(0.0);

        let auc_roc = match positive_scores {
            Some(scores) if num_classes == 2 => {
                let labels: Vec<bool> = ground_truth.iter().map(|&g| g == 1).collect();
                Some(roc_auc(scores, &labels)?)
            }
            _ => None,
        };

        Ok(Self {
            total_samples,
            accuracy: confusion_matrix.accuracy(),
            f1,
            macro_f1,
            auc_roc,
            per_class,
            confusion_matrix,
        })
    }
}

impl std::fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Accuracy:  {:6.2}%", self.accuracy * 100.0)?;
        writeln!(f, "F1:        {:6.4}", self.f1)?;
        writeln!(f, "Macro F1:  {:6.4}", self.macro_f1)?;
        match self.auc_roc {
            Some(auc) => writeln!(f, "AUC-ROC:   {:6.4}", auc)?,
            None => writeln!(f, "AUC-ROC:   n/a")?,
        }
        write!(f, "Samples:   {}", self.total_samples)
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Precision = TP / (TP + FP)
    pub precision: f64,
    /// Recall = TP / (TP + FN)
    pub recall: f64,
    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion matrix, rows are actual classes and columns predicted classes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    /// Row-major counts
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Add a single prediction; out-of-range classes are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Confusion Matrix (rows=actual, cols=predicted):")?;
        write!(f, "        ")?;
        for col in 0..self.num_classes {
            write!(f, "{:>6}", col)?;
        }
        writeln!(f)?;
        for row in 0..self.num_classes {
            write!(f, "{:>6}  ", row)?;
            for col in 0..self.num_classes {
                write!(f, "{:>6}", self.get(row, col))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// ROC AUC via the Mann-Whitney rank statistic, averaging ranks over ties.
///
/// Fails when either class is absent since the curve is undefined.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Result<f64> {
    ensure_same_len(scores.len(), labels.len())?;

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(AirsError::Dataset(
            "ROC AUC requires both positive and negative samples".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l)
        .map(|(r, _)| r)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Regression metrics for a bounded-score regressor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Pearson correlation; 0.0 when either side has zero variance
    pub pearson: f64,
    pub total_samples: usize,
}

impl RegressionMetrics {
    pub fn from_predictions(predictions: &[f64], targets: &[f64]) -> Result<Self> {
        ensure_same_len(predictions.len(), targets.len())?;
        if targets.is_empty() {
            return Err(AirsError::Dataset(
                "cannot compute regression metrics on an empty set".to_string(),
            ));
        }

        let n = targets.len() as f64;
        let mse = predictions
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / n;
        let mae = predictions
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;

        Ok(Self {
            r2: r2_score(predictions, targets),
            rmse: mse.sqrt(),
            mae,
            pearson: pearson(predictions, targets),
            total_samples: targets.len(),
        })
    }
}

impl std::fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "R²: {:.4} | RMSE: {:.4} | MAE: {:.4} | r: {:.4} | n={}",
            self.r2, self.rmse, self.mae, self.pearson, self.total_samples
        )
    }
}

/// Coefficient of determination.
///
/// With constant targets the score is 1.0 for an exact fit and 0.0 otherwise.
pub fn r2_score(predictions: &[f64], targets: &[f64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let mean = targets.iter().sum::<f64>() / targets.len() as f64;
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Pearson correlation coefficient
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        0.0
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    }
}

fn ensure_same_len(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(AirsError::Dataset(format!(
            "predictions ({}) and ground truth ({}) differ in length",
            a, b
        )));
    }
    Ok(())
}

/// Running average for tracking the loss during an epoch
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value weighted by the number of samples it covers
    pub fn update(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 1, 0, 1];
        let ground_truth = vec![0, 1, 0, 0, 1];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);

        assert_eq!(cm.get(0, 0), 2);
        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(1, 1), 2);
        assert_eq!(cm.get(1, 0), 0);
        assert_eq!(cm.total(), 5);
        assert_eq!(cm.correct(), 4);
    }

    #[test]
    fn test_binary_f1() {
        // TP=2, FP=1, FN=0 for class 1
        let predictions = vec![0, 1, 1, 0, 1];
        let ground_truth = vec![0, 1, 0, 0, 1];

        let metrics =
            ClassificationMetrics::from_predictions(&predictions, &ground_truth, None, 2).unwrap();

        assert!((metrics.accuracy - 0.8).abs() < 1e-9);
        let expected_f1 = 2.0 * (2.0 / 3.0) * 1.0 / (2.0 / 3.0 + 1.0);
        assert!((metrics.f1 - expected_f1).abs() < 1e-9);
        assert!(metrics.auc_roc.is_none());
    }

    #[test]
    fn test_classification_length_mismatch() {
        let result = ClassificationMetrics::from_predictions(&[0, 1], &[0], None, 2);
        assert!(result.is_err());
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let labels = vec![false, false, true, true];
        let perfect = roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels).unwrap();
        assert!((perfect - 1.0).abs() < 1e-9);

        let inverted = roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels).unwrap();
        assert!(inverted.abs() < 1e-9);
    }

    #[test]
    fn test_roc_auc_ties_count_half() {
        let labels = vec![false, true];
        let auc = roc_auc(&[0.5, 0.5], &labels).unwrap();
        assert!((auc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_roc_auc_single_class_is_error() {
        assert!(roc_auc(&[0.1, 0.7], &[true, true]).is_err());
    }

    #[test]
    fn test_regression_metrics() {
        let targets = vec![10.0, 20.0, 30.0, 40.0];
        let predictions = vec![12.0, 18.0, 33.0, 37.0];

        let m = RegressionMetrics::from_predictions(&predictions, &targets).unwrap();

        // ss_res = 4 + 4 + 9 + 9 = 26, ss_tot = 500
        assert!((m.r2 - (1.0 - 26.0 / 500.0)).abs() < 1e-9);
        assert!((m.rmse - (26.0f64 / 4.0).sqrt()).abs() < 1e-9);
        assert!((m.mae - 2.5).abs() < 1e-9);
        assert!(m.pearson > 0.95 && m.pearson <= 1.0);
    }

    #[test]
    fn test_r2_constant_targets() {
        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2_score(&[4.0, 6.0], &[5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_r2_can_be_negative() {
        let r2 = r2_score(&[40.0, 10.0], &[10.0, 40.0]);
        assert!(r2 < 0.0);
    }

    #[test]
    fn test_pearson_zero_variance() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();
        avg.update(1.0, 2);
        avg.update(4.0, 1);
        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 2.0).abs() < 1e-12);
    }
}
