//! Learning rate scheduling.
//!
//! Fusion models reduce their learning rate when the epoch's training loss
//! stops improving. A loss counts as an improvement when it beats the best so
//! far by the relative `threshold`; once more than `patience` consecutive
//! epochs pass without one, the rate is multiplied by `factor`.

use serde::{Deserialize, Serialize};

/// Learning rate scheduler type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum SchedulerType {
    /// Constant learning rate (no scheduling)
    #[default]
    Constant,

    /// Reduce on plateau of a minimised metric
    ReduceLROnPlateau {
        factor: f64,
        patience: usize,
        threshold: f64,
        min_lr: f64,
    },
}

impl SchedulerType {
    /// Plateau policy with the usual relative threshold and no lower bound
    pub fn plateau(factor: f64, patience: usize) -> Self {
        Self::ReduceLROnPlateau {
            factor,
            patience,
            threshold: 1e-4,
            min_lr: 0.0,
        }
    }
}

/// Learning rate scheduler
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    scheduler_type: SchedulerType,
    current_lr: f64,
    best_metric: Option<f64>,
    bad_epochs: usize,
}

impl LearningRateScheduler {
    pub fn new(scheduler_type: SchedulerType, base_lr: f64) -> Self {
        Self {
            scheduler_type,
            current_lr: base_lr,
            best_metric: None,
            bad_epochs: 0,
        }
    }

    /// Get the current learning rate
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    /// Feed the epoch's metric (lower is better).
    ///
    /// Returns `Some((old_lr, new_lr))` when the rate was reduced.
    pub fn step_with_metric(&mut self, metric: f64) -> Option<(f64, f64)> {
        let SchedulerType::ReduceLROnPlateau {
            factor,
            patience,
            threshold,
            min_lr,
        } = self.scheduler_type
        else {
            return None;
        };

        let improved = match self.best_metric {
            Some(best) => metric < best * (1.0 - threshold),
            None => true,
        };

        if improved {
            self.best_metric = Some(metric);
            self.bad_epochs = 0;
            return None;
        }

        self.bad_epochs += 1;
        if self.bad_epochs > patience {
            self.bad_epochs = 0;
            let old_lr = self.current_lr;
            let new_lr = (old_lr * factor).max(min_lr);
            if new_lr < old_lr {
                self.current_lr = new_lr;
                return Some((old_lr, new_lr));
            }
        }
        None
    }
}
