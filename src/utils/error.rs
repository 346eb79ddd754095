//! Error Handling Module
//!
//! Defines the error type shared by the generators, models and trainers.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for AIRS-GSeed operations
#[derive(Error, Debug)]
pub enum AirsError {
    /// Requested shapes are inconsistent with fixed architectural constants
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with dataset construction or partitioning
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// An externally supplied table lacks an expected column
    #[error("Missing column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Training diverged
    #[error("Non-finite loss {value} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss { epoch: usize, batch: usize, value: f64 },

    /// A parameter gradient holds NaN or infinity
    #[error("Non-finite gradient at epoch {epoch}, batch {batch}")]
    NonFiniteGradient { epoch: usize, batch: usize },

    /// Error with model construction or tensor extraction
    #[error("Model error: {0}")]
    Model(String),

    /// Error saving or restoring parameters
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for AirsError {
    fn from(err: serde_json::Error) -> Self {
        AirsError::Serialization(err.to_string())
    }
}

/// Convenience Result type for AIRS-GSeed operations
pub type Result<T> = std::result::Result<T, AirsError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| AirsError::Model(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| AirsError::Model(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AirsError::Dataset(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| AirsError::Dataset(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AirsError::Dataset("empty partition".to_string());
        assert_eq!(format!("{}", err), "Dataset error: empty partition");
    }

    #[test]
    fn test_missing_column_names_source() {
        let err = AirsError::MissingColumn {
            column: "Vigour index".to_string(),
            source_name: "quality.csv".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Vigour index"));
        assert!(msg.contains("quality.csv"));
    }

    #[test]
    fn test_non_finite_loss_display() {
        let err = AirsError::NonFiniteLoss {
            epoch: 3,
            batch: 7,
            value: f64::NAN,
        };
        assert!(err.to_string().contains("epoch 3, batch 7"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let with_context = result.context("Failed to read file");
        assert!(with_context.is_err());
    }

    #[test]
    fn test_option_context() {
        let none: Option<i32> = None;
        let err = none.context("no samples").unwrap_err();
        assert!(matches!(err, AirsError::Dataset(_)));
    }
}
