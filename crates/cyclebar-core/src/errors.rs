//! Pipeline error types
//!
//! One taxonomy for every stage. Recoverable conditions such as data gaps,
//! empty cycles and duplicate keys on append are not represented here; they
//! are logged or reported through [`crate::orchestrator::RunOutcome`].

use crate::checkpoint::CheckpointError;
use crate::store::StoreError;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors raised by the signal-detection and feature pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required column is absent from the input (bars file header or feature frame)
    #[error("Missing required column '{column}'")]
    MissingColumn { column: String },

    /// Bars are not strictly increasing in time
    #[error("Bars not strictly increasing at index {index}: prev={prev}, curr={curr}")]
    UnsortedBars {
        index: usize,
        prev: NaiveDateTime,
        curr: NaiveDateTime,
    },

    /// A bar carries a value outside its domain (non-positive or non-finite price)
    #[error("Invalid bar at {timestamp}: {reason}")]
    InvalidBar {
        timestamp: NaiveDateTime,
        reason: String,
    },

    /// Resampling period could not be parsed or is not usable
    #[error("Unsupported period '{0}'")]
    UnsupportedPeriod(String),

    /// A pipeline parameter is out of range
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Scaling bounds collapsed (high <= low); scaling would divide by zero
    #[error("Degenerate scale for column '{column}': low={low}, high={high}")]
    DegenerateScale { column: String, low: f64, high: f64 },

    /// A column holds values but no bounds could be computed or loaded for it
    #[error("No bounds available for column '{column}'")]
    MissingBounds { column: String },

    /// Persisted bounds have a different shape than the rule expects
    #[error("Bounds for column '{column}' have an unexpected kind: expected {expected}")]
    BoundsKindMismatch {
        column: String,
        expected: &'static str,
    },

    /// Feature block has more columns than the matrix is wide
    #[error("Model '{model}' needs {columns} columns but matrix width is {width}")]
    MatrixTooWide {
        model: String,
        columns: usize,
        width: usize,
    },

    /// Tensor shape error while assembling or merging matrices
    #[error("Matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Checkpoint record is inconsistent
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Collaborator (storage) failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::InvalidParameter`]
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_scale_message_names_column() {
        let err = PipelineError::DegenerateScale {
            column: "length".to_string(),
            low: 40.0,
            high: 40.0,
        };
        assert_eq!(
            err.to_string(),
            "Degenerate scale for column 'length': low=40, high=40"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: PipelineError = StoreError::Backend {
            reason: "disk full".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::Store(_)));
    }
}
