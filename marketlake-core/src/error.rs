//! Error taxonomy shared by every lake operation.
//!
//! Each concern owns its own `thiserror` enum; [`LakeError`] composes them
//! so callers can match on the kind of failure:
//! - validation and filter errors are raised before any I/O and never retried
//! - storage errors propagate unchanged (retry is the caller's business)
//! - computation errors abort the whole transform, never a partial frame

use thiserror::Error;

use crate::data::object_store::StorageError;
use crate::data::schema::SchemaError;
use crate::filter::FilterError;
use crate::validate::ValidationError;

/// Malformed numeric input to the aggregation and change pipelines.
#[derive(Debug, Error)]
pub enum ComputationError {
    #[error("invalid record at row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("frame error: {0}")]
    Frame(String),
}

impl ComputationError {
    pub(crate) fn invalid(row: usize, reason: impl Into<String>) -> Self {
        ComputationError::InvalidRecord {
            row,
            reason: reason.into(),
        }
    }
}

/// Any failure of a logical lake operation.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("computation error: {0}")]
    Computation(#[from] ComputationError),
}

impl LakeError {
    /// True for failures raised before any storage access.
    pub fn is_validation(&self) -> bool {
        matches!(self, LakeError::Validation(_) | LakeError::Filter(_))
    }

    /// True when the failure is a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LakeError::Storage(StorageError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_kinds_are_flagged() {
        let err: LakeError = ValidationError::InvalidDate("2024/01/01".into()).into();
        assert!(err.is_validation());
        assert!(!err.is_not_found());

        let err: LakeError = FilterError::UnknownParameter {
            name: "price".into(),
            valid: vec!["date_from"],
        }
        .into();
        assert!(err.is_validation());
    }

    #[test]
    fn not_found_is_distinguished() {
        let err: LakeError = StorageError::NotFound {
            path: "gold_prices/gold_prices.parquet".into(),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn invalid_record_message_names_row() {
        let err = ComputationError::invalid(3, "price is NaN");
        assert_eq!(err.to_string(), "invalid record at row 3: price is NaN");
    }
}
