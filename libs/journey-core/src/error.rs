//! Error types for journey-core.

use thiserror::Error;

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the strict parsing helpers.
///
/// Record normalization never fails; these only surface when a caller asks
/// for an exact interpretation of wire strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown activity {activity} in category {category}")]
    UnknownActivity { category: String, activity: String },

    #[error("invalid date: {0}")]
    InvalidDate(String),
}
