//! Error types for the data-loader crate.
//!
//! Only `ResourceUnavailable` ever escapes a load. A `MalformedRow` is
//! logged, counted and skipped; an `UnknownReference` is logged and counted
//! while its rating is kept.

use thiserror::Error;

/// Errors that can occur during data loading and parsing
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// A required file could not be read at all
    #[error("Resource unavailable: {path}: {reason}")]
    ResourceUnavailable { path: String, reason: String },

    /// A single row could not be parsed; the row is skipped
    #[error("Malformed row at line {line} in {file}: {reason}")]
    MalformedRow {
        file: String,
        line: usize,
        reason: String,
    },

    /// A data field had an invalid value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Rating refers to an id missing from the metadata tables
    #[error("Unknown reference: {entity} with id {id}")]
    UnknownReference { entity: String, id: u32 },
}

impl DataLoadError {
    /// Shorthand used by the parsers
    pub(crate) fn malformed(file: &str, line: usize, reason: impl Into<String>) -> Self {
        DataLoadError::MalformedRow {
            file: file.to_string(),
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(entity: &str, id: u32) -> Self {
        DataLoadError::UnknownReference {
            entity: entity.to_string(),
            id,
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_reference_message() {
        let err = DataLoadError::unknown("item", 99);
        assert_eq!(err.to_string(), "Unknown reference: item with id 99");
    }
}
