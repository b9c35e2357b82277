//! Error types for the analysis engine.
//!
//! Errors are serializable so a front end can receive them as `{code, message}`
//! objects and branch on the code.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::types::DatasetId;

/// The main error type for analysis requests.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Dataset id does not exist in the store.
    #[error("Dataset {0} not found")]
    DatasetNotFound(DatasetId),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The request itself is malformed (empty variable list, bad level, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A variable type string outside categorical / discrete / continuous.
    #[error("Invalid variable type '{0}' (expected categorical, discrete or continuous)")]
    InvalidVarType(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A statistical test could not be computed for the given samples.
    #[error("{test} could not be computed: {reason}")]
    TestFailed { test: String, reason: String },

    /// Unsupported or unreadable input file.
    #[error("Failed to load table: {0}")]
    TableLoad(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StatsError>,
    },
}

impl StatsError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StatsError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for [`StatsError::TestFailed`].
    pub fn test_failed(test: impl Into<String>, reason: impl Into<String>) -> Self {
        StatsError::TestFailed {
            test: test.into(),
            reason: reason.into(),
        }
    }

    /// Get error code for front-end handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatasetNotFound(_) => "DATASET_NOT_FOUND",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidVarType(_) => "INVALID_VAR_TYPE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::TestFailed { .. } => "TEST_FAILED",
            Self::TableLoad(_) => "TABLE_LOAD_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error means the requested dataset does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::DatasetNotFound(_) => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error was caused by the caller's input rather than the engine.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::InvalidRequest(_)
            | Self::InvalidVarType(_)
            | Self::InvalidConfig(_) => true,
            Self::WithContext { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for StatsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("StatsError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| StatsError::Polars(e).with_context(context))
    }
}
