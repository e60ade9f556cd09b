//! Error types for drainflow

use thiserror::Error;

/// Main error type for drainflow operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("An out-of-memory error has occurred: cannot allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("Operation cancelled")]
    Cancelled,

    /// The pointer grid holds a value that is not a valid flow direction.
    #[error("Invalid flow pointer value {value} at ({row}, {col}); the pointer grid is not conformant")]
    InvalidPointer { row: usize, col: usize, value: f64 },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for building an [`Error::InvalidParameter`].
    pub fn invalid_param(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a configuration problem detected before any
    /// computation started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. }
                | Error::MissingArgument(_)
                | Error::InvalidDimensions { .. }
        )
    }
}

/// Result type alias for drainflow operations
pub type Result<T> = std::result::Result<T, Error>;
