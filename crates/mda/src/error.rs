//! Error and Result types for array access, provenance and materialization.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for alopex-mda operations.
pub type Result<T> = std::result::Result<T, MdaError>;

/// The error type for array operations.
#[derive(Debug, Error)]
pub enum MdaError {
    /// The backing file could not be opened. Sticky for the lifetime of a handle.
    #[error("Failed to open {path}: {reason}")]
    OpenFailed {
        /// Path that failed to open.
        path: PathBuf,
        /// Cause reported on the first attempt.
        reason: String,
    },

    /// The backend delivered fewer entries than the clipped range required.
    #[error("Short read: expected {expected} entries, got {actual}")]
    ShortRead {
        /// Entries required after clipping.
        expected: usize,
        /// Entries actually delivered.
        actual: usize,
    },

    /// A multi-dimensional chunk whose leading dimensions do not span the array.
    #[error("Unsupported chunk shape: offsets {offsets:?}, sizes {sizes:?}, array dims {dims:?}")]
    UnsupportedRangeShape {
        /// Requested start offsets.
        offsets: Vec<i64>,
        /// Requested sizes.
        sizes: Vec<usize>,
        /// Leading dimensions of the array.
        dims: Vec<usize>,
    },

    /// Reshape target does not preserve the element count.
    #[error("Cannot reshape {current} elements into {proposed:?}")]
    ReshapeSizeMismatch {
        /// Current total element count.
        current: usize,
        /// Proposed dimensions.
        proposed: Vec<usize>,
    },

    /// Neither the checksum index nor the local fallback produced a verified file.
    #[error("Unable to resolve provenance (original path {original_path})")]
    ResolutionFailed {
        /// Path hint carried by the descriptor.
        original_path: String,
    },

    /// Malformed array header.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Element type code not supported by the codec.
    #[error("Unsupported data type code: {0}")]
    UnsupportedDataType(i32),

    /// Text array or descriptor contents could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Remote backend failure that is not an HTTP status.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Waiting was abandoned because interruption was requested.
    #[error("Interrupted")]
    Interrupted,

    /// The handle has no path, buffer or session attached.
    #[error("No backend attached to array handle")]
    NoBackend,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Descriptor JSON error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for MdaError {
    fn from(err: reqwest::Error) -> Self {
        MdaError::Http(err.to_string())
    }
}
