//! Vision Error Types
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::PathBuf;

use tessera_trace::TraceError;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors raised while producing input tensors or building models.
#[derive(Error, Debug)]
pub enum VisionError {
    /// The remote image could not be fetched.
    #[error("Failed to fetch '{url}': {message}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport error.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Fetching '{url}' returned HTTP {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// The local image could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a decodable image.
    #[error("Failed to decode image from {origin}: {message}")]
    Decode {
        /// Where the bytes came from.
        origin: String,
        /// Decoder error.
        message: String,
    },

    /// A preprocessing or model setting is unusable.
    #[error("Invalid vision config: {0}")]
    InvalidConfig(String),

    /// Model construction failed.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Tensor operation error.
    #[error("Tensor error: {0}")]
    Tensor(#[from] tessera_tensor::Error),
}
