//! Graph Error Types
//!
//! Errors for loading, validating, writing and executing computation graphs.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::PathBuf;

use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur during graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Failed to read a graph artifact.
    #[error("Failed to read graph artifact {path}: {source}")]
    Read {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Artifact bytes could not be decoded.
    #[error("Malformed graph artifact: {0}")]
    Malformed(String),

    /// Artifact was written by an unknown format version.
    #[error("Unsupported graph format version {found} (this build reads up to {supported})")]
    UnsupportedFormatVersion {
        /// Version found in the artifact.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },

    /// Unsupported default-domain opset version.
    #[error("Unsupported opset version: {0}")]
    UnsupportedOpset(i64),

    /// Graph violates a structural invariant.
    #[error("Graph validation error: {0}")]
    Validation(String),

    /// Failed to write a graph artifact.
    #[error("Failed to write graph artifact {path}: {source}")]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode a graph.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operator type has no runtime implementation.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A required operator input is absent.
    #[error("Missing input {index} for {op}")]
    MissingInput {
        /// Operator type.
        op: String,
        /// Input position.
        index: usize,
    },

    /// Attribute is missing or malformed.
    #[error("Invalid attribute {attribute} on {op}: {message}")]
    InvalidAttribute {
        /// Operator type.
        op: String,
        /// Attribute name.
        attribute: String,
        /// Description of the problem.
        message: String,
    },

    /// Value has an unexpected element type.
    #[error("Invalid element type for {name}: expected {expected}, got {actual}")]
    InvalidDataType {
        /// Value name or role.
        name: String,
        /// Expected element type.
        expected: String,
        /// Actual element type.
        actual: String,
    },

    /// A feed does not match its declared input.
    #[error("Input {name} expects shape {expected}, got {actual:?}")]
    InputShape {
        /// Input name.
        name: String,
        /// Declared shape.
        expected: String,
        /// Supplied shape.
        actual: Vec<usize>,
    },

    /// A feed or requested value is not part of the graph.
    #[error("Unknown graph value: {0}")]
    UnknownValue(String),

    /// Tensor kernel error.
    #[error("Tensor error: {0}")]
    Tensor(#[from] tessera_tensor::Error),
}

impl GraphError {
    /// Returns true for errors raised while loading an artifact.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::Read { .. }
                | Self::Malformed(_)
                | Self::UnsupportedFormatVersion { .. }
                | Self::UnsupportedOpset(_)
                | Self::Validation(_)
        )
    }

    pub(crate) fn missing_input(op: &str, index: usize) -> Self {
        Self::MissingInput {
            op: op.to_string(),
            index,
        }
    }

    pub(crate) fn invalid_attribute(op: &str, attribute: &str, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            op: op.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for GraphError {
    fn from(err: bincode::Error) -> Self {
        GraphError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_classification() {
        assert!(GraphError::Malformed("x".into()).is_load_error());
        assert!(GraphError::UnsupportedOpset(3).is_load_error());
        let write = GraphError::Write {
            path: PathBuf::from("a.graph"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(!write.is_load_error());
        assert!(write.to_string().contains("a.graph"));
    }
}
