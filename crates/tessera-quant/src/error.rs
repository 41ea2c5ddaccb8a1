//! Quantization Error Types
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera_graph::GraphError;
use thiserror::Error;

/// Result type for quantization operations.
pub type QuantResult<T> = Result<T, QuantError>;

/// Errors that can occur during quantization.
///
/// Every variant except `Graph` is raised before the graph is modified.
#[derive(Error, Debug)]
pub enum QuantError {
    /// The configuration asks for an operator or mode without a rewrite rule.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// The input graph already carries quantized weights.
    #[error("Graph is already quantized: {0}")]
    AlreadyQuantized(String),

    /// A configuration value could not be interpreted.
    #[error("Invalid quantization config: {0}")]
    InvalidConfig(String),

    /// A weight cannot be quantized.
    #[error("Cannot quantize '{name}': {message}")]
    InvalidWeight {
        /// Initializer name.
        name: String,
        /// Reason.
        message: String,
    },

    /// The rewritten graph failed validation or a graph operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Tensor operation error.
    #[error("Tensor error: {0}")]
    Tensor(#[from] tessera_tensor::Error),
}

impl QuantError {
    pub(crate) fn invalid_weight(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidWeight {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
