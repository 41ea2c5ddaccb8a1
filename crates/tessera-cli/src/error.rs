//! Error - CLI Error Types
//!
//! Errors surfaced by the `tessera` binary. Library failures pass through
//! unchanged so their stage prefix reaches the user.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera::PipelineError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid config file, flag value or quantization setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline stage failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result alias used by every command
pub type CliResult<T> = Result<T, CliError>;

// =============================================================================
// Error Conversion
// =============================================================================

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}

impl From<tessera_graph::GraphError> for CliError {
    fn from(e: tessera_graph::GraphError) -> Self {
        CliError::Pipeline(PipelineError::Load(e))
    }
}

impl From<tessera_quant::QuantError> for CliError {
    fn from(e: tessera_quant::QuantError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<tessera_vision::VisionError> for CliError {
    fn from(e: tessera_vision::VisionError) -> Self {
        CliError::Config(e.to_string())
    }
}
