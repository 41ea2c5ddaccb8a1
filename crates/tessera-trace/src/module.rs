//! Module Trait - Traceable Model Interface
//!
//! A module is a pure function from an input tensor to an output tensor with
//! fixed, named parameters. Forward passes run on `TracedTensor`s so one call
//! both computes the result and records the graph.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera_tensor::Tensor;

use crate::error::TraceResult;
use crate::tracer::TracedTensor;

// =============================================================================
// Module Trait
// =============================================================================

/// Core trait for all traceable modules.
pub trait Module: Send + Sync {
    /// Performs the forward pass, recording it into the input's tracer.
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>>;

    /// Returns all parameters of this module, including child modules.
    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    /// Returns the number of parameter elements.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Returns the module type name.
    fn name(&self) -> &'static str {
        "Module"
    }
}

// =============================================================================
// Parameter
// =============================================================================

/// A named, fixed parameter tensor.
///
/// The name becomes the initializer name in exported graphs, so it should be
/// the full dotted path of the parameter within the model.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    data: Tensor<f32>,
}

impl Parameter {
    /// Creates a named parameter.
    pub fn named(name: impl Into<String>, data: Tensor<f32>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter values.
    pub fn data(&self) -> &Tensor<f32> {
        &self.data
    }

    /// Parameter shape.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.numel()
    }
}

/// Joins a parent path and a child name with a dot.
pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter() {
        let p = Parameter::named("fc.weight", Tensor::zeros(&[3, 4]));
        assert_eq!(p.name(), "fc.weight");
        assert_eq!(p.shape(), &[3, 4]);
        assert_eq!(p.numel(), 12);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "weight"), "weight");
        assert_eq!(join("encoder.layers.0", "fc1"), "encoder.layers.0.fc1");
    }
}
