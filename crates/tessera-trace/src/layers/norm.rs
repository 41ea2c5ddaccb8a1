//! Normalization Layers
//!
//! @version 0.1.0
//! @author Tessera Development Team

use crate::error::TraceResult;
use crate::init::{ones, zeros};
use crate::module::{join, Module, Parameter};
use crate::tracer::TracedTensor;

// =============================================================================
// LayerNorm
// =============================================================================

/// Layer normalization over the last dimension.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    /// Scale (gamma).
    pub weight: Parameter,
    /// Shift (beta).
    pub bias: Parameter,
    eps: f32,
}

impl LayerNorm {
    /// Creates a layer norm with gamma = 1 and beta = 0.
    pub fn new(prefix: &str, normalized_shape: usize, eps: f32) -> Self {
        Self {
            weight: Parameter::named(join(prefix, "weight"), ones(&[normalized_shape])),
            bias: Parameter::named(join(prefix, "bias"), zeros(&[normalized_shape])),
            eps,
        }
    }

    /// Epsilon added to the variance.
    pub fn eps(&self) -> f32 {
        self.eps
    }
}

impl Module for LayerNorm {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let tracer = input.tracer();
        let weight = tracer.parameter(&self.weight)?;
        let bias = tracer.parameter(&self.bias)?;
        input.layer_norm(&weight, Some(&bias), self.eps)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn name(&self) -> &'static str {
        "LayerNorm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::Tracer;
    use tessera_tensor::Tensor;

    #[test]
    fn test_normalizes_rows() {
        let ln = LayerNorm::new("ln", 4, 1e-5);
        let tracer = Tracer::new("g");
        let x = tracer
            .input("x", Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 4]).unwrap())
            .unwrap();
        let y = ln.forward(&x).unwrap().into_value();
        let mean: f32 = y.as_slice().iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert_eq!(tracer.op_sequence(), vec!["LayerNormalization"]);
    }
}
