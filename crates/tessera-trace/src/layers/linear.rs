//! Linear Layer - Fully Connected Layer
//!
//! Applies `y = xW + b` with the weight stored as `[in_features, out_features]`.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use rand::rngs::StdRng;
use tessera_tensor::Tensor;

use crate::error::{TraceError, TraceResult};
use crate::init::{fan_in_uniform, zeros};
use crate::module::{join, Module, Parameter};
use crate::tracer::TracedTensor;

// =============================================================================
// Linear
// =============================================================================

/// Applies a linear transformation to the last dimension of the input.
///
/// Rank-2 inputs are recorded as a single `Gemm`; higher-rank inputs as
/// `MatMul` followed by `Add`.
///
/// # Shape
/// - Input: (*, in_features)
/// - Output: (*, out_features)
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weight matrix of shape (in_features, out_features).
    pub weight: Parameter,
    /// Bias vector of shape (out_features).
    pub bias: Option<Parameter>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Creates a randomly initialized layer whose parameters live under `prefix`.
    pub fn new(
        prefix: &str,
        in_features: usize,
        out_features: usize,
        bias: bool,
        rng: &mut StdRng,
    ) -> TraceResult<Self> {
        let weight = fan_in_uniform(&[in_features, out_features], in_features, rng)?;
        let bias = bias.then(|| zeros(&[out_features]));
        Self::from_tensors(prefix, weight, bias)
    }

    /// Creates a layer from a `[out, in]` weight, the layout most
    /// checkpoints store.
    pub fn from_weights(prefix: &str, weight: Tensor<f32>, bias: Option<Tensor<f32>>) -> TraceResult<Self> {
        Self::from_tensors(prefix, weight.transpose(0, 1)?, bias)
    }

    fn from_tensors(prefix: &str, weight: Tensor<f32>, bias: Option<Tensor<f32>>) -> TraceResult<Self> {
        let [in_features, out_features] = weight.shape() else {
            return Err(TraceError::InvalidModule(format!(
                "{prefix}: linear weight must be rank 2, got {:?}",
                weight.shape()
            )));
        };
        let (in_features, out_features) = (*in_features, *out_features);
        if let Some(b) = &bias {
            if b.shape() != &[out_features] {
                return Err(TraceError::InvalidModule(format!(
                    "{prefix}: bias shape {:?} does not match {out_features} outputs",
                    b.shape()
                )));
            }
        }
        Ok(Self {
            weight: Parameter::named(join(prefix, "weight"), weight),
            bias: bias.map(|b| Parameter::named(join(prefix, "bias"), b)),
            in_features,
            out_features,
        })
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let tracer = input.tracer();
        let weight = tracer.parameter(&self.weight)?;
        let bias = self.bias.as_ref().map(|b| tracer.parameter(b)).transpose()?;

        if input.ndim() == 2 {
            return input.gemm(&weight, bias.as_ref(), false);
        }
        let out = input.matmul(&weight)?;
        match bias {
            Some(b) => out.add(&b),
            None => Ok(out),
        }
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = vec![&self.weight];
        params.extend(self.bias.as_ref());
        params
    }

    fn name(&self) -> &'static str {
        "Linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::Tracer;
    use rand::SeedableRng;

    #[test]
    fn test_rank2_records_gemm() {
        let layer = Linear::from_weights(
            "fc",
            Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).unwrap(),
            Some(Tensor::from_vec(vec![0.5, 0.5, 0.5], &[3]).unwrap()),
        )
        .unwrap();
        assert_eq!((layer.in_features(), layer.out_features()), (2, 3));

        let tracer = Tracer::new("g");
        let x = tracer
            .input("x", Tensor::from_vec(vec![1.0, 1.0], &[1, 2]).unwrap())
            .unwrap();
        let y = layer.forward(&x).unwrap();
        assert_eq!(tracer.op_sequence(), vec!["Gemm"]);
        assert_eq!(y.shape(), &[1, 3]);
        assert_eq!(y.clone().into_value().as_slice(), &[3.5, 7.5, 11.5]);
    }

    #[test]
    fn test_rank3_records_matmul_add() {
        let layer = Linear::new("fc", 4, 2, true, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(layer.num_parameters(), 10);

        let tracer = Tracer::new("g");
        let x = tracer.input("x", Tensor::zeros(&[1, 5, 4])).unwrap();
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[1, 5, 2]);
        assert_eq!(tracer.op_sequence(), vec!["MatMul", "Add"]);
    }

    #[test]
    fn test_bad_bias_rejected() {
        let result = Linear::from_weights("fc", Tensor::zeros(&[3, 2]), Some(Tensor::zeros(&[2])));
        assert!(matches!(result, Err(TraceError::InvalidModule(_))));
    }
}
