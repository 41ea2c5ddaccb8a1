//! Convolutional Layers
//!
//! @version 0.1.0
//! @author Tessera Development Team

use rand::rngs::StdRng;
use tessera_tensor::{Conv2dParams, Tensor};

use crate::error::{TraceError, TraceResult};
use crate::init::{fan_in_uniform, zeros};
use crate::module::{join, Module, Parameter};
use crate::tracer::TracedTensor;

// =============================================================================
// Conv2d
// =============================================================================

/// 2-D convolution over `[N, C, H, W]` inputs.
#[derive(Debug, Clone)]
pub struct Conv2d {
    /// Weight of shape (out_channels, in_channels / groups, kH, kW).
    pub weight: Parameter,
    /// Optional bias of shape (out_channels).
    pub bias: Option<Parameter>,
    params: Conv2dParams,
}

impl Conv2d {
    /// Creates a randomly initialized square-kernel convolution.
    pub fn new(
        prefix: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        params: Conv2dParams,
        bias: bool,
        rng: &mut StdRng,
    ) -> TraceResult<Self> {
        let groups = params.groups.max(1);
        if in_channels % groups != 0 || out_channels % groups != 0 {
            return Err(TraceError::InvalidModule(format!(
                "{prefix}: channels {in_channels}->{out_channels} not divisible by {groups} groups"
            )));
        }
        let fan_in = in_channels / groups * kernel_size * kernel_size;
        let weight = fan_in_uniform(
            &[out_channels, in_channels / groups, kernel_size, kernel_size],
            fan_in,
            rng,
        )?;
        let bias = bias.then(|| zeros(&[out_channels]));
        Self::from_weights(prefix, weight, bias, params)
    }

    /// Creates a convolution from existing tensors.
    pub fn from_weights(
        prefix: &str,
        weight: Tensor<f32>,
        bias: Option<Tensor<f32>>,
        params: Conv2dParams,
    ) -> TraceResult<Self> {
        if weight.ndim() != 4 {
            return Err(TraceError::InvalidModule(format!(
                "{prefix}: conv weight must be rank 4, got {:?}",
                weight.shape()
            )));
        }
        Ok(Self {
            weight: Parameter::named(join(prefix, "weight"), weight),
            bias: bias.map(|b| Parameter::named(join(prefix, "bias"), b)),
            params,
        })
    }

    /// Convolution parameters.
    pub fn params(&self) -> &Conv2dParams {
        &self.params
    }
}

impl Module for Conv2d {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let tracer = input.tracer();
        let weight = tracer.parameter(&self.weight)?;
        let bias = self.bias.as_ref().map(|b| tracer.parameter(b)).transpose()?;
        input.conv2d(&weight, bias.as_ref(), &self.params)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = vec![&self.weight];
        params.extend(self.bias.as_ref());
        params
    }

    fn name(&self) -> &'static str {
        "Conv2d"
    }
}
