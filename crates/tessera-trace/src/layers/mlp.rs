//! Feed-Forward Block
//!
//! @version 0.1.0
//! @author Tessera Development Team

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::TraceResult;
use crate::layers::Linear;
use crate::module::{join, Module, Parameter};
use crate::tracer::TracedTensor;

/// Nonlinearity between the two projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// `x * sigmoid(1.702 x)`, the CLIP approximation.
    #[default]
    QuickGelu,
    /// Exact erf GELU.
    Gelu,
    /// Rectified linear unit.
    Relu,
}

impl Activation {
    /// Applies the activation to a traced tensor.
    pub fn apply<'t>(self, x: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        match self {
            Activation::QuickGelu => x.mul(&x.mul_scalar(1.702)?.sigmoid()?),
            Activation::Gelu => x.gelu(),
            Activation::Relu => x.relu(),
        }
    }
}

/// Two linear layers around an activation.
#[derive(Debug, Clone)]
pub struct Mlp {
    fc1: Linear,
    fc2: Linear,
    activation: Activation,
}

impl Mlp {
    /// Creates a block `hidden -> intermediate -> hidden`.
    pub fn new(
        prefix: &str,
        hidden: usize,
        intermediate: usize,
        activation: Activation,
        rng: &mut StdRng,
    ) -> TraceResult<Self> {
        Ok(Self {
            fc1: Linear::new(&join(prefix, "fc1"), hidden, intermediate, true, rng)?,
            fc2: Linear::new(&join(prefix, "fc2"), intermediate, hidden, true, rng)?,
            activation,
        })
    }
}

impl Module for Mlp {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let h = self.fc1.forward(input)?;
        let h = self.activation.apply(&h)?;
        self.fc2.forward(&h)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.fc1.parameters();
        params.extend(self.fc2.parameters());
        params
    }

    fn name(&self) -> &'static str {
        "Mlp"
    }
}
