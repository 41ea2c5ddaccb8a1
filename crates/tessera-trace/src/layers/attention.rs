//! Attention Mechanisms - Multi-Head Self-Attention
//!
//! @version 0.1.0
//! @author Tessera Development Team

use rand::rngs::StdRng;

use crate::error::{TraceError, TraceResult};
use crate::layers::Linear;
use crate::module::{join, Module, Parameter};
use crate::tracer::TracedTensor;

// =============================================================================
// MultiHeadAttention
// =============================================================================

/// Multi-head self-attention over batch-first sequences.
///
/// Head splitting uses `Reshape` with copied leading dimensions so the
/// recorded graph stays valid for any batch size.
///
/// # Shape
/// - Input: (N, L, E)
/// - Output: (N, L, E)
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    embed_dim: usize,
    num_heads: usize,
    head_dim: usize,
    scale: f32,
}

impl MultiHeadAttention {
    /// Creates the attention block with parameters under `prefix`.
    pub fn new(prefix: &str, embed_dim: usize, num_heads: usize, rng: &mut StdRng) -> TraceResult<Self> {
        if num_heads == 0 || embed_dim % num_heads != 0 {
            return Err(TraceError::InvalidModule(format!(
                "{prefix}: embed_dim {embed_dim} must be divisible by num_heads {num_heads}"
            )));
        }
        let head_dim = embed_dim / num_heads;
        Ok(Self {
            q_proj: Linear::new(&join(prefix, "q_proj"), embed_dim, embed_dim, true, rng)?,
            k_proj: Linear::new(&join(prefix, "k_proj"), embed_dim, embed_dim, true, rng)?,
            v_proj: Linear::new(&join(prefix, "v_proj"), embed_dim, embed_dim, true, rng)?,
            out_proj: Linear::new(&join(prefix, "out_proj"), embed_dim, embed_dim, true, rng)?,
            embed_dim,
            num_heads,
            head_dim,
            scale: (head_dim as f32).powf(-0.5),
        })
    }

    /// Embedding dimension.
    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    /// Number of heads.
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn split_heads<'t>(&self, x: &TracedTensor<'t>, perm: &[usize]) -> TraceResult<TracedTensor<'t>> {
        x.reshape(&[0, 0, self.num_heads as i64, self.head_dim as i64])?
            .permute(perm)
    }
}

impl Module for MultiHeadAttention {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        if input.ndim() != 3 || input.shape()[2] != self.embed_dim {
            return Err(TraceError::InvalidModule(format!(
                "attention expects (N, L, {}), got {:?}",
                self.embed_dim,
                input.shape()
            )));
        }

        // q: (N, H, L, D), k: (N, H, D, L), v: (N, H, L, D)
        let q = self.split_heads(&self.q_proj.forward(input)?.mul_scalar(self.scale)?, &[0, 2, 1, 3])?;
        let k = self.split_heads(&self.k_proj.forward(input)?, &[0, 2, 3, 1])?;
        let v = self.split_heads(&self.v_proj.forward(input)?, &[0, 2, 1, 3])?;

        let weights = q.matmul(&k)?.softmax(-1)?;
        let context = weights
            .matmul(&v)?
            .permute(&[0, 2, 1, 3])?
            .reshape(&[0, 0, self.embed_dim as i64])?;
        self.out_proj.forward(&context)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.q_proj.parameters();
        params.extend(self.k_proj.parameters());
        params.extend(self.v_proj.parameters());
        params.extend(self.out_proj.parameters());
        params
    }

    fn name(&self) -> &'static str {
        "MultiHeadAttention"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::Tracer;
    use rand::SeedableRng;
    use tessera_graph::Session;
    use tessera_tensor::Tensor;

    fn input(shape: &[usize]) -> Tensor<f32> {
        let n: usize = shape.iter().product();
        Tensor::from_vec((0..n).map(|i| ((i * 7 % 11) as f32) / 11.0 - 0.5).collect(), shape).unwrap()
    }

    #[test]
    fn test_head_divisibility() {
        assert!(MultiHeadAttention::new("attn", 10, 3, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn test_graph_matches_eager_on_larger_batch() {
        let attn = MultiHeadAttention::new("attn", 8, 2, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(attn.parameters().len(), 8);

        let tracer = Tracer::new("g");
        let x = tracer.input("x", input(&[1, 3, 8])).unwrap();
        let y = attn.forward(&x).unwrap();
        assert_eq!(y.shape(), &[1, 3, 8]);
        let model = tracer.finish(&y, "y").unwrap();

        let batch = input(&[2, 3, 8]);
        let from_graph = Session::new(&model).unwrap().run_single(batch.clone()).unwrap();

        let eager_tracer = Tracer::new("eager");
        let eager = attn
            .forward(&eager_tracer.input("x", batch).unwrap())
            .unwrap()
            .into_value();
        assert!(from_graph.allclose(&eager, 1e-5, 1e-6));
    }
}
