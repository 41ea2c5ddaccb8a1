//! Graph Comparison
//!
//! Runs two graphs with the same input contract on one batch and measures
//! how far their outputs drift apart.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::Serialize;
use tessera_graph::{ModelProto, Session, TensorShape};
use tessera_tensor::Tensor;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// Output agreement between two graphs on one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    /// Batch size the graphs were run with.
    pub batch_size: usize,
    /// Shape of both outputs.
    pub output_shape: Vec<usize>,
    /// Largest element-wise absolute difference.
    pub max_abs_diff: f32,
    /// `||a - b|| / ||a||` over the whole batch.
    pub relative_l2: f32,
}

/// Draws a standard-normal batch matching a declared input shape. The
/// leading dimension is set to `batch_size`; every other dimension must be
/// fixed.
pub fn random_batch(shape: &TensorShape, batch_size: usize, seed: u64) -> PipelineResult<Tensor<f32>> {
    let mut dims = Vec::with_capacity(shape.rank());
    for (i, dim) in shape.to_vec().into_iter().enumerate() {
        match (i, dim) {
            (0, _) => dims.push(batch_size),
            (_, Some(d)) if d > 0 => dims.push(d as usize),
            _ => {
                return Err(PipelineError::InvalidConfig(format!(
                    "input dimension {i} of {shape} is not fixed"
                )))
            }
        }
    }
    if dims.is_empty() || batch_size == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot draw a batch of {batch_size} for input shape {shape}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let numel: usize = dims.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| StandardNormal.sample(&mut rng)).collect();
    Ok(Tensor::from_vec(data, &dims)?)
}

/// Runs both graphs on `input` and compares their outputs.
pub fn compare_models(
    original: &ModelProto,
    candidate: &ModelProto,
    input: &Tensor<f32>,
) -> PipelineResult<Comparison> {
    let expected = run(original, input)?;
    let actual = run(candidate, input)?;
    if expected.shape() != actual.shape() {
        return Err(PipelineError::InvalidConfig(format!(
            "output shapes differ: {:?} vs {:?}",
            expected.shape(),
            actual.shape()
        )));
    }

    let (mut diff_sq, mut ref_sq, mut max_abs) = (0.0f64, 0.0f64, 0.0f32);
    for (a, b) in expected.as_slice().iter().zip(actual.as_slice()) {
        let d = a - b;
        diff_sq += f64::from(d) * f64::from(d);
        ref_sq += f64::from(*a) * f64::from(*a);
        max_abs = max_abs.max(d.abs());
    }
    let relative_l2 = if ref_sq > 0.0 {
        (diff_sq / ref_sq).sqrt() as f32
    } else {
        diff_sq.sqrt() as f32
    };

    let comparison = Comparison {
        batch_size: input.shape().first().copied().unwrap_or(1),
        output_shape: expected.shape().to_vec(),
        max_abs_diff: max_abs,
        relative_l2,
    };
    info!(
        batch = comparison.batch_size,
        max_abs_diff = comparison.max_abs_diff,
        relative_l2 = comparison.relative_l2,
        "compared graph outputs"
    );
    Ok(comparison)
}

fn run(model: &ModelProto, input: &Tensor<f32>) -> PipelineResult<Tensor<f32>> {
    Session::new(model)
        .and_then(|session| session.run_single(input.clone()))
        .map_err(PipelineError::Execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_graph::{
        ElementType, GraphBuilder, NodeProto, TensorDescriptor, TensorProto, BATCH_DIM,
    };

    fn scale_model(factor: f32) -> ModelProto {
        let mut b = GraphBuilder::new("scale");
        b.add_input(TensorDescriptor::new(
            "x",
            ElementType::Float,
            TensorShape::with_dynamic_batch(&[1, 2], BATCH_DIM),
        ));
        b.add_initializer(TensorProto::float("w", &[2, 2], vec![factor, 0.0, 0.0, factor]))
            .unwrap();
        b.add_node(NodeProto::new("MatMul", &["x", "w"], &["y"]));
        b.add_output(TensorDescriptor::new(
            "y",
            ElementType::Float,
            TensorShape::with_dynamic_batch(&[1, 2], BATCH_DIM),
        ));
        b.build().unwrap()
    }

    #[test]
    fn test_random_batch_follows_input() {
        let shape = TensorShape::with_dynamic_batch(&[1, 3, 4, 4], BATCH_DIM);
        let batch = random_batch(&shape, 4, 9).unwrap();
        assert_eq!(batch.shape(), &[4, 3, 4, 4]);
        assert_eq!(batch, random_batch(&shape, 4, 9).unwrap());
        assert_ne!(batch, random_batch(&shape, 4, 10).unwrap());
        assert!(random_batch(&shape, 0, 9).is_err());
    }

    #[test]
    fn test_relative_error() {
        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let same = compare_models(&scale_model(1.0), &scale_model(1.0), &input).unwrap();
        assert_eq!(same.max_abs_diff, 0.0);
        assert_eq!(same.relative_l2, 0.0);
        assert_eq!(same.output_shape, vec![2, 2]);

        let off = compare_models(&scale_model(1.0), &scale_model(1.1), &input).unwrap();
        assert!((off.relative_l2 - 0.1).abs() < 1e-5);
        assert!((off.max_abs_diff - 0.4).abs() < 1e-5);
    }
}
