//! Inference Session
//!
//! Compiles a validated model into a list of operator steps and runs them in
//! node order.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::collections::HashMap;

use tessera_tensor::Tensor;
use tracing::trace;

use super::operators::{create_operator, Operator};
use super::value::Value;
use crate::error::{GraphError, GraphResult};
use crate::proto::{ModelProto, TensorDescriptor};
use crate::validate::validate_model;

/// A compiled operator and its wiring.
#[derive(Debug)]
struct Step {
    node: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    operator: Box<dyn Operator>,
}

/// A model compiled for execution.
#[derive(Debug)]
pub struct Session {
    name: String,
    inputs: Vec<TensorDescriptor>,
    outputs: Vec<TensorDescriptor>,
    initializers: HashMap<String, Value>,
    steps: Vec<Step>,
}

impl Session {
    /// Validates and compiles a model.
    pub fn new(model: &ModelProto) -> GraphResult<Self> {
        validate_model(model)?;
        let graph = &model.graph;

        let initializers = graph
            .initializer
            .iter()
            .map(|t| Ok((t.name.clone(), Value::from_initializer(t)?)))
            .collect::<GraphResult<HashMap<_, _>>>()?;

        let steps = graph
            .node
            .iter()
            .map(|node| {
                Ok(Step {
                    node: node.display_name().to_string(),
                    inputs: node.input.clone(),
                    outputs: node.output.clone(),
                    operator: create_operator(node)?,
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;

        Ok(Self {
            name: graph.name.clone(),
            inputs: graph.input.clone(),
            outputs: graph.output.clone(),
            initializers,
            steps,
        })
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared inputs.
    pub fn inputs(&self) -> &[TensorDescriptor] {
        &self.inputs
    }

    /// Declared outputs.
    pub fn outputs(&self) -> &[TensorDescriptor] {
        &self.outputs
    }

    /// Total element count of all initializers.
    pub fn num_parameters(&self) -> usize {
        self.initializers.values().map(|v| v.shape().iter().product::<usize>()).sum()
    }

    /// Number of compiled steps.
    pub fn node_count(&self) -> usize {
        self.steps.len()
    }

    /// Runs the graph on named feeds and returns every declared output.
    pub fn run(&self, feeds: HashMap<String, Value>) -> GraphResult<HashMap<String, Value>> {
        for name in feeds.keys() {
            if !self.inputs.iter().any(|d| &d.name == name) {
                return Err(GraphError::UnknownValue(name.clone()));
            }
        }
        for desc in &self.inputs {
            let value = feeds
                .get(&desc.name)
                .ok_or_else(|| GraphError::UnknownValue(format!("missing feed '{}'", desc.name)))?;
            if value.elem_type() != desc.elem_type {
                return Err(GraphError::InvalidDataType {
                    name: desc.name.clone(),
                    expected: desc.elem_type.to_string(),
                    actual: value.elem_type().to_string(),
                });
            }
            if !desc.shape.accepts(value.shape()) {
                return Err(GraphError::InputShape {
                    name: desc.name.clone(),
                    expected: desc.shape.to_string(),
                    actual: value.shape().to_vec(),
                });
            }
        }

        let mut values: HashMap<String, Value> = feeds;

        for step in &self.steps {
            let outputs = {
                let args: Vec<Option<&Value>> = step
                    .inputs
                    .iter()
                    .map(|name| {
                        if name.is_empty() {
                            None
                        } else {
                            values.get(name).or_else(|| self.initializers.get(name))
                        }
                    })
                    .collect();
                step.operator.execute(&args)?
            };
            trace!(node = %step.node, op = step.operator.name(), "executed");

            for (name, value) in step.outputs.iter().zip(outputs) {
                values.insert(name.clone(), value);
            }
        }

        self.outputs
            .iter()
            .map(|desc| {
                let value = values
                    .remove(&desc.name)
                    .or_else(|| self.initializers.get(&desc.name).cloned())
                    .ok_or_else(|| GraphError::UnknownValue(desc.name.clone()))?;
                Ok((desc.name.clone(), value))
            })
            .collect()
    }

    /// Runs a single-input, single-output float graph.
    pub fn run_single(&self, input: Tensor<f32>) -> GraphResult<Tensor<f32>> {
        let (input_desc, output_desc) = match (self.inputs.as_slice(), self.outputs.as_slice()) {
            ([i], [o]) => (i, o),
            _ => {
                return Err(GraphError::Validation(format!(
                    "run_single needs one input and one output, graph has {} and {}",
                    self.inputs.len(),
                    self.outputs.len()
                )))
            }
        };

        let mut feeds = HashMap::new();
        feeds.insert(input_desc.name.clone(), Value::Float(input));
        let mut outputs = self.run(feeds)?;
        outputs
            .remove(&output_desc.name)
            .ok_or_else(|| GraphError::UnknownValue(output_desc.name.clone()))?
            .into_float(&output_desc.name)
    }
}

// =============================================================================
// Tests
// =============================================================================
