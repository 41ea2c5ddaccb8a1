//! Graph Builder
//!
//! Incremental construction of a `ModelProto`: declare inputs and outputs,
//! append nodes in execution order, register initializers, then `build`.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::collections::{HashMap, HashSet};

use crate::error::{GraphError, GraphResult};
use crate::proto::{
    GraphProto, MetadataEntry, ModelProto, NodeProto, OperatorSetId, TensorDescriptor, TensorProto,
};
use crate::validate::validate_model;
use crate::{IR_VERSION, OPSET_VERSION};

/// Builder for constructing graphs.
///
/// # Example
/// ```ignore
/// let mut builder = GraphBuilder::new("tiny");
/// builder.add_input(TensorDescriptor::new("x", ElementType::Float, shape.clone()));
/// builder.add_initializer(TensorProto::float("w", &[2, 2], w))?;
/// builder.add_node(NodeProto::new("MatMul", &["x", "w"], &["y"]));
/// builder.add_output(TensorDescriptor::new("y", ElementType::Float, shape));
/// let model = builder.build()?;
/// ```
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    name: String,
    producer_name: String,
    producer_version: String,
    doc_string: Option<String>,
    inputs: Vec<TensorDescriptor>,
    outputs: Vec<TensorDescriptor>,
    nodes: Vec<NodeProto>,
    initializers: Vec<TensorProto>,
    initializer_names: HashSet<String>,
    metadata: Vec<MetadataEntry>,
    counters: HashMap<String, usize>,
}

impl GraphBuilder {
    /// Creates a builder for a graph named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            producer_name: "tessera".to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            doc_string: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            initializers: Vec::new(),
            initializer_names: HashSet::new(),
            metadata: Vec::new(),
            counters: HashMap::new(),
        }
    }

    /// Sets the producer name.
    pub fn with_producer(mut self, name: &str, version: &str) -> Self {
        self.producer_name = name.to_string();
        self.producer_version = version.to_string();
        self
    }

    /// Sets the documentation string.
    pub fn with_doc_string(mut self, doc: &str) -> Self {
        self.doc_string = Some(doc.to_string());
        self
    }

    /// Declares a graph input.
    pub fn add_input(&mut self, descriptor: TensorDescriptor) {
        self.inputs.push(descriptor);
    }

    /// Declares a graph output.
    pub fn add_output(&mut self, descriptor: TensorDescriptor) {
        self.outputs.push(descriptor);
    }

    /// Appends a node. Nodes execute in the order they are added.
    pub fn add_node(&mut self, node: NodeProto) {
        self.nodes.push(node);
    }

    /// Registers an initializer; names must be unique.
    pub fn add_initializer(&mut self, tensor: TensorProto) -> GraphResult<()> {
        if !self.initializer_names.insert(tensor.name.clone()) {
            return Err(GraphError::Validation(format!(
                "duplicate initializer '{}'",
                tensor.name
            )));
        }
        self.initializers.push(tensor);
        Ok(())
    }

    /// Returns true if an initializer called `name` exists.
    pub fn has_initializer(&self, name: &str) -> bool {
        self.initializer_names.contains(name)
    }

    /// Returns a name of the form `{prefix}_{n}` not handed out before.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{prefix}_{counter}");
        *counter += 1;
        name
    }

    /// Renames a value everywhere it is produced or read.
    pub fn rename_value(&mut self, from: &str, to: &str) {
        for node in &mut self.nodes {
            for name in node.input.iter_mut().chain(node.output.iter_mut()) {
                if name == from {
                    *name = to.to_string();
                }
            }
        }
    }

    /// Returns true if some node produces `name`.
    pub fn produces(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.output.iter().any(|o| o == name))
    }

    /// Adds a metadata entry.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.push(MetadataEntry {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Number of nodes added so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Operator types of the nodes added so far, in order.
    pub fn op_sequence(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.op_type.clone()).collect()
    }

    /// Produces the validated model.
    pub fn build(self) -> GraphResult<ModelProto> {
        if self.inputs.is_empty() {
            return Err(GraphError::Validation("Model has no inputs".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(GraphError::Validation("Model has no outputs".to_string()));
        }

        let graph = GraphProto {
            name: self.name,
            node: self.nodes,
            initializer: self.initializers,
            input: self.inputs,
            output: self.outputs,
            value_info: Vec::new(),
            quantization_annotation: Vec::new(),
            doc_string: self.doc_string.clone(),
        };

        let model = ModelProto {
            ir_version: IR_VERSION,
            opset_import: vec![OperatorSetId {
                domain: String::new(),
                version: OPSET_VERSION,
            }],
            producer_name: self.producer_name,
            producer_version: self.producer_version,
            model_version: 1,
            doc_string: self.doc_string,
            graph,
            metadata_props: self.metadata,
        };

        validate_model(&model)?;
        Ok(model)
    }
}

// =============================================================================
// Tests
// =============================================================================
