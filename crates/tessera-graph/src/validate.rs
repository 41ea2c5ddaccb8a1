//! Graph Validation
//!
//! Structural checks applied to every graph on load and after construction.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::collections::HashSet;

use crate::error::{GraphError, GraphResult};
use crate::proto::{GraphProto, ModelProto};
use crate::{IR_VERSION, MIN_OPSET_VERSION, OPSET_VERSION};

/// Validates model versioning and the contained graph.
pub fn validate_model(model: &ModelProto) -> GraphResult<()> {
    if model.ir_version < 1 || model.ir_version > IR_VERSION {
        return Err(GraphError::Validation(format!(
            "IR version {} is outside the supported range 1..={IR_VERSION}",
            model.ir_version
        )));
    }

    let opset = model.opset_version();
    if !(MIN_OPSET_VERSION..=OPSET_VERSION).contains(&opset) {
        return Err(GraphError::UnsupportedOpset(opset));
    }

    validate_graph(&model.graph)
}

/// Validates graph topology and initializer payloads.
///
/// Every node input must be a graph input, an initializer, or the output of
/// an earlier node; every value is produced at most once; every declared
/// output is produced.
pub fn validate_graph(graph: &GraphProto) -> GraphResult<()> {
    if graph.input.is_empty() {
        return Err(GraphError::Validation("graph declares no inputs".to_string()));
    }
    if graph.output.is_empty() {
        return Err(GraphError::Validation("graph declares no outputs".to_string()));
    }

    let mut available: HashSet<&str> = HashSet::new();

    for init in &graph.initializer {
        if init.dims.iter().any(|&d| d < 0) {
            return Err(GraphError::Validation(format!(
                "initializer '{}' has negative dims {:?}",
                init.name, init.dims
            )));
        }
        let Some(expected) = init.checked_numel() else {
            return Err(GraphError::Validation(format!(
                "initializer '{}' dims {:?} overflow the element count",
                init.name, init.dims
            )));
        };
        if init.data.len() != expected {
            return Err(GraphError::Validation(format!(
                "initializer '{}' holds {} elements but dims {:?} require {}",
                init.name,
                init.data.len(),
                init.dims,
                expected
            )));
        }
        if !available.insert(init.name.as_str()) {
            return Err(GraphError::Validation(format!(
                "duplicate initializer '{}'",
                init.name
            )));
        }
    }

    for input in &graph.input {
        if !available.insert(input.name.as_str()) {
            return Err(GraphError::Validation(format!(
                "graph input '{}' is declared twice or shadows an initializer",
                input.name
            )));
        }
    }

    for (index, node) in graph.node.iter().enumerate() {
        if node.op_type.is_empty() {
            return Err(GraphError::Validation(format!("node {index} has no operator type")));
        }
        for name in node.input.iter().filter(|n| !n.is_empty()) {
            if !available.contains(name.as_str()) {
                return Err(GraphError::Validation(format!(
                    "node '{}' ({}) reads '{}' before it is produced",
                    node.display_name(),
                    node.op_type,
                    name
                )));
            }
        }
        for name in &node.output {
            if name.is_empty() {
                continue;
            }
            if !available.insert(name.as_str()) {
                return Err(GraphError::Validation(format!(
                    "value '{}' is produced more than once",
                    name
                )));
            }
        }
    }

    for output in &graph.output {
        if !available.contains(output.name.as_str()) {
            return Err(GraphError::Validation(format!(
                "graph output '{}' is never produced",
                output.name
            )));
        }
    }

    for annotation in &graph.quantization_annotation {
        for name in [
            &annotation.quantized_name,
            &annotation.scale_name,
            &annotation.zero_point_name,
        ] {
            if !graph.is_initializer(name) {
                return Err(GraphError::Validation(format!(
                    "quantization annotation for '{}' references missing initializer '{}'",
                    annotation.tensor_name, name
                )));
            }
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{
        ElementType, NodeProto, OperatorSetId, TensorDescriptor, TensorProto, TensorShape,
    };

    fn graph() -> GraphProto {
        let mut g = GraphProto::new("g");
        g.input.push(TensorDescriptor::new(
            "x",
            ElementType::Float,
            TensorShape::from_dims(&[1, 2]),
        ));
        g.initializer.push(TensorProto::float("w", &[2, 2], vec![1.0; 4]));
        g.node.push(NodeProto::new("MatMul", &["x", "w"], &["y"]));
        g.output.push(TensorDescriptor::new(
            "y",
            ElementType::Float,
            TensorShape::from_dims(&[1, 2]),
        ));
        g
    }

    fn model(graph: GraphProto) -> ModelProto {
        ModelProto {
            ir_version: IR_VERSION,
            opset_import: vec![OperatorSetId {
                domain: String::new(),
                version: OPSET_VERSION,
            }],
            producer_name: "test".into(),
            producer_version: "0".into(),
            model_version: 1,
            doc_string: None,
            graph,
            metadata_props: Vec::new(),
        }
    }

    #[test]
    fn test_valid_graph() {
        assert!(validate_model(&model(graph())).is_ok());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut g = graph();
        g.node.insert(0, NodeProto::new("Relu", &["y"], &["r"]));
        let err = validate_graph(&g).unwrap_err();
        assert!(err.to_string().contains("before it is produced"));
    }

    #[test]
    fn test_duplicate_producer_rejected() {
        let mut g = graph();
        g.node.push(NodeProto::new("Relu", &["x"], &["y"]));
        assert!(validate_graph(&g).is_err());
    }

    #[test]
    fn test_missing_output_rejected() {
        let mut g = graph();
        g.output[0].name = "nope".into();
        assert!(validate_graph(&g).is_err());
    }

    #[test]
    fn test_initializer_length_checked() {
        let mut g = graph();
        g.initializer[0].dims = vec![3, 2];
        assert!(validate_graph(&g).is_err());
    }

    #[test]
    fn test_opset_range() {
        let mut m = model(graph());
        m.opset_import[0].version = 7;
        assert!(matches!(validate_model(&m), Err(GraphError::UnsupportedOpset(7))));
    }

    #[test]
    fn test_optional_empty_inputs_allowed() {
        let mut g = graph();
        g.node[0] = NodeProto::new("Gemm", &["x", "w", ""], &["y"]);
        assert!(validate_graph(&g).is_ok());
    }
}
