//! Graph Quantizer
//!
//! Rewrites the float weights of allow-listed operators into integer
//! initializers plus scale and zero point, and rewires their consumers.
//! Everything that can fail is checked before the graph is touched; once
//! rewriting starts the only remaining failure is final validation.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tessera_graph::runtime::quantized::WEIGHT_AXIS_ATTR;
use tessera_graph::{
    metadata_keys, validate_model, AttributeProto, ElementType, ModelProto, NodeProto,
    QuantizationAnnotation, QUANT_DOMAIN, QUANT_DOMAIN_VERSION,
};
use tracing::{debug, info, warn};

use crate::config::QuantConfig;
use crate::error::{QuantError, QuantResult};
use crate::quantize::{
    dequantize_weight, error_stats, quantize_weight, ErrorStats, QuantizedWeight,
};
use crate::registry::{rewrite_rule, RewriteRule};
use crate::report::{QuantReport, SkippedCandidate, TensorReport};
use crate::types::QuantFormat;
use crate::{DEQUANTIZED_SUFFIX, QUANTIZED_SUFFIX, SCALE_SUFFIX, ZERO_POINT_SUFFIX};

/// A quantized graph and what was done to it.
#[derive(Debug, Clone)]
pub struct QuantizedModel {
    /// The rewritten graph.
    pub model: ModelProto,
    /// Per-weight details.
    pub report: QuantReport,
}

/// One weight to quantize and the nodes reading it as a weight.
#[derive(Debug)]
struct WeightPlan {
    name: String,
    shape: Vec<usize>,
    consumers: Vec<(usize, &'static RewriteRule)>,
    axis: Option<usize>,
}

impl WeightPlan {
    fn quantized_name(&self) -> String {
        format!("{}{QUANTIZED_SUFFIX}", self.name)
    }

    fn scale_name(&self) -> String {
        format!("{}{SCALE_SUFFIX}", self.name)
    }

    fn zero_point_name(&self) -> String {
        format!("{}{ZERO_POINT_SUFFIX}", self.name)
    }

    fn dequantized_name(&self) -> String {
        format!("{}{DEQUANTIZED_SUFFIX}", self.name)
    }

    fn first_consumer(&self) -> usize {
        self.consumers.iter().map(|(i, _)| *i).min().unwrap_or(0)
    }
}

// =============================================================================
// Graph Quantizer
// =============================================================================

/// Weight-only dynamic quantizer.
#[derive(Debug, Clone)]
pub struct GraphQuantizer {
    config: QuantConfig,
}

impl GraphQuantizer {
    /// Creates a quantizer, rejecting settings it cannot honor.
    pub fn new(config: QuantConfig) -> QuantResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &QuantConfig {
        &self.config
    }

    /// Quantizes the eligible weights of `model`.
    pub fn quantize(&self, mut model: ModelProto) -> QuantResult<QuantizedModel> {
        if model.is_quantized() {
            return Err(QuantError::AlreadyQuantized(model.graph.name.clone()));
        }
        let bytes_before = model.graph.initializer_bytes();

        let (plans, skipped) = self.plan(&model);
        self.check_names(&model, &plans)?;
        let encoded = self.encode(&model, &plans)?;
        let consumer_names: Vec<Vec<String>> = plans
            .iter()
            .map(|p| {
                p.consumers
                    .iter()
                    .map(|(i, _)| model.graph.node[*i].display_name().to_string())
                    .collect()
            })
            .collect();

        // From here on the graph is rewritten.
        match self.config.format {
            QuantFormat::Operator => rewrite_operators(&mut model, &plans, &encoded),
            QuantFormat::Qdq => insert_dequantize_nodes(&mut model, &plans, &encoded),
        }
        replace_initializers(&mut model, &plans, &encoded);
        self.stamp(&mut model, !plans.is_empty());
        validate_model(&model)?;

        let tensors: Vec<TensorReport> = plans
            .iter()
            .zip(&encoded)
            .zip(consumer_names)
            .map(|((plan, (weight, stats)), consumers)| {
                TensorReport::new(&plan.name, &plan.shape, consumers, &weight.params, *stats)
            })
            .collect();

        let report = QuantReport {
            rewritten_nodes: plans.iter().map(|p| p.consumers.len()).sum(),
            inserted_nodes: match self.config.format {
                QuantFormat::Operator => 0,
                QuantFormat::Qdq => plans.len(),
            },
            tensors,
            skipped,
            bytes_before,
            bytes_after: model.graph.initializer_bytes(),
            format: self.config.format,
            weight_type: self.config.weight_type,
        };
        info!(
            graph = %model.graph.name,
            weights = report.tensors.len(),
            rewritten = report.rewritten_nodes,
            skipped = report.skipped.len(),
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "Quantized graph"
        );

        Ok(QuantizedModel { model, report })
    }

    /// Selects eligible nodes and groups them by weight, in node order.
    fn plan(&self, model: &ModelProto) -> (Vec<WeightPlan>, Vec<SkippedCandidate>) {
        let graph = &model.graph;
        let mut plans: Vec<WeightPlan> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut skipped = Vec::new();

        for (i, node) in graph.node.iter().enumerate() {
            let Some(rule) = rewrite_rule(&node.op_type) else {
                continue;
            };
            let weight = node
                .input
                .get(rule.weight_input)
                .filter(|w| !w.is_empty())
                .cloned();
            let mut skip = |reason: String| {
                skipped.push(SkippedCandidate {
                    node: node.display_name().to_string(),
                    op_type: node.op_type.clone(),
                    tensor: weight.clone(),
                    reason,
                });
            };

            if !self.config.op_types.contains(&node.op_type) {
                skip("operator type not in allow-list".to_string());
                continue;
            }
            if !self.config.allows_node(node.display_name()) {
                skip("excluded by node filter".to_string());
                continue;
            }
            let Some(name) = weight.clone() else {
                skip("no weight input".to_string());
                continue;
            };
            let Some(init) = graph.get_initializer(&name) else {
                skip("weight is computed, not an initializer".to_string());
                continue;
            };
            if init.elem_type() != ElementType::Float {
                skip(format!("weight is {}, not float", init.elem_type()));
                continue;
            }
            if init.dims.len() != rule.weight_rank {
                skip(format!(
                    "weight has rank {}, expected {}",
                    init.dims.len(),
                    rule.weight_rank
                ));
                continue;
            }

            let slot = *index.entry(name.clone()).or_insert_with(|| {
                plans.push(WeightPlan {
                    name: name.clone(),
                    shape: init.shape(),
                    consumers: Vec::new(),
                    axis: None,
                });
                plans.len() - 1
            });
            plans[slot].consumers.push((i, rule));
        }

        if self.config.per_channel {
            for plan in &mut plans {
                plan.axis = channel_axis(model, plan);
            }
        }
        (plans, skipped)
    }

    /// Fails if a generated name is already taken.
    fn check_names(&self, model: &ModelProto, plans: &[WeightPlan]) -> QuantResult<()> {
        let graph = &model.graph;
        let taken: HashSet<&str> = graph
            .initializer
            .iter()
            .map(|t| t.name.as_str())
            .chain(graph.input.iter().map(|d| d.name.as_str()))
            .chain(graph.node.iter().flat_map(|n| n.output.iter().map(String::as_str)))
            .collect();

        let mut generated: HashSet<String> = HashSet::new();
        for plan in plans {
            let mut names = vec![plan.quantized_name(), plan.scale_name(), plan.zero_point_name()];
            if self.config.format == QuantFormat::Qdq {
                names.push(plan.dequantized_name());
            }
            for name in names {
                if taken.contains(name.as_str()) || !generated.insert(name.clone()) {
                    return Err(QuantError::invalid_weight(
                        &plan.name,
                        format!("generated name '{name}' already exists in the graph"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Quantizes every planned weight; results keep plan order.
    fn encode(
        &self,
        model: &ModelProto,
        plans: &[WeightPlan],
    ) -> QuantResult<Vec<(QuantizedWeight, ErrorStats)>> {
        let symmetric = self.config.symmetric();
        plans
            .par_iter()
            .map(|plan| {
                let values = model
                    .graph
                    .get_initializer(&plan.name)
                    .and_then(|t| t.as_f32())
                    .ok_or_else(|| QuantError::invalid_weight(&plan.name, "float data unavailable"))?;
                let weight = quantize_weight(
                    &plan.name,
                    values,
                    &plan.shape,
                    self.config.weight_type,
                    symmetric,
                    self.config.reduce_range,
                    plan.axis,
                )?;
                let stats = error_stats(values, &dequantize_weight(&weight));
                debug!(
                    tensor = %plan.name,
                    shape = ?plan.shape,
                    axis = ?plan.axis,
                    max_scale = weight.params.max_scale(),
                    rmse = stats.rmse,
                    max_error = stats.max_error,
                    "Quantized weight"
                );
                Ok((weight, stats))
            })
            .collect()
    }

    /// Writes the quantization metadata and annotations.
    fn stamp(&self, model: &mut ModelProto, any_rewritten: bool) {
        if any_rewritten && self.config.format == QuantFormat::Operator {
            model.import_domain(QUANT_DOMAIN, QUANT_DOMAIN_VERSION);
        }
        let source = model.graph.name.clone();
        let flag = |b: bool| if b { "true" } else { "false" };
        model.set_metadata(metadata_keys::QUANTIZED, "true");
        model.set_metadata(metadata_keys::FORMAT, self.config.format.name());
        model.set_metadata(metadata_keys::WEIGHT_TYPE, self.config.weight_type.name());
        model.set_metadata(metadata_keys::PER_CHANNEL, flag(self.config.per_channel));
        model.set_metadata(metadata_keys::REDUCE_RANGE, flag(self.config.reduce_range));
        model.set_metadata(metadata_keys::SYMMETRIC, flag(self.config.symmetric()));
        model.set_metadata(metadata_keys::SOURCE_GRAPH, &source);
    }
}

// =============================================================================
// Rewriting
// =============================================================================

/// Output-channel axis of a weight as seen by one consumer.
fn consumer_axis(node: &NodeProto, rule: &RewriteRule) -> Option<usize> {
    match rule.op_type {
        "Conv" => Some(0),
        "MatMul" => Some(1),
        "Gemm" if node.get_int("transB").unwrap_or(0) != 0 => Some(0),
        "Gemm" => Some(1),
        _ => None,
    }
}

/// Common channel axis of all consumers, or per-tensor when they disagree.
fn channel_axis(model: &ModelProto, plan: &WeightPlan) -> Option<usize> {
    let mut axes = plan
        .consumers
        .iter()
        .map(|(i, rule)| consumer_axis(&model.graph.node[*i], rule));
    let first = axes.next().flatten()?;
    if axes.all(|a| a == Some(first)) {
        Some(first)
    } else {
        warn!(tensor = %plan.name, "Consumers disagree on the channel axis; using per-tensor scale");
        None
    }
}

fn rewrite_operators(
    model: &mut ModelProto,
    plans: &[WeightPlan],
    encoded: &[(QuantizedWeight, ErrorStats)],
) {
    for (plan, (weight, _)) in plans.iter().zip(encoded) {
        for &(i, rule) in &plan.consumers {
            let node = &mut model.graph.node[i];
            node.op_type = rule.variant.to_string();
            node.domain = Some(QUANT_DOMAIN.to_string());
            node.input[rule.weight_input] = plan.quantized_name();
            node.input.resize(rule.arity.max(node.input.len()), String::new());
            node.input.push(plan.scale_name());
            node.input.push(plan.zero_point_name());
            if let Some(axis) = weight.params.axis {
                node.attribute.push(AttributeProto::int(WEIGHT_AXIS_ATTR, axis as i64));
            }
        }
    }
}

fn insert_dequantize_nodes(
    model: &mut ModelProto,
    plans: &[WeightPlan],
    encoded: &[(QuantizedWeight, ErrorStats)],
) {
    for plan in plans {
        for &(i, rule) in &plan.consumers {
            model.graph.node[i].input[rule.weight_input] = plan.dequantized_name();
        }
    }

    // Insert from the back so earlier positions stay valid.
    let mut order: Vec<usize> = (0..plans.len()).collect();
    order.sort_by_key(|&p| std::cmp::Reverse(plans[p].first_consumer()));
    for p in order {
        let (plan, (weight, _)) = (&plans[p], &encoded[p]);
        let mut node = NodeProto::new(
            "DequantizeLinear",
            &[
                plan.quantized_name().as_str(),
                plan.scale_name().as_str(),
                plan.zero_point_name().as_str(),
            ],
            &[plan.dequantized_name().as_str()],
        )
        .with_name(&format!("{}_DequantizeLinear", plan.name));
        if let Some(axis) = weight.params.axis {
            node = node.with_attribute(AttributeProto::int("axis", axis as i64));
        }
        model.graph.node.insert(plan.first_consumer(), node);
    }
}

/// Adds the encoded initializers after each weight and drops float weights
/// nothing reads any more.
fn replace_initializers(
    model: &mut ModelProto,
    plans: &[WeightPlan],
    encoded: &[(QuantizedWeight, ErrorStats)],
) {
    let by_name: HashMap<&str, usize> = plans
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.as_str(), i))
        .collect();
    let still_read: HashSet<&str> = plans
        .iter()
        .filter(|p| {
            !model.graph.consumers(&p.name).is_empty()
                || model.graph.output.iter().any(|o| o.name == p.name)
        })
        .map(|p| p.name.as_str())
        .collect();

    let old = std::mem::take(&mut model.graph.initializer);
    let mut initializers = Vec::with_capacity(old.len() + 3 * plans.len());
    for init in old {
        let Some(&p) = by_name.get(init.name.as_str()) else {
            initializers.push(init);
            continue;
        };
        let (plan, (weight, _)) = (&plans[p], &encoded[p]);
        if still_read.contains(plan.name.as_str()) {
            initializers.push(init);
        }
        initializers.push(weight.to_initializer(&plan.quantized_name()));
        initializers.push(weight.scale_initializer(&plan.scale_name()));
        initializers.push(weight.zero_point_initializer(&plan.zero_point_name()));
        model.graph.quantization_annotation.push(QuantizationAnnotation {
            tensor_name: plan.name.clone(),
            quantized_name: plan.quantized_name(),
            scale_name: plan.scale_name(),
            zero_point_name: plan.zero_point_name(),
            axis: weight.params.axis.map(|a| a as i64),
            elem_type: weight.params.weight_type.elem_type(),
        });
    }
    model.graph.initializer = initializers;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tessera_graph::{
        GraphBuilder, Session, TensorData, TensorDescriptor, TensorProto, TensorShape, BATCH_DIM,
    };
    use tessera_tensor::Tensor;

    use super::*;
    use crate::registry::OpRegistry;
    use crate::types::WeightType;

    /// x[B,2] -MatMul w1[2,3]-> Relu -Gemm(transB) w2[4,3]-> + Gather(emb[5,4], 1)
    fn model() -> ModelProto {
        let mut b = GraphBuilder::new("small");
        b.add_input(TensorDescriptor::new(
            "x",
            ElementType::Float,
            TensorShape::with_dynamic_batch(&[1, 2], BATCH_DIM),
        ));
        let w1: Vec<f32> = (0..6).map(|i| (i as f32 - 2.5) * 0.3).collect();
        let w2: Vec<f32> = (0..12).map(|i| ((i * 7 % 12) as f32 - 6.0) * 0.11).collect();
        let emb: Vec<f32> = (0..20).map(|i| (i as f32 * 0.05).sin()).collect();
        b.add_initializer(TensorProto::float("w1", &[2, 3], w1)).unwrap();
        b.add_initializer(TensorProto::float("w2", &[4, 3], w2)).unwrap();
        b.add_initializer(TensorProto::float("b2", &[4], vec![0.1, -0.2, 0.3, 0.0])).unwrap();
        b.add_initializer(TensorProto::float("emb", &[5, 4], emb)).unwrap();
        b.add_initializer(TensorProto::int64("idx", &[], vec![1])).unwrap();
        b.add_node(NodeProto::new("MatMul", &["x", "w1"], &["h"]).with_name("fc1"));
        b.add_node(NodeProto::new("Relu", &["h"], &["r"]).with_name("act"));
        b.add_node(
            NodeProto::new("Gemm", &["r", "w2", "b2"], &["g"])
                .with_name("fc2")
                .with_attribute(AttributeProto::int("transB", 1)),
        );
        b.add_node(NodeProto::new("Gather", &["emb", "idx"], &["e"]).with_name("lookup"));
        b.add_node(NodeProto::new("Add", &["g", "e"], &["y"]).with_name("sum"));
        b.add_output(TensorDescriptor::new(
            "y",
            ElementType::Float,
            TensorShape::with_dynamic_batch(&[1, 4], BATCH_DIM),
        ));
        b.build().unwrap()
    }

    fn run(model: &ModelProto) -> Vec<f32> {
        let session = Session::new(model).unwrap();
        let x = Tensor::from_vec(vec![0.5, -1.0, 2.0, 0.25, -0.75, 1.5], &[3, 2]).unwrap();
        session.run_single(x).unwrap().as_slice().to_vec()
    }

    fn quantize(config: QuantConfig) -> QuantizedModel {
        GraphQuantizer::new(config).unwrap().quantize(model()).unwrap()
    }

    #[test]
    fn test_default_operator_format() {
        let QuantizedModel { model: q, report } = quantize(QuantConfig::default());
        let ops: Vec<&str> = q.graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["DequantMatMul", "Relu", "DequantGemm", "DequantGather", "Add"]);
        assert_eq!(q.graph.node[2].input, vec!["r", "w2_quantized", "b2", "w2_scale", "w2_zero_point"]);
        assert_eq!(q.graph.node[2].get_int("transB"), Some(1));
        assert!(q.imports_domain(QUANT_DOMAIN));

        let names: Vec<&str> = q.graph.initializer.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "w1_quantized", "w1_scale", "w1_zero_point",
                "w2_quantized", "w2_scale", "w2_zero_point",
                "b2",
                "emb_quantized", "emb_scale", "emb_zero_point",
                "idx",
            ]
        );
        assert!(matches!(q.graph.initializer[0].data, TensorData::Int8(_)));
        assert_eq!(q.graph.quantization_annotation.len(), 3);
        assert_eq!(q.metadata(metadata_keys::QUANTIZED), Some("true"));
        assert_eq!(q.metadata(metadata_keys::SOURCE_GRAPH), Some("small"));
        assert!(q.is_quantized());

        assert_eq!(report.tensors.len(), 3);
        assert_eq!(report.rewritten_nodes, 3);
        assert_eq!(report.tensors[1].consumers, vec!["fc2".to_string()]);
        assert!(report.bytes_after < report.bytes_before);
    }

    #[test]
    fn test_outputs_close_to_float() {
        let original = model();
        let expected = run(&original);
        for config in [
            QuantConfig::default(),
            QuantConfig::default().with_per_channel(true),
            QuantConfig::default().with_format(QuantFormat::Qdq),
            QuantConfig::default().with_weight_type(WeightType::QUInt8).with_reduce_range(true),
        ] {
            let q = GraphQuantizer::new(config).unwrap().quantize(original.clone()).unwrap();
            let got = run(&q.model);
            assert_eq!(got.len(), expected.len());
            for (a, b) in got.iter().zip(&expected) {
                assert!((a - b).abs() < 0.05, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_per_channel_axes() {
        let QuantizedModel { model: q, report } = quantize(QuantConfig::default().with_per_channel(true));
        let dims = |name: &str| q.graph.get_initializer(name).unwrap().dims.clone();
        // MatMul weight [2,3] by column, transposed Gemm weight [4,3] by row
        assert_eq!(dims("w1_scale"), vec![3]);
        assert_eq!(dims("w2_scale"), vec![4]);
        assert!(dims("emb_scale").is_empty());
        assert_eq!(q.graph.node[0].get_int(WEIGHT_AXIS_ATTR), Some(1));
        assert_eq!(q.graph.node[2].get_int(WEIGHT_AXIS_ATTR), Some(0));
        assert_eq!(report.tensors[0].axis, Some(1));
        assert_eq!(q.metadata(metadata_keys::PER_CHANNEL), Some("true"));
    }

    #[test]
    fn test_qdq_format() {
        let QuantizedModel { model: q, report } = quantize(QuantConfig::default().with_format(QuantFormat::Qdq));
        let ops: Vec<&str> = q.graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(
            ops,
            vec![
                "DequantizeLinear", "MatMul", "Relu", "DequantizeLinear", "Gemm",
                "DequantizeLinear", "Gather", "Add",
            ]
        );
        assert_eq!(q.graph.node[1].input, vec!["x", "w1_dequantized"]);
        assert_eq!(q.graph.node[0].name.as_deref(), Some("w1_DequantizeLinear"));
        assert!(!q.imports_domain(QUANT_DOMAIN));
        assert_eq!(report.inserted_nodes, 3);
        assert_eq!(report.tensors[2].consumers, vec!["lookup".to_string()]);
    }

    #[test]
    fn test_rejects_quantized_input() {
        let once = quantize(QuantConfig::default()).model;
        let err = GraphQuantizer::new(QuantConfig::default()).unwrap().quantize(once).unwrap_err();
        assert!(matches!(err, QuantError::AlreadyQuantized(_)));
    }

    #[test]
    fn test_rejects_unsupported_config() {
        let config = QuantConfig::default().with_op_types(OpRegistry::new(["MatMul", "Attention"]));
        assert!(matches!(GraphQuantizer::new(config), Err(QuantError::UnsupportedOperator(_))));
    }

    #[test]
    fn test_filters_leave_nodes_untouched() {
        let original = model();
        let config = QuantConfig {
            nodes_to_exclude: vec!["fc2".into()],
            ..QuantConfig::default()
        }
        .with_op_types(OpRegistry::new(["MatMul", "Gemm"]));
        let QuantizedModel { model: q, report } = GraphQuantizer::new(config).unwrap().quantize(original.clone()).unwrap();

        assert_eq!(q.graph.node[1..], original.graph.node[1..]);
        assert_eq!(q.graph.get_initializer("w2"), original.graph.get_initializer("w2"));
        assert_eq!(q.graph.get_initializer("emb"), original.graph.get_initializer("emb"));
        let reasons: HashMap<&str, &str> = report
            .skipped
            .iter()
            .map(|s| (s.node.as_str(), s.reason.as_str()))
            .collect();
        assert_eq!(reasons["fc2"], "excluded by node filter");
        assert_eq!(reasons["lookup"], "operator type not in allow-list");
        assert_eq!(q.graph.input, original.graph.input);
        assert_eq!(q.graph.output, original.graph.output);
    }

    #[test]
    fn test_shared_weight_kept_for_other_readers() {
        let mut b = GraphBuilder::new("shared");
        b.add_input(TensorDescriptor::new("x", ElementType::Float, TensorShape::from_dims(&[2, 2])));
        b.add_initializer(TensorProto::float("w", &[2, 2], vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        b.add_node(NodeProto::new("MatMul", &["x", "w"], &["h"]));
        b.add_node(NodeProto::new("Add", &["h", "w"], &["y"]));
        b.add_output(TensorDescriptor::new("y", ElementType::Float, TensorShape::from_dims(&[2, 2])));

        let q = GraphQuantizer::new(QuantConfig::default())
            .unwrap()
            .quantize(b.build().unwrap())
            .unwrap()
            .model;
        let names: Vec<&str> = q.graph.initializer.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["w", "w_quantized", "w_scale", "w_zero_point"]);
        assert_eq!(q.graph.node[1].input, vec!["h", "w"]);
    }

    #[test]
    fn test_name_collision_rejected() {
        let mut m = model();
        m.graph.initializer.push(TensorProto::float("w1_scale", &[], vec![1.0]));
        let err = GraphQuantizer::new(QuantConfig::default()).unwrap().quantize(m).unwrap_err();
        assert!(matches!(err, QuantError::InvalidWeight { .. }));
    }

    #[test]
    fn test_wrong_rank_skipped() {
        let mut b = GraphBuilder::new("rank");
        b.add_input(TensorDescriptor::new("x", ElementType::Float, TensorShape::from_dims(&[2])));
        b.add_initializer(TensorProto::float("v", &[2], vec![1.0, 2.0])).unwrap();
        b.add_node(NodeProto::new("MatMul", &["x", "v"], &["y"]).with_name("dot"));
        b.add_output(TensorDescriptor::new("y", ElementType::Float, TensorShape::from_dims(&[])));

        let out = GraphQuantizer::new(QuantConfig::default())
            .unwrap()
            .quantize(b.build().unwrap())
            .unwrap();
        assert!(out.report.is_empty());
        assert_eq!(out.report.skipped[0].tensor.as_deref(), Some("v"));
        assert_eq!(out.model.graph.node[0].op_type, "MatMul");
        // a graph without eligible weights is still marked as processed
        assert_eq!(out.model.metadata(metadata_keys::QUANTIZED), Some("true"));
    }

    #[test]
    fn test_deterministic() {
        let a = quantize(QuantConfig::default().with_per_channel(true)).model;
        let b = quantize(QuantConfig::default().with_per_channel(true)).model;
        assert_eq!(a, b);
    }
}
