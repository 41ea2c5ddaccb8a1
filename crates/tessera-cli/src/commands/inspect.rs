//! Inspect - Graph Artifact Inspection Command
//!
//! Displays the declared interface, operator histogram, initializer types,
//! quantization annotations and metadata of a graph artifact.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::collections::BTreeMap;

use colored::Colorize;
use serde::Serialize;
use tessera::{sha256_file, PipelineError};
use tessera_graph::{GraphLoader, LoadedGraph, MetadataEntry, OperatorSetId, QuantizationAnnotation};

use super::export::TensorSummary;
use super::utils::{format_number, format_size, print_header, print_json, print_kv};
use crate::cli::InspectArgs;
use crate::error::CliResult;

// =============================================================================
// Graph Information
// =============================================================================

/// Count and payload size of initializers of one element type.
#[derive(Debug, Default, Serialize)]
pub struct InitializerGroup {
    /// Number of initializers
    pub count: usize,
    /// Number of elements
    pub elements: usize,
    /// Payload bytes
    pub bytes: usize,
}

/// Everything `inspect` reports.
#[derive(Debug, Serialize)]
pub struct GraphInfo {
    /// Artifact path
    pub path: String,
    /// SHA-256 of the artifact
    pub sha256: String,
    /// Artifact size
    pub file_bytes: usize,
    /// Artifact format version
    pub format_version: u32,
    /// Graph name
    pub graph_name: String,
    /// Producer name and version
    pub producer: String,
    /// IR version
    pub ir_version: i64,
    /// Opset imports
    pub opset_import: Vec<OperatorSetId>,
    /// Declared inputs
    pub inputs: Vec<TensorSummary>,
    /// Declared outputs
    pub outputs: Vec<TensorSummary>,
    /// Node count
    pub nodes: usize,
    /// Nodes per operator type
    pub op_histogram: BTreeMap<String, usize>,
    /// Initializers per element type
    pub initializers: BTreeMap<String, InitializerGroup>,
    /// Whether the graph carries quantized weights
    pub quantized: bool,
    /// Quantized weight annotations
    pub quantization: Vec<QuantizationAnnotation>,
    /// Metadata properties
    pub metadata: Vec<MetadataEntry>,
}

impl GraphInfo {
    fn collect(loaded: &LoadedGraph, sha256: String) -> Self {
        let model = loaded.model();
        let graph = &model.graph;

        let mut initializers: BTreeMap<String, InitializerGroup> = BTreeMap::new();
        for init in &graph.initializer {
            let group = initializers.entry(init.elem_type().to_string()).or_default();
            group.count += 1;
            group.elements += init.numel();
            group.bytes += init.byte_size();
        }

        let describe = |d: &tessera_graph::TensorDescriptor| TensorSummary {
            name: d.name.clone(),
            elem_type: d.elem_type.to_string(),
            shape: d.shape.to_string(),
        };

        Self {
            path: loaded.path().display().to_string(),
            sha256,
            file_bytes: loaded.byte_len(),
            format_version: loaded.format_version(),
            graph_name: graph.name.clone(),
            producer: format!("{} {}", model.producer_name, model.producer_version),
            ir_version: model.ir_version,
            opset_import: model.opset_import.clone(),
            inputs: graph.input.iter().map(describe).collect(),
            outputs: graph.output.iter().map(describe).collect(),
            nodes: graph.node.len(),
            op_histogram: graph.op_histogram(),
            initializers,
            quantized: model.is_quantized(),
            quantization: graph.quantization_annotation.clone(),
            metadata: model.metadata_props.clone(),
        }
    }
}

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `inspect` command
pub fn execute(args: InspectArgs) -> CliResult<()> {
    let loaded = GraphLoader::load(&args.file)?;
    let digest = sha256_file(&args.file).map_err(PipelineError::from)?;
    let info = GraphInfo::collect(&loaded, digest);

    if args.json {
        print_json(&info)
    } else {
        output_text(&info);
        Ok(())
    }
}

fn output_text(info: &GraphInfo) {
    print_header(&format!("Graph: {}", info.graph_name));
    print_kv("Path", &info.path);
    print_kv("Size", &format_size(info.file_bytes));
    print_kv("SHA-256", &info.sha256);
    print_kv("Format version", &info.format_version.to_string());
    print_kv("Producer", &info.producer);
    print_kv("IR version", &info.ir_version.to_string());
    let opsets: Vec<String> = info
        .opset_import
        .iter()
        .map(|o| {
            let domain = if o.domain.is_empty() { "ai.onnx" } else { o.domain.as_str() };
            format!("{domain} v{}", o.version)
        })
        .collect();
    print_kv("Opsets", &opsets.join(", "));
    let status = if info.quantized {
        "quantized".yellow().to_string()
    } else {
        "float".green().to_string()
    };
    print_kv("Weights", &status);

    print_header("Interface");
    for t in &info.inputs {
        print_kv("input", &format!("{} {} {}", t.name, t.elem_type, t.shape));
    }
    for t in &info.outputs {
        print_kv("output", &format!("{} {} {}", t.name, t.elem_type, t.shape));
    }

    print_header(&format!("Operators ({} nodes)", info.nodes));
    for (op, count) in &info.op_histogram {
        print_kv(op, &count.to_string());
    }

    print_header("Initializers");
    for (ty, group) in &info.initializers {
        print_kv(
            ty,
            &format!(
                "{} tensors, {} elements, {}",
                group.count,
                format_number(group.elements),
                format_size(group.bytes)
            ),
        );
    }

    if !info.quantization.is_empty() {
        print_header(&format!("Quantized Weights ({})", info.quantization.len()));
        for ann in &info.quantization {
            let axis = ann.axis.map_or_else(|| "per-tensor".to_string(), |a| format!("axis {a}"));
            print_kv(&ann.tensor_name, &format!("{} {} -> {}", ann.elem_type, axis, ann.quantized_name));
        }
    }

    if !info.metadata.is_empty() {
        print_header("Metadata");
        for entry in &info.metadata {
            print_kv(&entry.key, &entry.value);
        }
    }
}
