//! Quantize - Weight Quantization Command
//!
//! Loads `<dir>/<original>.graph`, quantizes a working copy and writes
//! `<dir>/<model_name>.graph`.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::Path;

use serde::Serialize;
use tessera::{quantize_graph, QuantizedArtifact};
use tessera_quant::QuantReport;

use super::utils::{format_number, format_size, print_header, print_json, print_kv, print_success, print_warning, spinner};
use crate::cli::{QuantOptions, QuantizeArgs};
use crate::config::TesseraConfig;
use crate::error::CliResult;

/// Result of a quantization.
#[derive(Debug, Serialize)]
pub struct QuantizeSummary {
    /// Artifact name
    pub name: String,
    /// Written artifact
    pub path: String,
    /// Original artifact
    pub source: String,
    /// Original size
    pub source_bytes: usize,
    /// Written size
    pub bytes: usize,
    /// Quantizer report
    pub report: QuantReport,
}

impl From<QuantizedArtifact> for QuantizeSummary {
    fn from(artifact: QuantizedArtifact) -> Self {
        Self {
            name: artifact.name,
            path: artifact.path.display().to_string(),
            source: artifact.source_path.display().to_string(),
            source_bytes: artifact.source_bytes,
            bytes: artifact.bytes,
            report: artifact.report,
        }
    }
}

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `quantize` command
pub fn execute(args: QuantizeArgs, config: &TesseraConfig) -> CliResult<()> {
    let summary = run_quantize(
        config,
        &args.quant,
        args.original.as_deref(),
        args.model_name.as_deref(),
        args.dir.as_deref(),
        args.json,
    )?;

    if args.json {
        print_json(&summary)
    } else {
        print_summary(&summary);
        Ok(())
    }
}

pub(crate) fn run_quantize(
    config: &TesseraConfig,
    quant: &QuantOptions,
    original: Option<&str>,
    model_name: Option<&str>,
    dir: Option<&Path>,
    quiet: bool,
) -> CliResult<QuantizeSummary> {
    let quant_config = config.quant_config(quant)?;
    let original = config.original_name(original);
    let model_name = config.quantized_name(model_name);
    let dir = config.artifact_dir(dir);

    let pb = spinner(&format!("Quantizing {original} -> {model_name}..."), quiet);
    let artifact = quantize_graph(&dir, original, model_name, &quant_config);
    pb.finish_and_clear();

    Ok(artifact?.into())
}

pub(crate) fn print_summary(summary: &QuantizeSummary) {
    let report = &summary.report;
    print_success(&format!("Quantized {} into {}", summary.source, summary.name));
    print_header("Artifact");
    print_kv("Path", &summary.path);
    print_kv("Format", report.format.name());
    print_kv("Weight type", report.weight_type.name());
    print_kv("Original size", &format_size(summary.source_bytes));
    print_kv("Quantized size", &format_size(summary.bytes));
    print_kv(
        "Weight compression",
        &format!("{:.2}x", report.compression_ratio()),
    );
    print_kv("Quantized tensors", &report.tensors.len().to_string());
    print_kv("Quantized parameters", &format_number(report.quantized_parameters()));
    print_kv("Rewritten nodes", &report.rewritten_nodes.to_string());
    if report.inserted_nodes > 0 {
        print_kv("Inserted nodes", &report.inserted_nodes.to_string());
    }
    print_kv("Max abs error", &format!("{:.6}", report.max_error()));

    if report.is_empty() {
        print_warning("No eligible weights were found; the graph was copied unchanged");
    }
    if !report.skipped.is_empty() {
        print_header("Skipped");
        for skipped in &report.skipped {
            print_kv(&skipped.node, &format!("{} ({})", skipped.op_type, skipped.reason));
        }
    }
}
