//! Export - Graph Export Command
//!
//! Builds the vision tower, prepares the sample tensor and writes the traced
//! float graph.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::Path;

use serde::Serialize;
use tessera::prepare_sample;
use tessera_graph::TensorShape;
use tessera_trace::{ExportOptions, ExportedGraph, Module};
use tessera_vision::VisionTower;

use super::utils::{format_number, format_size, print_header, print_json, print_kv, print_success, spinner};
use crate::cli::{ExportArgs, ModelOptions};
use crate::config::TesseraConfig;
use crate::error::{CliError, CliResult};

// =============================================================================
// Summary
// =============================================================================

/// A declared graph tensor.
#[derive(Debug, Serialize)]
pub struct TensorSummary {
    /// Tensor name
    pub name: String,
    /// Element type
    pub elem_type: String,
    /// Declared shape
    pub shape: String,
}

impl TensorSummary {
    fn float(name: &str, shape: &TensorShape) -> Self {
        Self {
            name: name.to_string(),
            elem_type: "float32".to_string(),
            shape: shape.to_string(),
        }
    }
}

/// Result of an export.
#[derive(Debug, Serialize)]
pub struct ExportSummary {
    /// Artifact name
    pub name: String,
    /// Artifact path
    pub path: String,
    /// Vision tower preset
    pub preset: String,
    /// Parameter count of the tower
    pub parameters: usize,
    /// Declared input
    pub input: TensorSummary,
    /// Declared output
    pub output: TensorSummary,
    /// Node count
    pub nodes: usize,
    /// Artifact size
    pub bytes: usize,
}

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `export` command
pub fn execute(args: ExportArgs, config: &TesseraConfig) -> CliResult<()> {
    let summary = run_export(
        config,
        &args.model,
        args.model_name.as_deref(),
        args.output_dir.as_deref(),
        None,
        args.json,
    )?;

    if args.json {
        print_json(&summary)
    } else {
        print_summary(&summary);
        Ok(())
    }
}

/// Builds the tower and exports it. `fallback_image` is used when neither a
/// flag nor the config names an image.
pub(crate) fn run_export(
    config: &TesseraConfig,
    model: &ModelOptions,
    name: Option<&str>,
    dir: Option<&Path>,
    fallback_image: Option<&str>,
    quiet: bool,
) -> CliResult<ExportSummary> {
    let tower_config = config.tower_config(model)?;
    let preset = model.preset.clone().unwrap_or_else(|| config.model.preset.clone());
    let preprocessor = config.preprocessor(model, &tower_config)?;
    let source = config.image_source(model, fallback_image);
    let options = config.export_options(model, name, dir);
    check_name(&options)?;

    let pb = spinner("Preparing sample tensor...", quiet);
    let seed = model.seed.unwrap_or(config.model.seed);
    let sample = prepare_sample(source.as_ref(), &preprocessor, seed);
    pb.finish_and_clear();
    let sample = sample?;

    let pb = spinner(&format!("Building {preset} vision tower..."), quiet);
    let tower = VisionTower::new(tower_config);
    pb.finish_and_clear();
    let tower = tower?;

    let pb = spinner("Tracing and verifying graph...", quiet);
    let exported = tessera::prepare_graph(&tower, &sample, &options);
    pb.finish_and_clear();
    let exported = exported?;

    Ok(summarize(&exported, &options, &preset, tower.num_parameters()))
}

fn check_name(options: &ExportOptions) -> CliResult<()> {
    if options.model_name.is_empty() || options.model_name.contains(['/', '\\']) {
        return Err(CliError::InvalidArgument(format!(
            "invalid artifact name '{}'",
            options.model_name
        )));
    }
    Ok(())
}

fn summarize(exported: &ExportedGraph, options: &ExportOptions, preset: &str, parameters: usize) -> ExportSummary {
    ExportSummary {
        name: exported.name.clone(),
        path: exported.path.display().to_string(),
        preset: preset.to_string(),
        parameters,
        input: TensorSummary::float(&options.input_name, &exported.input_shape),
        output: TensorSummary::float(&options.output_name, &exported.output_shape),
        nodes: exported.node_count,
        bytes: exported.bytes,
    }
}

pub(crate) fn print_summary(summary: &ExportSummary) {
    print_success(&format!("Exported {}", summary.name));
    print_header("Graph");
    print_kv("Path", &summary.path);
    print_kv("Preset", &summary.preset);
    print_kv("Parameters", &format_number(summary.parameters));
    print_kv(
        "Input",
        &format!("{} {} {}", summary.input.name, summary.input.elem_type, summary.input.shape),
    );
    print_kv(
        "Output",
        &format!("{} {} {}", summary.output.name, summary.output.elem_type, summary.output.shape),
    );
    print_kv("Nodes", &summary.nodes.to_string());
    print_kv("Size", &format_size(summary.bytes));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_path_like_names() {
        let options = ExportOptions::default().with_model_name("../escape");
        assert!(check_name(&options).is_err());
        assert!(check_name(&ExportOptions::default()).is_ok());
    }
}
