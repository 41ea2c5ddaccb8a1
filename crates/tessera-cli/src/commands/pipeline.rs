//! Pipeline - Export Then Quantize
//!
//! Runs both stages in one invocation. Without an image argument the sample
//! is the default remote image.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use serde::Serialize;
use tessera_vision::DEFAULT_SAMPLE_URL;

use super::export::{self, ExportSummary};
use super::quantize::{self, QuantizeSummary};
use super::utils::{print_json, print_step};
use crate::cli::PipelineArgs;
use crate::config::TesseraConfig;
use crate::error::{CliError, CliResult};

/// Both stage results.
#[derive(Debug, Serialize)]
pub struct PipelineSummary {
    /// Export stage
    pub export: ExportSummary,
    /// Quantization stage
    pub quantize: QuantizeSummary,
}

/// Execute the `pipeline` command
pub fn execute(args: PipelineArgs, config: &TesseraConfig) -> CliResult<()> {
    let original = config.original_name(args.original.as_deref()).to_string();
    let quantized = config.quantized_name(args.model_name.as_deref()).to_string();
    if original == quantized {
        return Err(CliError::InvalidArgument(format!(
            "original and quantized artifacts are both named '{original}'"
        )));
    }
    // fail on bad quantization flags before spending time on export
    config.quant_config(&args.quant)?;
    let dir = config.artifact_dir(args.dir.as_deref());

    if !args.json {
        print_step(1, 2, "Exporting graph");
    }
    let exported = export::run_export(
        config,
        &args.model,
        Some(&original),
        Some(&dir),
        Some(DEFAULT_SAMPLE_URL),
        args.json,
    )?;
    if !args.json {
        export::print_summary(&exported);
        println!();
        print_step(2, 2, "Quantizing weights");
    }

    let quantized = quantize::run_quantize(
        config,
        &args.quant,
        Some(&original),
        Some(&quantized),
        Some(&dir),
        args.json,
    )?;

    if args.json {
        print_json(&PipelineSummary {
            export: exported,
            quantize: quantized,
        })
    } else {
        quantize::print_summary(&quantized);
        Ok(())
    }
}
